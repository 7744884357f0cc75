//! The garment currently chosen for live preview.
//!
//! Written by the catalog UI, read by the scheduler once per cycle. Readers
//! get an `Arc` snapshot, so a change made mid-cycle is only seen by the
//! next cycle.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GarmentId(String);

impl GarmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GarmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedGarment {
    pub id: GarmentId,
    pub display_name: String,
    pub reference_image: Option<String>,
}

impl SelectedGarment {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: GarmentId::new(id),
            display_name: display_name.into(),
            reference_image: None,
        }
    }

    pub fn with_reference_image(mut self, reference: impl Into<String>) -> Self {
        self.reference_image = Some(reference.into());
        self
    }
}

/// Single writer (catalog UI), single reader (scheduler).
#[derive(Default)]
pub struct SelectionContext {
    current: ArcSwapOption<SelectedGarment>,
}

impl SelectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `garment`, or clear the selection if it is already selected.
    /// Returns the selection now in effect.
    pub fn select(&self, garment: SelectedGarment) -> Option<Arc<SelectedGarment>> {
        let toggled_off =
            matches!(&*self.current.load(), Some(current) if current.id == garment.id);

        if toggled_off {
            info!("Selection cleared: {}", garment.display_name);
            self.current.store(None);
            None
        } else {
            info!("Selected garment {} ({})", garment.id, garment.display_name);
            let garment = Arc::new(garment);
            self.current.store(Some(Arc::clone(&garment)));
            Some(garment)
        }
    }

    pub fn clear(&self) {
        if self.current.swap(None).is_some() {
            info!("Selection cleared");
        }
    }

    /// Value for the current cycle.
    pub fn snapshot(&self) -> Option<Arc<SelectedGarment>> {
        self.current.load_full()
    }

    pub fn is_selected(&self, id: &GarmentId) -> bool {
        matches!(&*self.current.load(), Some(current) if &current.id == id)
    }
}
