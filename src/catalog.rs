//! Read-only catalog client and the helpers the UI uses to pick garments.

use std::collections::BTreeSet;

use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::RemoteError;
use crate::remote::http::resolve_reference;
use crate::selection::{GarmentId, SelectedGarment};
use crate::RemoteConfig;

/// Catalog ids arrive as numbers or strings depending on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum ItemId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    #[serde(deserialize_with = "garment_id")]
    pub id: GarmentId,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
}

fn garment_id<'de, D>(deserializer: D) -> Result<GarmentId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match ItemId::deserialize(deserializer)? {
        ItemId::Number(n) => GarmentId::new(n.to_string()),
        ItemId::Text(s) => GarmentId::new(s),
    })
}

impl CatalogItem {
    pub fn to_selection(&self) -> SelectedGarment {
        let garment = SelectedGarment::new(self.id.as_str(), self.name.clone());
        match &self.image_url {
            Some(url) => garment.with_reference_image(url.clone()),
            None => garment,
        }
    }
}

#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    endpoint: Url,
}

impl CatalogClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let base = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::Malformed(format!("base url {:?}: {e}", config.base_url)))?;
        Ok(Self {
            client: builder.build()?,
            endpoint: resolve_reference(&base, &config.catalog_path)?,
        })
    }

    pub async fn fetch(&self) -> Result<Vec<CatalogItem>, RemoteError> {
        debug!(url = %self.endpoint, "Fetching catalog");
        let response = self.client.get(self.endpoint.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: format!("catalog request failed: {status}"),
            });
        }
        let body = response.bytes().await?;
        let items = parse_catalog(&body)?;
        info!("Loaded {} catalog items", items.len());
        Ok(items)
    }
}

pub(crate) fn parse_catalog(body: &[u8]) -> Result<Vec<CatalogItem>, RemoteError> {
    serde_json::from_slice(body).map_err(|e| RemoteError::Malformed(format!("catalog: {e}")))
}

/// Distinct brand names, sorted.
pub fn brands(items: &[CatalogItem]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.brand.as_deref())
        .filter(|brand| !brand.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}

/// Items of one brand, case-insensitive.
pub fn filter_by_brand(items: &[CatalogItem], brand: &str) -> Vec<CatalogItem> {
    items
        .iter()
        .filter(|item| {
            item.brand
                .as_deref()
                .is_some_and(|b| b.eq_ignore_ascii_case(brand))
        })
        .cloned()
        .collect()
}

pub fn find<'a>(items: &'a [CatalogItem], id: &GarmentId) -> Option<&'a CatalogItem> {
    items.iter().find(|item| &item.id == id)
}
