//! SDL2 preview window.
//! Presents the render surface and turns key presses into user actions.

use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use sdl2::event::Event;
use sdl2::keyboard::Scancode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use tracing::{debug, info};

use super::RenderSurface;

/// Idle wait between event polls when nothing new was drawn.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Something the user asked the live view to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    ToggleCamera,
    /// Zero-based index into the visible catalog.
    Select(usize),
    ClearSelection,
    RetryPlayback,
    Quit,
}

/// Space toggles the camera, 1-9 pick a garment, 0 or Backspace clear the
/// pick, P retries playback and Escape quits.
pub fn action_for_key(scancode: Scancode) -> Option<UserAction> {
    let action = match scancode {
        Scancode::Space => UserAction::ToggleCamera,
        Scancode::Num1 => UserAction::Select(0),
        Scancode::Num2 => UserAction::Select(1),
        Scancode::Num3 => UserAction::Select(2),
        Scancode::Num4 => UserAction::Select(3),
        Scancode::Num5 => UserAction::Select(4),
        Scancode::Num6 => UserAction::Select(5),
        Scancode::Num7 => UserAction::Select(6),
        Scancode::Num8 => UserAction::Select(7),
        Scancode::Num9 => UserAction::Select(8),
        Scancode::Num0 | Scancode::Backspace => UserAction::ClearSelection,
        Scancode::P => UserAction::RetryPlayback,
        Scancode::Escape => UserAction::Quit,
        _ => return None,
    };
    Some(action)
}

pub struct PreviewWindow {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    seen_version: u64,
    title: String,
}

impl PreviewWindow {
    pub fn new(sdl_context: &sdl2::Sdl, width: u32, height: u32) -> Result<Self> {
        let video_subsystem = sdl_context.video().map_err(|e| eyre!(e))?;

        let window = video_subsystem
            .window("Live Try-On", width, height)
            .position_centered()
            .resizable()
            .build()?;

        let canvas = window.into_canvas().present_vsync().build()?;
        let texture_creator = canvas.texture_creator();

        Ok(Self {
            canvas,
            texture_creator,
            seen_version: 0,
            title: String::new(),
        })
    }

    /// Upload the surface if it changed since the last call.
    /// Returns whether anything was presented.
    pub fn present(&mut self, surface: &RenderSurface) -> Result<bool> {
        let creator = &self.texture_creator;
        let uploaded = surface.read_if_newer(self.seen_version, |canvas| {
            if canvas.width == 0 || canvas.height == 0 {
                return Ok(None);
            }
            let mut texture = creator
                .create_texture_streaming(PixelFormatEnum::RGB24, canvas.width, canvas.height)
                .map_err(|e| eyre!(e))?;
            texture
                .update(None, &canvas.pixels, (canvas.width * 3) as usize)
                .map_err(|e| eyre!(e))?;
            Ok::<_, color_eyre::Report>(Some((texture, canvas.version)))
        });

        let Some((texture, version)) = uploaded.transpose()?.flatten() else {
            return Ok(false);
        };
        self.seen_version = version;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(|e| eyre!(e))?;
        self.canvas.present();
        Ok(true)
    }

    /// Blank the window, e.g. after the camera was stopped.
    pub fn clear(&mut self) {
        self.canvas.clear();
        self.canvas.present();
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        if self.title != title {
            self.canvas.window_mut().set_title(title)?;
            self.title = title.to_owned();
        }
        Ok(())
    }

    /// Event loop. `handler` runs for every action and returns `false` to
    /// quit; `status` supplies the title bar text.
    pub fn run(
        &mut self,
        sdl_context: &sdl2::Sdl,
        surface: &RenderSurface,
        mut handler: impl FnMut(UserAction) -> bool,
        status: impl Fn() -> String,
    ) -> Result<()> {
        let mut event_pump = sdl_context.event_pump().map_err(|e| eyre!(e))?;

        'running: loop {
            for event in event_pump.poll_iter() {
                let action = match event {
                    Event::Quit { .. } => Some(UserAction::Quit),
                    Event::KeyDown {
                        scancode: Some(scancode),
                        repeat: false,
                        ..
                    } => action_for_key(scancode),
                    _ => None,
                };
                let Some(action) = action else { continue };
                debug!(?action, "User action");
                if action == UserAction::Quit || !handler(action) {
                    info!("Quit requested");
                    break 'running;
                }
                if action == UserAction::ToggleCamera && !surface.is_active() {
                    self.clear();
                }
            }

            self.set_title(&status())?;
            if !self.present(surface)? {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        Ok(())
    }
}
