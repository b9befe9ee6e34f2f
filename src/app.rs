//! Application event loop driving the demo module
//!
//! One redraw = one frame: advance the clock, call the module's render
//! entry point, blit the pixels it produced. The first redraw only primes
//! the clock, so nothing is drawn until a frame delta is computable. A
//! boundary error from the module freezes the loop on the last drawn frame;
//! the window stays open until closed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use crate::clock::FrameClock;
use crate::ffi::{self, CapabilityTable};
use crate::graphics::Display;
use crate::wasm::{self, DemoInstance, WasmEngine};
use crate::{DISPLAY_HEIGHT, DISPLAY_WIDTH};

/// Module path used when the CLI does not supply one.
pub const DEFAULT_MODULE_PATH: &str = "bin/triangle.wasm";

/// Largest accepted window scale factor.
pub const MAX_WINDOW_SCALE: u32 = 8;

/// Player configuration passed from the CLI
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the demo module
    pub module_path: PathBuf,
    /// Integer window scale factor, clamped to 1..=[`MAX_WINDOW_SCALE`]
    /// (the frame itself stays 800x600)
    pub scale: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            module_path: PathBuf::from(DEFAULT_MODULE_PATH),
            scale: 1,
        }
    }
}

impl AppConfig {
    /// Scale factor applied to the window, clamped to the supported range.
    fn effective_scale(&self) -> u32 {
        self.scale.clamp(1, MAX_WINDOW_SCALE)
    }
}

/// Demo player application.
///
/// Window, display, and module instance are created on `resumed`; the
/// render loop then self-chains through `RedrawRequested`, paced by vsync
/// presentation.
struct App {
    config: AppConfig,
    window: Option<Arc<Window>>,
    display: Option<Display>,
    instance: Option<DemoInstance>,
    clock: FrameClock,
    /// Set after a boundary error; no further redraws are requested
    halted: bool,
    /// Startup failure to propagate out of the event loop
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            window: None,
            display: None,
            instance: None,
            clock: FrameClock::new(),
            halted: false,
            error: None,
        }
    }

    /// Initialize window-dependent state: graphics first, then the one-shot
    /// module load. Any failure here is fatal to the session.
    fn on_window_created(&mut self, window: Arc<Window>) -> Result<()> {
        let display = Display::new(window.clone())?;

        tracing::info!("Loading module: {}", self.config.module_path.display());
        let engine = WasmEngine::new()?;
        let module = wasm::load_module_file(&engine, &self.config.module_path)?;
        let table = CapabilityTable::new(vec![ffi::host_math()]);
        let instance = DemoInstance::new(&engine, &module, &table)?;

        // Prime the loop; every handled redraw requests the next one
        window.request_redraw();

        self.window = Some(window);
        self.display = Some(display);
        self.instance = Some(instance);
        Ok(())
    }

    fn redraw(&mut self) {
        if self.halted {
            return;
        }
        let (Some(window), Some(display), Some(instance)) = (
            self.window.as_ref(),
            self.display.as_mut(),
            self.instance.as_mut(),
        ) else {
            return;
        };

        // The priming redraw only records its timestamp; rendering starts
        // once a delta is computable
        if let Some(elapsed) = self.clock.advance(Instant::now()) {
            match instance.render_frame(elapsed) {
                Ok(pixels) => {
                    if let Err(e) = display.present_frame(pixels) {
                        tracing::error!("Present error: {}", e);
                    }
                }
                Err(e) => {
                    tracing::error!("Frame loop halted: {}", e);
                    self.halted = true;
                    return;
                }
            }
        }

        window.request_redraw();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let scale = self.config.effective_scale();
        let window_attributes = Window::default_attributes()
            .with_title("Pixelport")
            .with_inner_size(winit::dpi::LogicalSize::new(
                DISPLAY_WIDTH * scale,
                DISPLAY_HEIGHT * scale,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("Failed to create window: {}", e);
                self.error = Some(e.into());
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.on_window_created(window) {
            tracing::error!("Failed to start demo: {}", e);
            self.error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Window close requested");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && let PhysicalKey::Code(KeyCode::Escape) = event.physical_key
                {
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(display) = &mut self.display {
                    display.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // Redraws self-chain; sleep between events otherwise
        event_loop.set_control_flow(ControlFlow::Wait);
    }
}

/// Run the demo player.
pub fn run(config: AppConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Pixelport");
    tracing::info!("Module: {}", config.module_path.display());

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(error) = app.error.take() {
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_points_at_bundled_module() {
        let config = AppConfig::default();
        assert_eq!(config.module_path, PathBuf::from("bin/triangle.wasm"));
        assert_eq!(config.scale, 1);
    }

    #[test]
    fn test_effective_scale_clamps_to_supported_range() {
        let mut config = AppConfig::default();
        assert_eq!(config.effective_scale(), 1);

        config.scale = MAX_WINDOW_SCALE;
        assert_eq!(config.effective_scale(), MAX_WINDOW_SCALE);

        config.scale = 0;
        assert_eq!(config.effective_scale(), 1);

        // Large enough that multiplying by the frame width would overflow
        // u32 if it reached the window-size math unclamped
        config.scale = u32::MAX;
        assert_eq!(config.effective_scale(), MAX_WINDOW_SCALE);
    }
}
