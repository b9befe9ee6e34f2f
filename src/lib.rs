//! Pixelport - library interface
//!
//! Loads a compiled demo module, supplies the host math functions it
//! imports, and drives a per-frame loop that copies the module's rendered
//! pixels onto a window. Usable as a library or through the `pixelport`
//! standalone binary.

pub mod app;
pub mod clock;
pub mod ffi;
pub mod graphics;
pub mod wasm;

pub use app::{AppConfig, DEFAULT_MODULE_PATH, MAX_WINDOW_SCALE, run};

/// Display surface width in pixels.
pub const DISPLAY_WIDTH: u32 = 800;
/// Display surface height in pixels.
pub const DISPLAY_HEIGHT: u32 = 600;
