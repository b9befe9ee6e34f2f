//! Pixelport - Standalone demo player
//!
//! Runs a compiled WASM demo module in a window: the module renders into
//! its own linear memory and the player blits the 800x600 pixel buffer to
//! the screen every frame.
//!
//! # Usage
//!
//! ```bash
//! pixelport
//! pixelport path/to/demo.wasm
//! pixelport demo.wasm --scale 2
//! ```
//!
//! # Keyboard Shortcuts
//!
//! - ESC: Quit

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use pixelport::{AppConfig, DEFAULT_MODULE_PATH, MAX_WINDOW_SCALE, run};

#[derive(Parser)]
#[command(name = "pixelport")]
#[command(author, version, about = "Pixelport - WASM pixel demo player")]
struct Args {
    /// Demo module to run (.wasm)
    #[arg(default_value = DEFAULT_MODULE_PATH)]
    module: PathBuf,

    /// Integer scaling factor for the window, 1-8 (the frame stays 800x600)
    #[arg(long, short = 's', default_value = "1")]
    scale: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Validate module path exists
    if !args.module.exists() {
        anyhow::bail!("Module file not found: {}", args.module.display());
    }

    if args.scale == 0 || args.scale > MAX_WINDOW_SCALE {
        anyhow::bail!("Scale factor must be between 1 and {}", MAX_WINDOW_SCALE);
    }

    let config = AppConfig {
        module_path: args.module,
        scale: args.scale,
    };

    run(config)
}
