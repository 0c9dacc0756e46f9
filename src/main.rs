//! Shrine viewer
//!
//! Usage: `diorama [settings.ron|settings.json]`
//!
//! Assets are read from `assets/` and shaders are hot-reloadable from
//! `assets/shaders/` when that directory exists.

use std::path::Path;

use diorama::prelude::*;

const ASSET_DIR: &str = "assets";
const SHADER_DIR: &str = "assets/shaders";

fn main() {
    let mut config = EngineConfig::default()
        .with_title("Diorama - Shrine")
        .with_size(1280, 720)
        .with_vsync(true)
        .with_asset_dir(ASSET_DIR);

    if Path::new(SHADER_DIR).is_dir() {
        config = config.with_shader_dir(SHADER_DIR);
    }
    if let Some(path) = std::env::args().nth(1) {
        config = config.with_settings_file(path);
    }

    let shrine = Shrine::new(&config.asset_dir);
    let engine = Engine::new(config, shrine);

    if let Err(e) = engine.run() {
        log::error!("Viewer error: {e}");
        std::process::exit(1);
    }
}
