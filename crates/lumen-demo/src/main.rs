mod runtime;
mod scene;

use anyhow::Result;
use lumen_gfx::logging::{init_logging, LoggingConfig};
use lumen_gfx::{Color, GfxConfig};

use crate::runtime::{Runtime, RuntimeConfig};

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "lumen demo".to_string(),
        gfx: GfxConfig {
            sample_count: 4,
            enable_gpu_timing: true,
            clear_color: Color::from_hex("#1e1f26").unwrap_or(Color::BLACK),
            ..GfxConfig::default()
        },
        ..RuntimeConfig::default()
    };
    Runtime::run(config)
}
