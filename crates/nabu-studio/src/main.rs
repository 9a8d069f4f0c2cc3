use std::path::PathBuf;

use anyhow::{Context, Result};
use nabu_engine::device::{GpuInit, HeadlessGpu};
use nabu_engine::logging::{init_logging, LoggingConfig};
use nabu_engine::text::FontSystem;
use nabu_engine::{EngineConfig, PaintEngine};

mod scene;

const WIDTH: u32 = 960;
const HEIGHT: u32 = 640;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let output = std::env::args_os().nth(1).map_or_else(|| PathBuf::from("nabu-studio.png"), PathBuf::from);

    let gpu = HeadlessGpu::new_blocking(GpuInit::default())?;
    let mut ctx = gpu.create_context(WIDTH, HEIGHT)?;
    ctx.clear([1.0, 1.0, 1.0, 1.0]);

    let mut fonts = FontSystem::new();
    let font = match load_font() {
        Some(bytes) => Some(fonts.load_font(&bytes)?),
        None => {
            log::warn!("no system font found; the text panel stays empty");
            None
        }
    };

    let mut engine = PaintEngine::new(ctx, EngineConfig::default());
    engine.begin();
    scene::paint(&mut engine, &mut fonts, font)?;
    engine.end().context("failed to flush the scene")?;

    let stats = engine.stats();
    log::info!(
        "painted {} draw calls ({} stencil fills, {} skipped)",
        stats.draw_calls,
        stats.stencil_fills,
        stats.skipped_draws
    );

    let mut ctx = engine.into_context();
    let pixels = ctx.read_pixels().context("failed to read the target back")?;
    let image = image::RgbaImage::from_raw(WIDTH, HEIGHT, pixels).context("readback has the wrong size")?;
    image.save(&output).with_context(|| format!("failed to write {}", output.display()))?;
    log::info!("wrote {}", output.display());
    Ok(())
}

fn load_font() -> Option<Vec<u8>> {
    [
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/noto/NotoSans-Regular.ttf",
        "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    ]
    .iter()
    .find_map(|p| std::fs::read(p).ok())
}
