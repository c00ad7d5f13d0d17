//! Render-to-file.

use std::{fs::File, io::BufWriter, path::Path};

use image::{
    ExtendedColorType, ImageEncoder, RgbaImage,
    codecs::png::{CompressionType, FilterType, PngEncoder},
};

use crate::{
    context::RenderContext,
    device::{GraphicsDevice, RenderTarget},
    errors::{RenderError, Result},
    render::RenderPipeline,
};

/// Render one extra frame and write the visible target to `path` as PNG.
pub fn render_to_file<D: GraphicsDevice + RenderTarget>(
    ctx: &mut RenderContext<D>,
    pipeline: &mut RenderPipeline,
    path: &Path,
) -> Result<()> {
    ctx.begin_frame()?;
    // Aborting the frame drops the request again.
    ctx.request_capture();
    if let Err(e) = pipeline.render_frame(ctx, pipeline.elapsed_seconds()) {
        ctx.abort_frame();
        return Err(e);
    }
    ctx.end_frame()?;
    let image = ctx
        .take_capture()
        .ok_or_else(|| RenderError::Capture("the device produced no capture".to_string()))?;
    save_png(&image, path)?;
    log::info!("Wrote {}x{} frame to {}", image.width(), image.height(), path.display());
    Ok(())
}

/// Best compression; capture size matters more than encode time.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(())
}
