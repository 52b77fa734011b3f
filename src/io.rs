use std::path::Path;

use anyhow::Context as _;

use crate::buffer::{Dimensions, ImageBuffer};
use crate::foundation::error::{CrossfadeError, CrossfadeResult};

/// Decode an image file into RGB8, dropping alpha and expanding gray inputs to three channels.
#[tracing::instrument]
pub fn decode_rgb8(path: &Path) -> CrossfadeResult<ImageBuffer> {
    let dyn_img = image::open(path)
        .map_err(|e| CrossfadeError::load(format!("'{}': {e}", path.display())))?;
    let rgb = dyn_img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let dims = Dimensions::new(width, height)
        .map_err(|e| CrossfadeError::load(format!("'{}': {e}", path.display())))?;
    ImageBuffer::from_raw(dims, rgb.into_raw())
}

/// Write `frame` as an RGB8 PNG.
pub fn encode_png(path: &Path, frame: &ImageBuffer) -> CrossfadeResult<()> {
    image::save_buffer_with_format(
        path,
        frame.as_bytes(),
        frame.width(),
        frame.height(),
        image::ColorType::Rgb8,
        image::ImageFormat::Png,
    )
    .map_err(|e| CrossfadeError::encode(format!("write png '{}': {e}", path.display())))
}

/// Create `dir` and its parents. Succeeds when it already exists.
pub fn ensure_dir(dir: &Path) -> CrossfadeResult<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;
    Ok(())
}
