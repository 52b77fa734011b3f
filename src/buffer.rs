use crate::foundation::error::{CrossfadeError, CrossfadeResult};
use crate::pixel;

/// Samples per pixel. Every buffer in a run is interleaved 8-bit RGB.
pub const CHANNELS: usize = 3;

/// Pixel dimensions shared by the color and grayscale sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> CrossfadeResult<Self> {
        if width == 0 || height == 0 {
            return Err(CrossfadeError::validation(format!(
                "image dimensions must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Byte length of an RGB buffer with these dimensions.
    pub fn sample_len(self) -> usize {
        (self.width as usize) * (self.height as usize) * CHANNELS
    }
}

/// Row-major interleaved RGB8 pixels.
///
/// `data.len() == width * height * 3` holds for every constructed value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageBuffer {
    dims: Dimensions,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Wrap raw samples, validating the length against `dims`.
    pub fn from_raw(dims: Dimensions, data: Vec<u8>) -> CrossfadeResult<Self> {
        if data.len() != dims.sample_len() {
            return Err(CrossfadeError::validation(format!(
                "buffer length {} does not match {}x{}x{}",
                data.len(),
                dims.width,
                dims.height,
                CHANNELS
            )));
        }
        Ok(Self { dims, data })
    }

    /// A zero-filled buffer.
    pub fn zeroed(dims: Dimensions) -> Self {
        Self {
            dims,
            data: vec![0u8; dims.sample_len()],
        }
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn width(&self) -> u32 {
        self.dims.width
    }

    pub fn height(&self) -> u32 {
        self.dims.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
}

/// The two read-only inputs every worker blends between.
///
/// Created once by the owner. Shared-memory workers borrow it; distributed workers each hold their
/// own replicated copy. Neither buffer changes after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceBuffers {
    color: ImageBuffer,
    gray: ImageBuffer,
}

impl SourceBuffers {
    /// Derive the grayscale buffer from `color`.
    #[tracing::instrument(skip_all, fields(width = color.width(), height = color.height()))]
    pub fn from_color(color: ImageBuffer) -> Self {
        let mut gray = ImageBuffer::zeroed(color.dims());
        pixel::to_grayscale_rgb8(color.as_bytes(), gray.as_bytes_mut());
        Self { color, gray }
    }

    /// Reassemble sources received from another worker.
    pub fn from_parts(color: ImageBuffer, gray: ImageBuffer) -> CrossfadeResult<Self> {
        if color.dims() != gray.dims() {
            return Err(CrossfadeError::distribution(format!(
                "color is {}x{} but gray is {}x{}",
                color.width(),
                color.height(),
                gray.width(),
                gray.height()
            )));
        }
        Ok(Self { color, gray })
    }

    pub fn dims(&self) -> Dimensions {
        self.color.dims()
    }

    pub fn color(&self) -> &ImageBuffer {
        &self.color
    }

    pub fn gray(&self) -> &ImageBuffer {
        &self.gray
    }

    /// Render one crossfade frame at interpolation factor `p`.
    pub fn blend_frame(&self, p: f32) -> ImageBuffer {
        let mut out = ImageBuffer::zeroed(self.dims());
        pixel::crossfade_into(
            self.color.as_bytes(),
            self.gray.as_bytes(),
            p,
            out.as_bytes_mut(),
        );
        out
    }
}
