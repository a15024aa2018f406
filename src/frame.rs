//! Captured still frames.
//!
//! A `Frame` is an already-decoded RGB8 image plus the wall-clock time it was
//! captured and the camera location it came from. Frames are immutable once
//! built: pixels and metadata are only reachable through accessors.

use chrono::NaiveDateTime;
use image::{DynamicImage, RgbImage};

use crate::error::{CounterError, Result};

/// Channels per pixel. Frames are always RGB8.
pub const RGB_CHANNELS: u8 = 3;

pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    captured_at: NaiveDateTime,
    location: String,
}

impl Frame {
    /// Build a frame from a row-major RGB8 buffer.
    ///
    /// Rejects empty dimensions and buffers whose length does not match
    /// `width * height * 3`.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        captured_at: NaiveDateTime,
        location: &str,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CounterError::CaptureFailure {
                location: location.to_string(),
                reason: format!("frame has empty dimensions {}x{}", width, height),
            });
        }
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS as usize))
            .ok_or_else(|| CounterError::CaptureFailure {
                location: location.to_string(),
                reason: "frame dimensions overflow".to_string(),
            })?;
        if data.len() != expected_len {
            return Err(CounterError::CaptureFailure {
                location: location.to_string(),
                reason: format!(
                    "expected {} RGB bytes, received {}",
                    expected_len,
                    data.len()
                ),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            captured_at,
            location: location.to_string(),
        })
    }

    /// Build a frame from any decoded image, converting it to RGB8.
    pub fn from_image(
        image: DynamicImage,
        captured_at: NaiveDateTime,
        location: &str,
    ) -> Result<Self> {
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(rgb.into_raw(), width, height, captured_at, location)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        RGB_CHANNELS
    }

    pub fn captured_at(&self) -> NaiveDateTime {
        self.captured_at
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Copy of the pixels as an `RgbImage`, for encoding or resizing.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("captured_at", &self.captured_at)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
