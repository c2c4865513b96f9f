//! Frame preprocessing.
//!
//! Turns a `Frame` into a detector-ready upright image:
//! 1. rotate by the frame's sensor rotation
//! 2. mirror horizontally when the frame came from the front camera
//!
//! so that detection geometry matches what the driver sees on screen.

use image::{imageops, RgbaImage};

use crate::camera::Facing;
use crate::error::PreprocessError;
use crate::frame::Frame;

/// Upright image handed to the inference engine.
#[derive(Debug)]
pub struct PreparedImage {
    pub image: RgbaImage,
    pub facing: Facing,
    pub sequence: u64,
}

impl PreparedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Consume a frame. Any error means the frame is dropped.
    pub fn prepare(&self, frame: Frame) -> Result<PreparedImage, PreprocessError> {
        let width = frame.width;
        let height = frame.height;
        let rotation = frame.rotation_degrees;
        let facing = frame.facing;
        let sequence = frame.sequence;

        if !matches!(rotation, 0 | 90 | 180 | 270) {
            return Err(PreprocessError::UnsupportedRotation(rotation));
        }

        let expected = (width as usize) * (height as usize) * 4;
        let pixels = frame.into_pixels();
        let actual = pixels.len();
        let buffer = RgbaImage::from_raw(width, height, pixels)
            .filter(|_| actual == expected)
            .ok_or(PreprocessError::MalformedBuffer { expected, actual })?;

        let mut image = match rotation {
            90 => imageops::rotate90(&buffer),
            180 => imageops::rotate180(&buffer),
            270 => imageops::rotate270(&buffer),
            _ => buffer,
        };
        if facing == Facing::Front {
            imageops::flip_horizontal_in_place(&mut image);
        }

        Ok(PreparedImage {
            image,
            facing,
            sequence,
        })
    }
}
