//! In-memory image batches, laid out `[count, height, width, 3]` in `[0, 1]`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImageBatchError {
    #[error("Cannot build an empty image batch")]
    Empty,
    #[error("Image {index} is {width}x{height}, expected {expected_width}x{expected_height}")]
    SizeMismatch {
        index: usize,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("Pixel buffer holds {actual} values, expected {expected}")]
    BufferLength { expected: usize, actual: usize },
}

/// A single RGB image with normalized float channels.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

impl RgbImage {
    pub fn new(width: u32, height: u32, pixels: Vec<f32>) -> Result<Self, ImageBatchError> {
        let expected = width as usize * height as usize * ImageBatch::CHANNELS;
        if pixels.len() != expected {
            return Err(ImageBatchError::BufferLength {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Normalize 8-bit RGB samples into `[0, 1]`.
    pub fn from_rgb8(width: u32, height: u32, samples: &[u8]) -> Result<Self, ImageBatchError> {
        let pixels = samples.iter().map(|&s| f32::from(s) / 255.0).collect();
        Self::new(width, height, pixels)
    }
}

/// A batch of equally sized RGB images.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    count: usize,
    width: u32,
    height: u32,
    pixels: Vec<f32>,
}

impl ImageBatch {
    pub const CHANNELS: usize = 3;

    /// A single all-black image.
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            count: 1,
            width,
            height,
            pixels: vec![0.0; width as usize * height as usize * Self::CHANNELS],
        }
    }

    /// Stack images along a new leading axis. All images must share dimensions.
    pub fn stack(images: Vec<RgbImage>) -> Result<Self, ImageBatchError> {
        let first = images.first().ok_or(ImageBatchError::Empty)?;
        let (width, height) = (first.width, first.height);

        for (index, image) in images.iter().enumerate() {
            if image.width != width || image.height != height {
                return Err(ImageBatchError::SizeMismatch {
                    index,
                    width: image.width,
                    height: image.height,
                    expected_width: width,
                    expected_height: height,
                });
            }
        }

        let count = images.len();
        let mut pixels = Vec::with_capacity(count * width as usize * height as usize * Self::CHANNELS);
        for image in images {
            pixels.extend(image.pixels);
        }

        Ok(Self {
            count,
            width,
            height,
            pixels,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `[count, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        [
            self.count,
            self.height as usize,
            self.width as usize,
            Self::CHANNELS,
        ]
    }

    /// Pixels of one image, row-major RGB.
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        if index >= self.count {
            return None;
        }
        let frame_len = self.width as usize * self.height as usize * Self::CHANNELS;
        let start = index * frame_len;
        self.pixels.get(start..start + frame_len)
    }

    /// One image as clamped 8-bit RGB samples.
    pub fn frame_rgb8(&self, index: usize) -> Option<Vec<u8>> {
        self.frame(index).map(|frame| {
            frame
                .iter()
                .map(|&v| (v * 255.0).clamp(0.0, 255.0) as u8)
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_placeholder_shape() {
        let batch = ImageBatch::black(512, 512);
        assert_eq!(batch.shape(), [1, 512, 512, 3]);
        assert!(batch.frame(0).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn stack_normalizes_and_orders_frames() {
        let white = RgbImage::from_rgb8(1, 1, &[255, 255, 255]).unwrap();
        let grey = RgbImage::from_rgb8(1, 1, &[51, 102, 0]).unwrap();

        let batch = ImageBatch::stack(vec![white, grey]).unwrap();

        assert_eq!(batch.shape(), [2, 1, 1, 3]);
        assert_eq!(batch.frame(0).unwrap(), &[1.0, 1.0, 1.0]);
        assert_eq!(batch.frame(1).unwrap(), &[0.2, 0.4, 0.0]);
        assert_eq!(batch.frame_rgb8(1).unwrap(), vec![51, 102, 0]);
        assert!(batch.frame(2).is_none());
    }

    #[test]
    fn stack_rejects_mixed_sizes() {
        let a = RgbImage::from_rgb8(1, 1, &[0, 0, 0]).unwrap();
        let b = RgbImage::from_rgb8(2, 1, &[0, 0, 0, 0, 0, 0]).unwrap();

        let err = ImageBatch::stack(vec![a, b]).unwrap_err();
        assert!(matches!(err, ImageBatchError::SizeMismatch { index: 1, .. }));
        assert_eq!(ImageBatch::stack(Vec::new()).unwrap_err(), ImageBatchError::Empty);
    }
}
