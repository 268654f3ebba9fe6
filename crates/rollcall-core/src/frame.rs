//! Grayscale frames, face cropping and crop size normalisation.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};

use crate::types::{BoundingBox, FaceSample};

/// A grayscale frame handed over by the frame source.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = (width as usize) * (height as usize);
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// Convert any decoded image to a grayscale frame.
    pub fn from_image(image: &DynamicImage) -> Self {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        Self {
            data: gray.into_raw(),
            width,
            height,
        }
    }

    /// Crop the face region described by `bbox`, clamped to the frame.
    ///
    /// Returns `None` when the clamped region is empty.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<FaceSample> {
        let x0 = clamp_coord(bbox.x, self.width);
        let y0 = clamp_coord(bbox.y, self.height);
        let x1 = clamp_coord(bbox.x + bbox.width, self.width);
        let y1 = clamp_coord(bbox.y + bbox.height, self.height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let w = self.width as usize;
        let mut pixels = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
        for y in y0 as usize..y1 as usize {
            let row = y * w;
            pixels.extend_from_slice(&self.data[row + x0 as usize..row + x1 as usize]);
        }
        FaceSample::new(x1 - x0, y1 - y0, pixels)
    }

    /// Bounding box covering the whole frame, for pre-cropped face images.
    pub fn full_box(&self) -> BoundingBox {
        BoundingBox::new(0.0, 0.0, self.width as f32, self.height as f32)
    }
}

fn clamp_coord(v: f32, max: u32) -> u32 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, max as f32) as u32
}

/// Resize a sample to `size`×`size` with a triangle filter so crops taken at
/// different distances stay comparable. A sample already at that size is
/// returned unchanged.
pub fn normalize(sample: FaceSample, size: u32) -> FaceSample {
    if size == 0 || sample.dimensions() == (size, size) {
        return sample;
    }
    let (width, height) = sample.dimensions();
    let Some(gray) = GrayImage::from_raw(width, height, sample.pixels.clone()) else {
        return sample;
    };
    let resized = imageops::resize(&gray, size, size, FilterType::Triangle);
    FaceSample::new(size, size, resized.into_raw()).unwrap_or(sample)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid grayscale length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32) -> Frame {
        let data = (0..width * height).map(|i| (i % 256) as u8).collect();
        Frame::new(data, width, height).unwrap()
    }

    #[test]
    fn test_frame_invalid_length() {
        assert!(Frame::new(vec![0; 5], 2, 2).is_err());
    }

    #[test]
    fn test_crop_inside_frame() {
        let frame = ramp(10, 10);
        let face = frame.crop(&BoundingBox::new(2.0, 3.0, 4.0, 2.0)).unwrap();
        assert_eq!(face.dimensions(), (4, 2));
        assert_eq!(face.pixels, vec![32, 33, 34, 35, 42, 43, 44, 45]);
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let frame = ramp(10, 10);
        let face = frame.crop(&BoundingBox::new(-3.0, 8.0, 6.0, 5.0)).unwrap();
        assert_eq!(face.dimensions(), (3, 2));
    }

    #[test]
    fn test_crop_outside_frame_is_none() {
        let frame = ramp(10, 10);
        assert!(frame.crop(&BoundingBox::new(12.0, 0.0, 4.0, 4.0)).is_none());
        assert!(frame.crop(&BoundingBox::new(2.0, 2.0, 0.0, 4.0)).is_none());
    }

    #[test]
    fn test_full_box_crop_is_whole_frame() {
        let frame = ramp(6, 4);
        let face = frame.crop(&frame.full_box()).unwrap();
        assert_eq!(face.pixels, frame.data);
    }

    #[test]
    fn test_from_image_is_grayscale() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(3, 2, image::Rgb([200, 200, 200])));
        let frame = Frame::from_image(&image);
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(frame.data.len(), 6);
        assert!(frame.data.iter().all(|&p| p == 200));
    }

    #[test]
    fn test_normalize_resizes() {
        let face = ramp(20, 12).crop(&BoundingBox::new(0.0, 0.0, 20.0, 12.0)).unwrap();
        let normalized = normalize(face, 8);
        assert_eq!(normalized.dimensions(), (8, 8));
        assert_eq!(normalized.pixels.len(), 64);
    }

    #[test]
    fn test_normalize_zero_keeps_size() {
        let face = ramp(5, 3).crop(&BoundingBox::new(0.0, 0.0, 5.0, 3.0)).unwrap();
        assert_eq!(normalize(face.clone(), 0), face);
    }
}
