use image::GrayImage;
use serde::{Deserialize, Serialize};

/// A detected face region in frame pixel coordinates.
///
/// Invariant: `x0 < x1`, `y0 < y1`, all coordinates within the bounds of the
/// frame the detection was produced from. Lives only for one frame's
/// processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
    pub confidence: f32,
}

impl Detection {
    /// Build a detection from SSD box corners normalized to [0,1].
    ///
    /// Corners are scaled to frame pixels and clamped to frame bounds.
    /// Returns `None` when the clamped box has zero area.
    pub fn from_normalized(
        confidence: f32,
        nx0: f32,
        ny0: f32,
        nx1: f32,
        ny1: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        // max/min rather than clamp: NaN coordinates collapse to 0.
        let scale = |v: f32, dim: u32| (v.max(0.0).min(1.0) * dim as f32) as u32;

        let x0 = scale(nx0, frame_width);
        let y0 = scale(ny0, frame_height);
        let x1 = scale(nx1, frame_width).min(frame_width);
        let y1 = scale(ny1, frame_height).min(frame_height);

        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        Some(Self { x0, y0, x1, y1, confidence })
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// A registered face sample: the stored grayscale crop plus the username it
/// was registered under.
#[derive(Debug, Clone)]
pub struct FaceSample {
    pub username: String,
    pub image: GrayImage,
    /// Capture timestamp as recorded in the sample's file name
    /// (`YYYYMMDD-HHMMSS`); empty when the file name carries none.
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_normalized_scales_to_frame() {
        let det = Detection::from_normalized(0.9, 0.25, 0.5, 0.75, 1.0, 640, 480).unwrap();
        assert_eq!((det.x0, det.y0, det.x1, det.y1), (160, 240, 480, 480));
        assert_eq!(det.width(), 320);
        assert_eq!(det.height(), 240);
    }

    #[test]
    fn test_from_normalized_clamps_out_of_range() {
        // SSD occasionally emits corners outside [0,1]
        let det = Detection::from_normalized(0.9, -0.2, -0.1, 1.3, 1.1, 100, 100).unwrap();
        assert_eq!((det.x0, det.y0, det.x1, det.y1), (0, 0, 100, 100));
    }

    #[test]
    fn test_from_normalized_rejects_zero_area() {
        assert!(Detection::from_normalized(0.9, 0.5, 0.5, 0.5, 0.9, 100, 100).is_none());
        assert!(Detection::from_normalized(0.9, 0.8, 0.1, 0.2, 0.9, 100, 100).is_none());
    }

    #[test]
    fn test_from_normalized_nan_coordinates() {
        // NaN corners collapse to 0 and the box is rejected, never panics
        assert!(Detection::from_normalized(0.9, f32::NAN, 0.0, f32::NAN, 1.0, 100, 100).is_none());
    }
}
