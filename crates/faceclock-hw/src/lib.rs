//! faceclock-hw — Webcam capture for the kiosk.
//!
//! V4L2-based camera access producing grayscale frames for the detection
//! pipeline.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, PixelFormat};
pub use frame::Frame;
