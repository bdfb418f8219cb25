//! faceclock-core — Face detection and identity matching.
//!
//! Detection runs the ResNet-10 SSD face model via ONNX Runtime. Identity
//! matching is deliberately not embedding-based: registered samples are
//! compared by normalized cross-correlation at a canonical size, which keeps
//! match results deterministic for a fixed gallery order.

pub mod detector;
pub mod matcher;
pub mod types;

pub use detector::{Detect, FaceDetector};
pub use matcher::{Matcher, TemplateMatcher};
pub use types::{Detection, FaceSample};
