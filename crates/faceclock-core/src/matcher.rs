//! Identity matching by template correlation.
//!
//! The candidate crop and every gallery sample are resized to a canonical
//! 100×100 grid and scored with zero-mean normalized cross-correlation. Both
//! grids have the same size, so the maximum over template placements is the
//! single full-overlap placement. This is a crude appearance comparison, not
//! face recognition — but it is deterministic for a fixed gallery order,
//! which is the property the rest of the system depends on.

use crate::types::FaceSample;
use image::{imageops, GrayImage};

/// Side length both crops are resized to before scoring.
pub const CANONICAL_SIZE: u32 = 100;

/// Similarity a sample must exceed (strictly) to count as a match.
pub const MATCH_THRESHOLD: f32 = 0.8;

/// Strategy for matching a candidate crop against the registered gallery.
pub trait Matcher {
    /// Return the username of the first gallery sample whose similarity to
    /// `candidate` exceeds the threshold, or `None` when nothing matches.
    /// "No match" is a normal outcome, not an error.
    fn match_candidate<'a>(
        &self,
        candidate: &GrayImage,
        gallery: &'a [FaceSample],
    ) -> Option<&'a str>;
}

/// Normalized cross-correlation matcher.
///
/// Scans the gallery in persisted order and returns on the first sample over
/// the threshold. Ties resolve by encounter order, not by score — two samples
/// both over the threshold always yield the earlier one.
pub struct TemplateMatcher {
    threshold: f32,
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self::new(MATCH_THRESHOLD)
    }
}

impl TemplateMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Similarity of two crops after canonical resize, in [-1, 1].
    pub fn similarity(a: &GrayImage, b: &GrayImage) -> f32 {
        if a.width() == 0 || a.height() == 0 || b.width() == 0 || b.height() == 0 {
            return 0.0;
        }
        correlate(&canonicalize(a), &canonicalize(b))
    }
}

impl Matcher for TemplateMatcher {
    fn match_candidate<'a>(
        &self,
        candidate: &GrayImage,
        gallery: &'a [FaceSample],
    ) -> Option<&'a str> {
        if candidate.width() == 0 || candidate.height() == 0 {
            return None;
        }
        let probe = canonicalize(candidate);

        for sample in gallery {
            if sample.image.width() == 0 || sample.image.height() == 0 {
                continue;
            }
            let score = correlate(&probe, &canonicalize(&sample.image));
            if score > self.threshold {
                tracing::debug!(username = %sample.username, score, "gallery match");
                return Some(&sample.username);
            }
        }
        None
    }
}

fn canonicalize(img: &GrayImage) -> GrayImage {
    if img.dimensions() == (CANONICAL_SIZE, CANONICAL_SIZE) {
        img.clone()
    } else {
        imageops::resize(img, CANONICAL_SIZE, CANONICAL_SIZE, imageops::FilterType::Triangle)
    }
}

/// Zero-mean normalized cross-correlation of two equally sized grids.
///
/// Flat (zero-variance) inputs score 0.0, so a blank crop can never match.
fn correlate(a: &GrayImage, b: &GrayImage) -> f32 {
    debug_assert_eq!(a.dimensions(), b.dimensions());

    let n = (a.width() * a.height()) as f32;
    let mean_a = a.as_raw().iter().map(|&p| p as f32).sum::<f32>() / n;
    let mean_b = b.as_raw().iter().map(|&p| p as f32).sum::<f32>() / n;

    let mut cross = 0.0f32;
    let mut var_a = 0.0f32;
    let mut var_b = 0.0f32;

    for (&pa, &pb) in a.as_raw().iter().zip(b.as_raw().iter()) {
        let da = pa as f32 - mean_a;
        let db = pb as f32 - mean_b;
        cross += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom > 0.0 { cross / denom } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smooth diagonal ramp — survives resizing, so the same pattern at two
    /// resolutions still correlates.
    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| image::Luma([((x + y) * 255 / (w + h)) as u8]))
    }

    fn inverted_gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| image::Luma([255 - ((x + y) * 255 / (w + h)) as u8]))
    }

    fn sample(username: &str, image: GrayImage) -> FaceSample {
        FaceSample { username: username.to_string(), image, created_at: String::new() }
    }

    #[test]
    fn test_similarity_identical() {
        let img = gradient(120, 90);
        assert!((TemplateMatcher::similarity(&img, &img) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_similarity_size_invariant() {
        // Same pattern at different resolutions still scores high
        let a = gradient(200, 200);
        let b = gradient(100, 100);
        assert!(TemplateMatcher::similarity(&a, &b) > 0.9);
    }

    #[test]
    fn test_similarity_opposite() {
        let a = gradient(100, 100);
        let b = inverted_gradient(100, 100);
        assert!(TemplateMatcher::similarity(&a, &b) < -0.9);
    }

    #[test]
    fn test_similarity_flat_is_zero() {
        let flat = GrayImage::from_pixel(100, 100, image::Luma([128]));
        let img = gradient(100, 100);
        assert_eq!(TemplateMatcher::similarity(&flat, &img), 0.0);
        assert_eq!(TemplateMatcher::similarity(&flat, &flat), 0.0);
    }

    #[test]
    fn test_match_empty_gallery() {
        let matcher = TemplateMatcher::default();
        assert_eq!(matcher.match_candidate(&gradient(100, 100), &[]), None);
    }

    #[test]
    fn test_match_returns_registered_username() {
        let matcher = TemplateMatcher::default();
        let face = gradient(100, 100);
        let gallery = vec![
            sample("alice", inverted_gradient(100, 100)),
            sample("bob", face.clone()),
        ];
        assert_eq!(matcher.match_candidate(&face, &gallery), Some("bob"));
    }

    #[test]
    fn test_match_no_match_below_threshold() {
        let matcher = TemplateMatcher::default();
        let gallery = vec![sample("alice", inverted_gradient(100, 100))];
        assert_eq!(matcher.match_candidate(&gradient(100, 100), &gallery), None);
    }

    #[test]
    fn test_match_first_wins_on_tie() {
        // Both entries score identically above threshold; the earlier one
        // must win, deterministically, on every call.
        let matcher = TemplateMatcher::default();
        let face = gradient(100, 100);
        let gallery = vec![sample("first", face.clone()), sample("second", face.clone())];
        for _ in 0..5 {
            assert_eq!(matcher.match_candidate(&face, &gallery), Some("first"));
        }
    }

    #[test]
    fn test_match_skips_degenerate_sample() {
        let matcher = TemplateMatcher::default();
        let face = gradient(100, 100);
        let empty = GrayImage::new(0, 0);
        let gallery = vec![sample("broken", empty), sample("alice", face.clone())];
        assert_eq!(matcher.match_candidate(&face, &gallery), Some("alice"));
    }

    #[test]
    fn test_match_zero_area_candidate() {
        let matcher = TemplateMatcher::default();
        let gallery = vec![sample("alice", gradient(100, 100))];
        assert_eq!(matcher.match_candidate(&GrayImage::new(0, 0), &gallery), None);
    }

    #[test]
    fn test_threshold_is_strict() {
        // A sample scoring exactly at the threshold is not a match
        let face = gradient(100, 100);
        let score = TemplateMatcher::similarity(&face, &face);
        let matcher = TemplateMatcher::new(score);
        let gallery = vec![sample("alice", face.clone())];
        assert_eq!(matcher.match_candidate(&face, &gallery), None);
    }
}
