//! On-disk gallery of registered face samples.

use chrono::Local;
use faceclock_core::types::FaceSample;
use faceclock_core::{Matcher, TemplateMatcher};
use image::GrayImage;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Timestamp format used in sample file names.
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("no face captured")]
    NoFace,
    #[error("this face is already registered")]
    DuplicateFace,
    #[error("gallery io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sample encode: {0}")]
    Image(#[from] image::ImageError),
}

/// The set of persisted face samples, one image file per registration.
///
/// Files are named `{username}_{timestamp}.png`; the username is everything
/// before the first `_`. Samples are held in memory in sorted file-name
/// order. `register` appends to the in-memory set synchronously, so a
/// registration is visible to the very next match without a reload.
pub struct Gallery {
    dir: PathBuf,
    samples: Vec<FaceSample>,
    matcher: TemplateMatcher,
}

impl Gallery {
    /// Open a gallery, creating the directory if absent, and load every
    /// readable sample in it.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        Self::with_matcher(dir, TemplateMatcher::default())
    }

    pub fn with_matcher(
        dir: impl Into<PathBuf>,
        matcher: TemplateMatcher,
    ) -> Result<Self, std::io::Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let mut gallery = Self { dir, samples: Vec::new(), matcher };
        gallery.reload()?;
        Ok(gallery)
    }

    /// Re-read every sample from the directory, in sorted file-name order.
    ///
    /// Unreadable or unparsable files are skipped with a warning, never
    /// fatal — the gallery tolerates partial corruption.
    pub fn reload(&mut self) -> Result<(), std::io::Error> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        self.samples.clear();
        for path in &paths {
            match load_sample(path) {
                Some(sample) => self.samples.push(sample),
                None => {
                    tracing::warn!(path = %path.display(), "skipping unreadable gallery file")
                }
            }
        }

        tracing::debug!(dir = %self.dir.display(), samples = self.samples.len(), "gallery loaded");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn samples(&self) -> &[FaceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Match a candidate crop against the gallery; first match wins.
    pub fn matches(&self, candidate: &GrayImage) -> Option<&str> {
        self.matcher.match_candidate(candidate, &self.samples)
    }

    /// Register a new face sample under `username`.
    ///
    /// Rejects `DuplicateFace` when the candidate matches any existing
    /// sample, whichever username it belongs to — the same face cannot be
    /// registered twice, not even under a different name. `NoFace` when the
    /// caller had no candidate to offer.
    pub fn register(
        &mut self,
        username: &str,
        candidate: Option<&GrayImage>,
    ) -> Result<PathBuf, RegisterError> {
        let candidate = candidate.ok_or(RegisterError::NoFace)?;

        if let Some(existing) = self.matches(candidate) {
            tracing::info!(username, existing, "rejecting duplicate face registration");
            return Err(RegisterError::DuplicateFace);
        }

        let timestamp = Local::now().format(FILE_TIMESTAMP_FORMAT).to_string();
        let path = self.dir.join(format!("{username}_{timestamp}.png"));
        candidate.save(&path)?;

        self.samples.push(FaceSample {
            username: username.to_string(),
            image: candidate.clone(),
            created_at: timestamp,
        });

        tracing::info!(username, path = %path.display(), "face sample registered");
        Ok(path)
    }
}

/// Load one sample, taking the username from the file-name prefix before the
/// first `_`. Returns `None` for anything unreadable.
fn load_sample(path: &Path) -> Option<FaceSample> {
    let stem = path.file_stem()?.to_str()?;
    let (username, created_at) = match stem.split_once('_') {
        Some((user, rest)) => (user, rest),
        None => (stem, ""),
    };
    if username.is_empty() {
        return None;
    }

    let image = image::open(path).ok()?.into_luma8();

    Some(FaceSample {
        username: username.to_string(),
        image,
        created_at: created_at.to_string(),
    })
}
