//! Session controller engine.
//!
//! A dedicated OS thread owns the camera, detector, gallery, and attendance
//! ledger; D-Bus handlers talk to it over an mpsc channel with oneshot
//! replies. Between requests the thread runs a fixed-interval preview tick:
//! capture a frame, detect, and publish the detections for the UI overlay.
//! A failed camera read is "no frame this tick", never an error.

use crate::config::Config;
use faceclock_core::detector::Detect;
use faceclock_core::matcher::TemplateMatcher;
use faceclock_core::Detection;
use faceclock_store::attendance::EVENT_TIMESTAMP_FORMAT;
use faceclock_store::{AttendanceLedger, ClockAction, ClockError, Gallery, RegisterError};
use image::{imageops, GrayImage};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] faceclock_hw::CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] faceclock_core::detector::DetectorError),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("engine thread spawn: {0}")]
    ThreadSpawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of a signup attempt, surfaced to the UI layer.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignupOutcome {
    Saved { username: String, path: String },
    MissingUsername,
    InvalidUsername,
    NoFace,
    DuplicateFace,
    Error { message: String },
}

/// Result of a clock-in/clock-out attempt, surfaced to the UI layer.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClockOutcome {
    Success { username: String, action: String, timestamp: String },
    NoFaceDetected,
    FaceNotRecognized,
    AlreadyInThatState { username: String },
    Error { message: String },
}

/// Daemon status snapshot for the UI.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub registered_samples: usize,
    /// Per-user clock state ("in"/"out").
    pub statuses: BTreeMap<String, String>,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Signup {
        username: String,
        reply: oneshot::Sender<SignupOutcome>,
    },
    Clock {
        action: ClockAction,
        reply: oneshot::Sender<ClockOutcome>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    preview: Arc<Mutex<Vec<Detection>>>,
}

impl EngineHandle {
    /// Register the face currently in front of the camera under `username`.
    pub async fn signup(&self, username: String) -> Result<SignupOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Signup { username, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Clock the recognized face in or out.
    pub async fn clock(&self, action: ClockAction) -> Result<ClockOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Clock { action, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Snapshot of per-user statuses and gallery size.
    pub async fn status(&self) -> Result<StatusReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Detections from the most recent preview tick.
    pub fn latest_detections(&self) -> Vec<Detection> {
        self.preview.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the camera, loads the detection model, and loads the gallery and
/// ledger synchronously — any of those failing is a fatal startup error.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let camera = faceclock_hw::Camera::open(&config.camera_device)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        "camera opened"
    );

    let mut detector = faceclock_core::FaceDetector::load_with_threshold(
        &config.model_path,
        config.confidence_threshold,
    )?;
    tracing::info!(path = %config.model_path, "SSD face model loaded");

    let mut gallery = Gallery::with_matcher(
        config.gallery_dir(),
        TemplateMatcher::new(config.similarity_threshold),
    )?;
    tracing::info!(dir = %config.gallery_dir().display(), samples = gallery.len(), "gallery loaded");

    let mut ledger = AttendanceLedger::load(&config.data_dir)?;
    tracing::info!(dir = %config.data_dir.display(), "attendance ledger loaded");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let preview = Arc::new(Mutex::new(Vec::new()));
    let preview_writer = Arc::clone(&preview);
    let tick_interval = config.tick_interval;

    std::thread::Builder::new()
        .name("faceclock-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            loop {
                match rx.try_recv() {
                    Ok(EngineRequest::Signup { username, reply }) => {
                        let frame = capture_image(&camera);
                        let outcome =
                            run_signup(frame.as_ref(), &mut detector, &mut gallery, &username);
                        let _ = reply.send(outcome);
                    }
                    Ok(EngineRequest::Clock { action, reply }) => {
                        let frame = capture_image(&camera);
                        let outcome = run_clock(
                            frame.as_ref(),
                            &mut detector,
                            &gallery,
                            &mut ledger,
                            action,
                        );
                        let _ = reply.send(outcome);
                    }
                    Ok(EngineRequest::Status { reply }) => {
                        let statuses = ledger
                            .statuses()
                            .map(|(user, action)| (user.to_string(), action.to_string()))
                            .collect();
                        let _ = reply.send(StatusReport {
                            registered_samples: gallery.len(),
                            statuses,
                        });
                    }
                    Err(TryRecvError::Empty) => {
                        preview_tick(&camera, &mut detector, &preview_writer);
                        std::thread::sleep(tick_interval);
                    }
                    Err(TryRecvError::Disconnected) => break,
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::ThreadSpawn)?;

    Ok(EngineHandle { tx, preview })
}

/// Capture one frame as a grayscale image; `None` when there is no usable
/// frame this tick.
fn capture_image(camera: &faceclock_hw::Camera) -> Option<GrayImage> {
    match camera.capture_frame() {
        Ok(frame) => frame.to_image(),
        Err(e) => {
            tracing::debug!(error = %e, "no frame this tick");
            None
        }
    }
}

/// One preview pass: detect in the current frame and publish the boxes for
/// the UI overlay. Has no persistent effect.
fn preview_tick(
    camera: &faceclock_hw::Camera,
    detector: &mut dyn Detect,
    preview: &Arc<Mutex<Vec<Detection>>>,
) {
    let Some(frame) = capture_image(camera) else {
        return;
    };
    match detector.detect_faces(&frame) {
        Ok(detections) => {
            if let Ok(mut slot) = preview.lock() {
                *slot = detections;
            }
        }
        Err(e) => tracing::warn!(error = %e, "preview detection failed"),
    }
}

/// Crop the detected region out of the frame, clamped to frame bounds.
fn crop_face(frame: &GrayImage, det: &Detection) -> GrayImage {
    let x0 = det.x0.min(frame.width());
    let y0 = det.y0.min(frame.height());
    let w = det.width().min(frame.width() - x0);
    let h = det.height().min(frame.height() - y0);
    imageops::crop_imm(frame, x0, y0, w, h).to_image()
}

/// Signup: detect, crop the first face, register it under `username`.
///
/// Pure over its inputs so it can run headlessly on synthetic frames.
pub fn run_signup(
    frame: Option<&GrayImage>,
    detector: &mut dyn Detect,
    gallery: &mut Gallery,
    username: &str,
) -> SignupOutcome {
    let username = username.trim();
    if username.is_empty() {
        return SignupOutcome::MissingUsername;
    }
    // The snapshot format separates fields with spaces and sample file names
    // separate the username with '_'; a username containing either would not
    // round-trip through a restart. Path separators would escape the gallery
    // directory.
    if username
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '_' | '/' | '\\'))
    {
        tracing::info!(username, "rejecting username with separator characters");
        return SignupOutcome::InvalidUsername;
    }

    let Some(frame) = frame else {
        return SignupOutcome::NoFace;
    };

    let detections = match detector.detect_faces(frame) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "signup: detection failed");
            return SignupOutcome::Error { message: e.to_string() };
        }
    };

    // Only the first detected face is used; picking a "best" face among
    // several is out of scope.
    let crop = detections.first().map(|det| crop_face(frame, det));

    match gallery.register(username, crop.as_ref()) {
        Ok(path) => SignupOutcome::Saved {
            username: username.to_string(),
            path: path.display().to_string(),
        },
        Err(RegisterError::NoFace) => SignupOutcome::NoFace,
        Err(RegisterError::DuplicateFace) => SignupOutcome::DuplicateFace,
        Err(e) => {
            tracing::warn!(error = %e, "signup: register failed");
            SignupOutcome::Error { message: e.to_string() }
        }
    }
}

/// Clock action: detect, match the first face against the gallery, apply the
/// transition.
pub fn run_clock(
    frame: Option<&GrayImage>,
    detector: &mut dyn Detect,
    gallery: &Gallery,
    ledger: &mut AttendanceLedger,
    action: ClockAction,
) -> ClockOutcome {
    let Some(frame) = frame else {
        return ClockOutcome::NoFaceDetected;
    };

    let detections = match detector.detect_faces(frame) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "clock: detection failed");
            return ClockOutcome::Error { message: e.to_string() };
        }
    };

    let Some(det) = detections.first() else {
        return ClockOutcome::NoFaceDetected;
    };

    let crop = crop_face(frame, det);
    let Some(username) = gallery.matches(&crop).map(str::to_string) else {
        return ClockOutcome::FaceNotRecognized;
    };

    match ledger.clock(&username, action) {
        Ok(event) => ClockOutcome::Success {
            username: event.username,
            action: event.action.to_string(),
            timestamp: event.timestamp.format(EVENT_TIMESTAMP_FORMAT).to_string(),
        },
        Err(ClockError::AlreadyInThatState { username, .. }) => {
            ClockOutcome::AlreadyInThatState { username }
        }
        Err(e) => {
            tracing::warn!(error = %e, "clock: ledger update failed");
            ClockOutcome::Error { message: e.to_string() }
        }
    }
}
