use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Path to the SSD face detection model (ONNX).
    pub model_path: String,
    /// Data directory holding the gallery, status snapshot, and event logs.
    pub data_dir: PathBuf,
    /// Detection confidence threshold (boundary inclusive).
    pub confidence_threshold: f32,
    /// Correlation a gallery sample must exceed to count as a match.
    pub similarity_threshold: f32,
    /// Preview scheduling tick interval.
    pub tick_interval: Duration,
}

impl Config {
    /// Load configuration from `FACECLOCK_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("FACECLOCK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("faceclock")
            });

        Self {
            camera_device: std::env::var("FACECLOCK_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_path: std::env::var("FACECLOCK_MODEL_PATH").unwrap_or_else(|_| {
                "/usr/share/faceclock/models/res10_300x300_ssd.onnx".to_string()
            }),
            data_dir,
            confidence_threshold: env_f32(
                "FACECLOCK_CONFIDENCE_THRESHOLD",
                faceclock_core::detector::SSD_CONFIDENCE_THRESHOLD,
            ),
            similarity_threshold: env_f32(
                "FACECLOCK_SIMILARITY_THRESHOLD",
                faceclock_core::matcher::MATCH_THRESHOLD,
            ),
            tick_interval: Duration::from_millis(env_u64("FACECLOCK_TICK_MS", 10)),
        }
    }

    /// Gallery directory of registered face samples.
    pub fn gallery_dir(&self) -> PathBuf {
        self.data_dir.join("saved_attributes")
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
