use crate::engine::EngineHandle;
use faceclock_store::ClockAction;
use zbus::interface;

/// D-Bus interface for the attendance kiosk daemon.
///
/// Bus name: org.freedesktop.Faceclock1
/// Object path: /org/freedesktop/Faceclock1
///
/// Replies are JSON-encoded outcome objects so the UI layer can render
/// success and failure messages without caring about D-Bus error mapping.
pub struct KioskService {
    pub engine: EngineHandle,
}

impl KioskService {
    fn encode<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
        serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }
}

#[interface(name = "org.freedesktop.Faceclock1")]
impl KioskService {
    /// Register the face currently in front of the camera under `username`.
    async fn signup(&self, username: &str) -> zbus::fdo::Result<String> {
        tracing::info!(username, "signup requested");
        let outcome = self
            .engine
            .signup(username.to_string())
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Self::encode(&outcome)
    }

    /// Clock in by face recognition.
    async fn clock_in(&self) -> zbus::fdo::Result<String> {
        tracing::info!("clock-in requested");
        let outcome = self
            .engine
            .clock(ClockAction::In)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Self::encode(&outcome)
    }

    /// Clock out by face recognition.
    async fn clock_out(&self) -> zbus::fdo::Result<String> {
        tracing::info!("clock-out requested");
        let outcome = self
            .engine
            .clock(ClockAction::Out)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Self::encode(&outcome)
    }

    /// Per-user clock statuses and registered-sample count.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let report = self
            .engine
            .status()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Self::encode(&report)
    }

    /// Bounding boxes from the latest preview tick, for the UI overlay.
    async fn preview(&self) -> zbus::fdo::Result<String> {
        Self::encode(&self.engine.latest_detections())
    }
}
