//! Error taxonomy for the build pipeline.

/// Everything that can stop a request or a round.
///
/// Only `Unauthorized` is ever seen by the caller of `/api/build`; the rest
/// happen after the acknowledgement and end up in the logs and counters.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Unauthorized: secret mismatch")]
    Unauthorized,
    #[error("Generation failed: {0}")]
    Generation(String),
    #[error("Publish conflict on {path}: remote version moved")]
    PublishConflict { path: String },
    #[error("Publish failed: {0}")]
    Publish(String),
    #[error("Notification delivery failed after {attempts} attempts: {last_error}")]
    NotificationDelivery { attempts: u32, last_error: String },
}

impl BuildError {
    /// Short machine-readable tag used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::Unauthorized => "unauthorized",
            BuildError::Generation(_) => "generation",
            BuildError::PublishConflict { .. } => "publish_conflict",
            BuildError::Publish(_) => "publish",
            BuildError::NotificationDelivery { .. } => "notification_delivery",
        }
    }
}

pub type BuildResult<T> = Result<T, BuildError>;
