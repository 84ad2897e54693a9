use thiserror::Error;

/// Failures reported by capture and playback devices
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The user (or the OS) refused access; do not retry automatically
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No such device on this machine
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// `start` found a session already running
    #[error("already started")]
    AlreadyStarted,

    /// Playback was cut short by a newer utterance
    #[error("interrupted")]
    Interrupted,

    /// Anything else the device reported
    #[error("device failure: {0}")]
    Failed(String),
}

impl DeviceError {
    /// Whether the failure means "the user has to act before we try again"
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::Unavailable(_))
    }
}
