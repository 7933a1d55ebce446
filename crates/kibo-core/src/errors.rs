//! Error types for the capability, device, and storage seams.

use thiserror::Error;

/// Failure of a remote AI capability call.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("capability unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for CapabilityError {
    fn from(e: reqwest::Error) -> Self {
        CapabilityError::Transport(e.to_string())
    }
}

/// Failure of a local device (microphone, screen, clipboard, file, speaker).
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Actionable text for the notification surface.
    pub fn user_message(&self, device: &str) -> String {
        match self {
            DeviceError::PermissionDenied(_) => {
                format!("Please grant {} permission so I can help with that.", device)
            }
            DeviceError::Unavailable(_) => format!("The {} isn't available right now.", device),
            DeviceError::Io(e) => format!("Couldn't read from the {}: {}", device, e),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
