use reqwest::StatusCode;

/// Why a request resolved as canceled instead of completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum CancelReason {
    /// A newer request was issued under the same abort key.
    #[display("superseded by a newer request")]
    Superseded,
    /// The caller aborted the key explicitly.
    #[display("aborted by caller")]
    Aborted,
    /// Dropped by the noisy-endpoint throttle before it was sent.
    #[display("suppressed: {_0}")]
    Suppressed(&'static str),
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: StatusCode, message: String },

    /// Never an authentication failure; callers should usually ignore it.
    #[error("Request canceled: {0}")]
    Canceled(CancelReason),

    #[error("Session refresh failed: {0}")]
    RefreshExhausted(String),

    #[error("Role {0:?} is not allowed for this client")]
    RoleRejected(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to initialize authenticated user")]
    Hydration,

    #[error("Response carried no access token")]
    MissingToken,
}

impl Error {
    /// `true` for supersede/abort/suppression outcomes.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// HTTP status carried by the error, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Network(e) => e.status(),
            _ => None,
        }
    }

    /// `true` when the session is gone and the caller should treat the user as a guest.
    #[must_use]
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::RefreshExhausted(_) | Self::RoleRejected(_))
    }
}
