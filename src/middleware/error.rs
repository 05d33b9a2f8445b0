use axum::response::{IntoResponse, Redirect, Response};

/// Routing guard errors.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Protected page requested without a refresh cookie.
    #[error("Login required, redirecting to {location}")]
    LoginRequired { location: String },

    /// Invalid route settings.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        match self {
            Self::LoginRequired { location } => Redirect::temporary(&location).into_response(),
            Self::Config(_) => {
                tracing::error!(error = %self, "Route guard misconfigured");
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}
