//! Classification of API paths for the request policies.

use serde::Deserialize;

const AUTH_BYPASS: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/refresh",
    "/auth/forgot-password",
    "/auth/reset-password",
];

const AUTH_PROTECTED: &[&str] = &["/students", "/courses", "/progress", "/enrollments"];

const HEALTH: &str = "/health";

/// Structured codes the API uses for an expired access token.
const EXPIRED_CODES: &[&str] = &["TOKEN_EXPIRED", "JWT_EXPIRED"];

pub(crate) const REFRESH_PATH: &str = "/auth/refresh";
pub(crate) const ME_PATH: &str = "/auth/me";
pub(crate) const LOGOUT_PATH: &str = "/auth/logout";

fn path_only(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

fn normalized(url: &str) -> String {
    let path = path_only(url);
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

/// 401s from these never trigger a refresh.
///
/// Matches whole segments anywhere in the path, so a base path in front
/// (`/v1/auth/login`) still counts but `/auth/login-history` does not.
#[must_use]
pub fn is_auth_bypass(url: &str) -> bool {
    let path = path_only(url).trim_end_matches('/');
    AUTH_BYPASS
        .iter()
        .any(|p| path.ends_with(p) || path.contains(&format!("{p}/")))
}

/// Requests held by the readiness gate while the session bootstraps.
#[must_use]
pub fn is_auth_protected(url: &str) -> bool {
    let path = normalized(url);
    AUTH_PROTECTED
        .iter()
        .any(|p| path == *p || path.starts_with(&format!("{p}/")))
}

/// The low-value polling endpoint subject to throttling.
#[must_use]
pub fn is_health(url: &str) -> bool {
    path_only(url).contains(HEALTH)
}

/// Error body shape returned by the API.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) message: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) code: Option<String>,
}

impl ErrorBody {
    pub(crate) fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// `message` may be a string or a list of strings.
    pub(crate) fn message(&self) -> Option<String> {
        match self.message.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            other => Some(other.to_string()),
        }
    }
}

/// Whether a 401 body describes an expired token rather than a missing one.
///
/// The structured `code` is checked first; the message text is a fallback for
/// API versions that do not send one.
#[must_use]
pub fn looks_expired(body: &[u8]) -> bool {
    let parsed = ErrorBody::parse(body);
    if let Some(code) = parsed.code.as_deref() {
        if EXPIRED_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)) {
            return true;
        }
    }
    parsed
        .message()
        .is_some_and(|m| m.to_ascii_lowercase().contains("expired"))
}
