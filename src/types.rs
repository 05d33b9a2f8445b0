use derive_more::{Display, From, Into};
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// Opaque bearer credential.
///
/// Held in process memory only. Deliberately not `Serialize` so it cannot be
/// written to disk-backed storage by accident, and `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize, From)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccessToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Server-assigned user identifier (opaque string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Role claimed by the identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Student,
    Admin,
    Instructor,
    Other(String),
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Student => "STUDENT",
            Self::Admin => "ADMIN",
            Self::Instructor => "INSTRUCTOR",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "STUDENT" => Self::Student,
            "ADMIN" => Self::Admin,
            "INSTRUCTOR" => Self::Instructor,
            _ => Self::Other(s),
        }
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        r.as_str().to_owned()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity returned by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub is_email_verified: Option<bool>,
    /// Outer `None`: field absent. `Some(None)`: present but null.
    #[serde(default, deserialize_with = "present_rfc3339")]
    pub email_verified_at: Option<Option<OffsetDateTime>>,
}

impl User {
    /// Fill derived fields the backend may leave out.
    ///
    /// `full_name` falls back to `"{first} {last}"`; `is_email_verified`
    /// falls back to whether `emailVerifiedAt` is set, when that field was sent.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.full_name.is_empty() && (self.first_name.is_some() || self.last_name.is_some()) {
            let first = self.first_name.as_deref().unwrap_or("");
            let last = self.last_name.as_deref().unwrap_or("");
            self.full_name = format!("{first} {last}").trim().to_owned();
        }
        if self.is_email_verified.is_none() {
            self.is_email_verified = self.email_verified_at.map(|at| at.is_some());
        }
        self
    }
}

fn present_rfc3339<'de, D>(d: D) -> Result<Option<Option<OffsetDateTime>>, D::Error>
where
    D: Deserializer<'de>,
{
    time::serde::rfc3339::option::deserialize(d).map(Some)
}

/// Three-state session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum LifecycleStatus {
    #[default]
    #[display("initializing")]
    Initializing,
    #[display("authenticated")]
    Authenticated,
    #[display("guest")]
    Guest,
}

impl LifecycleStatus {
    /// Bootstrap has settled one way or the other.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self != Self::Initializing
    }
}

/// Standard `{ "data": ... }` response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Body of token-issuing endpoints (`/auth/login`, `/auth/refresh`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub access_token: Option<AccessToken>,
}
