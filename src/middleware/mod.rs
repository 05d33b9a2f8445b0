//! Routing guard for Axum servers that render the student pages.
//!
//! Protected pages (dashboard, profile, lesson player, enrollment, email
//! verification) are only served when the request carries the refresh cookie;
//! otherwise the guard answers with a redirect to the localized login page.
//! The client-visible `isLoggedIn` hint is never trusted here.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use student_portal_auth::RouteConfig;
//! use student_portal_auth::middleware::{GuardConfig, protect};
//!
//! let guard = GuardConfig::new(RouteConfig::default())?;
//! let app = protect(axum::Router::new().route("/{locale}/dashboard", get(dashboard)), guard);
//! ```

mod config;
mod error;
mod guard;

pub use config::GuardConfig;
pub use error::GuardError;
pub use guard::{GuardDecision, decide, protect, require_session};
