use std::sync::Arc;

use super::error::GuardError;
use crate::config::RouteConfig;

/// Validated route settings shared by every guarded request.
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub(super) routes: Arc<RouteConfig>,
}

impl GuardConfig {
    /// # Errors
    ///
    /// Returns [`GuardError::Config`] if no locale is configured, the default
    /// locale is not one of them, or a path does not start with `/`.
    pub fn new(routes: RouteConfig) -> Result<Self, GuardError> {
        if routes.locales().is_empty() {
            return Err(GuardError::Config("at least one locale is required".into()));
        }
        if !routes.locales().iter().any(|l| l == routes.default_locale()) {
            return Err(GuardError::Config(format!(
                "default locale {:?} is not in {:?}",
                routes.default_locale(),
                routes.locales()
            )));
        }
        let paths = std::iter::once(routes.login_path())
            .chain(std::iter::once(routes.landing_path()))
            .chain(routes.protected_segments().iter().map(String::as_str));
        for path in paths {
            if !path.starts_with('/') {
                return Err(GuardError::Config(format!("{path:?} must start with '/'")));
            }
        }
        if routes.refresh_cookie_name().is_empty() {
            return Err(GuardError::Config("refresh cookie name is empty".into()));
        }

        Ok(Self {
            routes: Arc::new(routes),
        })
    }

    #[must_use]
    pub fn routes(&self) -> &RouteConfig {
        &self.routes
    }
}
