use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Runtime toggles for the optional request policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Throttle the `/health` poll.
    pub health_polling_v2: bool,
    /// Hold auth-protected requests while the session bootstraps.
    pub auth_readiness_guard: bool,
    /// Send `/auth/me` with no-store headers and a cache-busting query.
    pub auth_nostore: bool,
    /// Collect the rolling request metrics window.
    pub api_debug_metrics: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            health_polling_v2: true,
            auth_readiness_guard: true,
            auth_nostore: true,
            api_debug_metrics: false,
        }
    }
}

impl FeatureFlags {
    /// Read `FEATURE_*` variables, keeping defaults for unset ones.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            health_polling_v2: env_flag("FEATURE_HEALTH_POLLING_V2", defaults.health_polling_v2),
            auth_readiness_guard: env_flag(
                "FEATURE_AUTH_READINESS_GUARD",
                defaults.auth_readiness_guard,
            ),
            auth_nostore: env_flag("FEATURE_AUTH_NOSTORE", defaults.auth_nostore),
            api_debug_metrics: env_flag("FEATURE_API_DEBUG_METRICS", defaults.api_debug_metrics),
        }
    }
}

/// `"true"` and `"1"` are true, any other value is false, unset is `fallback`.
#[must_use]
pub fn parse_flag(value: Option<&str>, fallback: bool) -> bool {
    match value {
        None => fallback,
        Some(v) => v == "true" || v == "1",
    }
}

fn env_flag(name: &str, fallback: bool) -> bool {
    parse_flag(std::env::var(name).ok().as_deref(), fallback)
}

/// Client-side route layout shared by the session controller and the routing guard.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct RouteConfig {
    pub(crate) protected_segments: Vec<String>,
    pub(crate) locales: Vec<String>,
    pub(crate) default_locale: String,
    pub(crate) login_path: String,
    pub(crate) landing_path: String,
    pub(crate) refresh_cookie_name: String,
    pub(crate) hint_cookie_name: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            protected_segments: ["/dashboard", "/profile", "/learn", "/enroll", "/verify-email"]
                .into_iter()
                .map(String::from)
                .collect(),
            locales: vec!["en".into(), "ar".into()],
            default_locale: "en".into(),
            login_path: "/login".into(),
            landing_path: "/dashboard".into(),
            refresh_cookie_name: "refreshToken".into(),
            hint_cookie_name: "isLoggedIn".into(),
        }
    }
}

impl RouteConfig {
    #[must_use]
    pub fn with_protected_segments(mut self, segments: Vec<String>) -> Self {
        self.protected_segments = segments;
        self
    }

    /// The first entry is not implied to be the default; see [`with_default_locale`](Self::with_default_locale).
    #[must_use]
    pub fn with_locales(mut self, locales: Vec<String>) -> Self {
        self.locales = locales;
        self
    }

    #[must_use]
    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_landing_path(mut self, path: impl Into<String>) -> Self {
        self.landing_path = path.into();
        self
    }

    #[must_use]
    pub fn with_refresh_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.refresh_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_hint_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.hint_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn protected_segments(&self) -> &[String] {
        &self.protected_segments
    }

    #[must_use]
    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    #[must_use]
    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    #[must_use]
    pub fn refresh_cookie_name(&self) -> &str {
        &self.refresh_cookie_name
    }

    #[must_use]
    pub fn hint_cookie_name(&self) -> &str {
        &self.hint_cookie_name
    }
}

/// API client configuration.
///
/// The base URL is the only required field. Override the rest with `with_*`.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) base_url: Url,
    pub(crate) request_timeout: Duration,
    pub(crate) refresh_cooldown: Duration,
    pub(crate) ready_timeout: Duration,
    pub(crate) health_min_interval: Duration,
    pub(crate) flags: FeatureFlags,
    pub(crate) routes: RouteConfig,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: Duration::from_secs(30),
            refresh_cooldown: Duration::from_secs(30),
            ready_timeout: Duration::from_millis(5_000),
            health_min_interval: Duration::from_secs(30),
            flags: FeatureFlags::default(),
            routes: RouteConfig::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `STUDENT_API_BASE_URL`: API base URL
    ///
    /// # Optional env vars
    /// - `STUDENT_API_TIMEOUT_SECS`: per-request timeout (default 30)
    /// - `STUDENT_REFRESH_COOLDOWN_SECS`: pause after a failed refresh (default 30)
    /// - `STUDENT_AUTH_READY_TIMEOUT_MS`: readiness gate bound (default 5000)
    /// - `STUDENT_HEALTH_MIN_INTERVAL_SECS`: health poll window (default 30)
    /// - `FEATURE_*`: see [`FeatureFlags::from_env`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is missing or a value does not parse.
    pub fn from_env() -> Result<Self, Error> {
        let base = std::env::var("STUDENT_API_BASE_URL")
            .map_err(|_| Error::Config("STUDENT_API_BASE_URL is required".into()))?;
        let base_url: Url = base
            .parse()
            .map_err(|e| Error::Config(format!("STUDENT_API_BASE_URL: {e}")))?;

        let mut config = Self::new(base_url).with_flags(FeatureFlags::from_env());

        if let Some(secs) = env_u64("STUDENT_API_TIMEOUT_SECS")? {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = env_u64("STUDENT_REFRESH_COOLDOWN_SECS")? {
            config = config.with_refresh_cooldown(Duration::from_secs(secs));
        }
        if let Some(ms) = env_u64("STUDENT_AUTH_READY_TIMEOUT_MS")? {
            config = config.with_ready_timeout(Duration::from_millis(ms));
        }
        if let Some(secs) = env_u64("STUDENT_HEALTH_MIN_INTERVAL_SECS")? {
            config = config.with_health_min_interval(Duration::from_secs(secs));
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_health_min_interval(mut self, interval: Duration) -> Self {
        self.health_min_interval = interval;
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: FeatureFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_routes(mut self, routes: RouteConfig) -> Self {
        self.routes = routes;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    #[must_use]
    pub fn routes(&self) -> &RouteConfig {
        &self.routes
    }

    #[must_use]
    pub fn refresh_cooldown(&self) -> Duration {
        self.refresh_cooldown
    }

    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout
    }

    /// Join an API path onto the base URL, keeping any base path prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the result is not a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
            .parse()
            .map_err(|e| Error::Config(format!("invalid endpoint {path:?}: {e}")))
    }
}

fn env_u64(name: &str) -> Result<Option<u64>, Error> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}
