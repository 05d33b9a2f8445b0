use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cookie::{Cookie, SameSite};
use reqwest::cookie::{CookieStore, Jar};
use time::Duration;
use url::Url;

use crate::traits::SessionHintStore;

const HINT_TTL_DAYS: i64 = 7;

/// `isLoggedIn=true; Path=/; Max-Age=604800; SameSite=Lax`
pub(crate) fn hint_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), "true"))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(Duration::days(HINT_TTL_DAYS))
        .build()
}

/// Removal cookie for the hint.
pub(crate) fn clear_hint_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Hint kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryHintStore {
    present: AtomicBool,
}

impl MemoryHintStore {
    #[must_use]
    pub fn new(present: bool) -> Self {
        Self {
            present: AtomicBool::new(present),
        }
    }
}

impl SessionHintStore for MemoryHintStore {
    fn has_hint(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    fn set_hint(&self) {
        self.present.store(true, Ordering::SeqCst);
    }

    fn clear_hint(&self) {
        self.present.store(false, Ordering::SeqCst);
    }
}

/// Hint stored as a real cookie in the HTTP client's jar.
///
/// The cookie is scoped to the API origin and travels with every request,
/// next to the server-set refresh cookie.
pub struct JarHintStore {
    jar: Arc<Jar>,
    origin: Url,
    name: String,
}

impl JarHintStore {
    #[must_use]
    pub fn new(jar: Arc<Jar>, origin: Url, name: impl Into<String>) -> Self {
        Self {
            jar,
            origin,
            name: name.into(),
        }
    }
}

impl SessionHintStore for JarHintStore {
    fn has_hint(&self) -> bool {
        let Some(header) = self.jar.cookies(&self.origin) else {
            return false;
        };
        let Ok(header) = header.to_str() else {
            return false;
        };
        Cookie::split_parse(header)
            .filter_map(Result::ok)
            .any(|c| c.name() == self.name && c.value() == "true")
    }

    fn set_hint(&self) {
        self.jar
            .add_cookie_str(&hint_cookie(&self.name).to_string(), &self.origin);
    }

    fn clear_hint(&self) {
        self.jar
            .add_cookie_str(&clear_hint_cookie(&self.name).to_string(), &self.origin);
    }
}
