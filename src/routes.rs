//! Client route helpers: locale prefixes, protected segments, login redirects.

use crate::config::RouteConfig;

/// Marker appended to the login URL when a session ran out.
pub const SESSION_EXPIRED_REASON: &str = "session_expired";

/// Locale prefix of `path`, if it is one of the configured locales.
#[must_use]
pub fn locale_of<'a>(routes: &'a RouteConfig, path: &str) -> Option<&'a str> {
    routes
        .locales
        .iter()
        .find(|l| {
            path.strip_prefix('/')
                .and_then(|rest| rest.strip_prefix(l.as_str()))
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
        .map(String::as_str)
}

/// `path` without its locale prefix; `/` if nothing remains.
#[must_use]
pub fn strip_locale<'p>(routes: &RouteConfig, path: &'p str) -> &'p str {
    match locale_of(routes, path) {
        Some(locale) => {
            let rest = &path[locale.len() + 1..];
            if rest.is_empty() { "/" } else { rest }
        }
        None => path,
    }
}

/// Protected pages require a live session.
#[must_use]
pub fn is_protected_path(routes: &RouteConfig, path: &str) -> bool {
    let path = strip_locale(routes, path);
    routes.protected_segments.iter().any(|segment| {
        path.strip_prefix(segment.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    })
}

/// Static assets (anything whose last segment has an extension).
#[must_use]
pub fn is_public_file(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|last| last.contains('.'))
}

/// Login URL that returns the user to `path` after signing in.
///
/// Keeps the locale of `path` (default locale otherwise). An empty target
/// after locale stripping falls back to the landing page.
#[must_use]
pub fn login_redirect_url(routes: &RouteConfig, path: &str, reason: Option<&str>) -> String {
    let locale = locale_of(routes, path).unwrap_or(routes.default_locale.as_str());
    let target = match strip_locale(routes, path) {
        "/" => routes.landing_path.as_str(),
        other => other,
    };
    let mut url = format!("/{locale}{}?", routes.login_path);
    if let Some(reason) = reason {
        url.push_str("reason=");
        url.push_str(&urlencoding::encode(reason));
        url.push('&');
    }
    url.push_str("redirect=");
    url.push_str(&urlencoding::encode(target));
    url
}
