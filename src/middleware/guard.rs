use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;

use super::config::GuardConfig;
use super::error::GuardError;
use crate::config::RouteConfig;
use crate::routes;

/// Outcome of the routing check for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Pass,
    /// Send the browser to this login URL.
    Redirect(String),
}

/// Pure routing decision.
///
/// Only the refresh cookie counts as evidence of a session; it is http-only,
/// so scripts cannot forge it the way they can the hint cookie.
#[must_use]
pub fn decide(routes: &RouteConfig, path: &str, has_refresh_cookie: bool) -> GuardDecision {
    if routes::is_public_file(path) || has_refresh_cookie {
        return GuardDecision::Pass;
    }
    if routes::is_protected_path(routes, path) {
        GuardDecision::Redirect(routes::login_redirect_url(routes, path, None))
    } else {
        GuardDecision::Pass
    }
}

/// Middleware fn for [`axum::middleware::from_fn_with_state`].
///
/// # Errors
///
/// Returns [`GuardError::LoginRequired`] (rendered as a 307 redirect) for a
/// protected page without a refresh cookie.
pub async fn require_session(
    State(guard): State<GuardConfig>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, GuardError> {
    let path = request.uri().path().to_owned();
    let has_refresh = jar.get(guard.routes.refresh_cookie_name()).is_some();

    match decide(&guard.routes, &path, has_refresh) {
        GuardDecision::Pass => Ok(next.run(request).await),
        GuardDecision::Redirect(location) => {
            tracing::debug!(%path, %location, "No refresh cookie, redirecting to login");
            Err(GuardError::LoginRequired { location })
        }
    }
}

/// Wrap every route of `router` with [`require_session`].
pub fn protect<S>(router: Router<S>, guard: GuardConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(axum::middleware::from_fn_with_state(guard, require_session))
}
