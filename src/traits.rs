//! Collaborators the embedding application provides.
//!
//! The session controller talks to the host UI only through these traits, so
//! the same core runs behind a desktop shell, a test harness or a webview.

/// Client-readable "probably logged in" marker.
///
/// Not proof of authentication; it only lets page loads skip a pointless
/// bootstrap refresh for visitors who never signed in.
pub trait SessionHintStore: Send + Sync {
    fn has_hint(&self) -> bool;
    fn set_hint(&self);
    /// Idempotent.
    fn clear_hint(&self);
}

/// Host router.
///
/// # Example
///
/// ```rust,ignore
/// impl Navigator for AppRouter {
///     fn current_path(&self) -> String {
///         self.location.read().clone()
///     }
///     fn push(&self, path: &str) {
///         self.history.push(self.localized(path));
///     }
///     fn assign(&self, url: &str) {
///         self.reload_at(url);
///     }
/// }
/// ```
pub trait Navigator: Send + Sync {
    /// Current location path, including any locale prefix.
    fn current_path(&self) -> String;
    /// Soft navigation to an unlocalized app path.
    fn push(&self, path: &str);
    /// Hard redirect to a fully built URL.
    fn assign(&self, url: &str);
}

/// Cached query state that must not survive a change of identity.
pub trait QueryCache: Send + Sync {
    fn clear(&self);
}

/// For hosts without a query cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopQueryCache;

impl QueryCache for NoopQueryCache {
    fn clear(&self) {}
}

/// Notified by the API client when a refresh could not recover the session.
///
/// Called at most once per failed refresh, after the token is already cleared.
pub trait SessionObserver: Send + Sync {
    fn session_expired(&self);
}
