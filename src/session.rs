//! Session lifecycle controller: owns the signed-in user and the
//! `initializing → authenticated | guest` state machine.

use std::sync::{Arc, Weak};

use tokio::sync::watch;

use crate::auth::RegisterRequest;
use crate::client::{ApiClient, RequestOptions};
use crate::endpoint;
use crate::error::Error;
use crate::rbac::RolePolicy;
use crate::routes::{self, SESSION_EXPIRED_REASON};
use crate::traits::{Navigator, QueryCache, SessionHintStore, SessionObserver};
use crate::types::{AccessToken, LifecycleStatus, User};

const VERIFY_EMAIL_ROUTE: &str = "/verify-email";

/// Observable session state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: LifecycleStatus,
    pub user: Option<User>,
    /// `true` until the first status is settled, and while hydrating.
    pub is_loading: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: LifecycleStatus::Initializing,
            user: None,
            is_loading: true,
        }
    }
}

impl SessionSnapshot {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }
}

pub struct SessionController {
    client: ApiClient,
    hints: Arc<dyn SessionHintStore>,
    navigator: Arc<dyn Navigator>,
    cache: Arc<dyn QueryCache>,
    policy: RolePolicy,
    state: watch::Sender<SessionSnapshot>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("client", &self.client)
            .field("policy", &self.policy)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create the controller and register it with `client` for refresh
    /// exhaustion notices.
    pub fn new(
        client: ApiClient,
        hints: Arc<dyn SessionHintStore>,
        navigator: Arc<dyn Navigator>,
        cache: Arc<dyn QueryCache>,
        policy: RolePolicy,
    ) -> Arc<Self> {
        client.set_auth_lifecycle_status(LifecycleStatus::Initializing);
        let controller = Arc::new(Self {
            client,
            hints,
            navigator,
            cache,
            policy,
            state: watch::Sender::new(SessionSnapshot::default()),
        });
        let weak: Weak<Self> = Arc::downgrade(&controller);
        let observer: Weak<dyn SessionObserver> = weak;
        controller.client.set_session_observer(observer);
        controller
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> LifecycleStatus {
        self.state.borrow().status
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.borrow().is_ready()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Raw token for out-of-band authenticated transfers.
    #[must_use]
    pub fn get_token(&self) -> Option<AccessToken> {
        self.client.token()
    }

    /// Settle the initial lifecycle state. Call once at startup.
    ///
    /// Without a session hint no network call is made at all.
    pub async fn initialize(&self) {
        self.apply(LifecycleStatus::Initializing, None);

        if !self.hints.has_hint() {
            tracing::debug!("No session hint, starting as guest");
            self.apply(LifecycleStatus::Guest, None);
            return;
        }

        if !self.client.bootstrap_session().await {
            self.hints.clear_hint();
            self.apply(LifecycleStatus::Guest, None);
            return;
        }

        self.hydrate_user().await;
    }

    /// Load the current user. Any failure, including a rejected role,
    /// leaves the session as guest.
    pub async fn hydrate_user(&self) -> bool {
        self.state.send_modify(|s| s.is_loading = true);

        let options = if self.client.config().flags().auth_nostore {
            RequestOptions::new().no_store()
        } else {
            RequestOptions::new()
        };
        let fetched = self
            .client
            .get(endpoint::ME_PATH, options)
            .await
            .and_then(|response| response.data::<User>());

        let hydrated = match fetched {
            Ok(user) if self.policy.allows(&user.role) => {
                let user = user.normalized();
                tracing::info!(user_id = %user.id, "Session authenticated");
                self.apply(LifecycleStatus::Authenticated, Some(user));
                true
            }
            Ok(user) => {
                let err = Error::RoleRejected(user.role.to_string());
                tracing::warn!(error = %err, "Access denied for role");
                self.end_session();
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "Auth check failed, switching to guest");
                self.end_session();
                false
            }
        };

        self.state.send_modify(|s| s.is_loading = false);
        hydrated
    }

    /// Install `token`, load the user and navigate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hydration`] if the user could not be loaded with the
    /// new token; the session is left as guest.
    pub async fn login(&self, token: AccessToken, redirect: Option<&str>) -> Result<(), Error> {
        self.client.set_access_token(token);
        self.apply(LifecycleStatus::Initializing, None);
        self.hints.set_hint();

        if !self.hydrate_user().await {
            return Err(Error::Hydration);
        }

        self.cache.clear();
        let target = redirect.unwrap_or(self.client.config().routes().landing_path());
        self.navigator.push(target);
        Ok(())
    }

    /// Exchange credentials for a token, then [`login`](Self::login).
    ///
    /// # Errors
    ///
    /// Propagates sign-in failures and [`Error::Hydration`].
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        redirect: Option<&str>,
    ) -> Result<(), Error> {
        let token = self.client.sign_in(email, password).await?;
        self.login(token, redirect).await
    }

    /// Create the account, sign in and land on email verification.
    ///
    /// # Errors
    ///
    /// Propagates registration and sign-in failures, and [`Error::Hydration`].
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), Error> {
        self.client.register(request).await?;
        let token = self
            .client
            .sign_in(&request.email, &request.password)
            .await?;
        self.login(token, Some(VERIFY_EMAIL_ROUTE)).await
    }

    /// End the session locally whether or not the server call succeeds.
    pub async fn logout(&self) {
        if let Err(e) = self
            .client
            .post(endpoint::LOGOUT_PATH, &serde_json::json!({}), RequestOptions::new())
            .await
        {
            tracing::error!(error = %e, "Logout request failed");
        }

        self.end_session();
        self.cache.clear();
        self.navigator.push(self.client.config().routes().login_path());
        tracing::info!("Logged out");
    }

    fn end_session(&self) {
        self.client.clear_access_token();
        self.hints.clear_hint();
        self.apply(LifecycleStatus::Guest, None);
    }

    /// Publish `status` to observers and the client's readiness gate.
    fn apply(&self, status: LifecycleStatus, user: Option<User>) {
        self.state.send_modify(|s| {
            s.status = status;
            s.user = user;
            s.is_loading = status == LifecycleStatus::Initializing;
        });
        self.client.set_auth_lifecycle_status(status);
    }
}

impl SessionObserver for SessionController {
    fn session_expired(&self) {
        tracing::info!("Session expired, switching to guest");
        self.end_session();

        let path = self.navigator.current_path();
        let routes = self.client.config().routes();
        if routes::is_protected_path(routes, &path) {
            let url = routes::login_redirect_url(routes, &path, Some(SESSION_EXPIRED_REASON));
            self.navigator.assign(&url);
        }
    }
}
