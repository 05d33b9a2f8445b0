//! HTTP client for the student API.
//!
//! Owns the in-memory access token and every outbound request. A 401 on a
//! non-auth endpoint triggers at most one refresh platform-wide; all requests
//! that hit the 401 meanwhile share its outcome and are replayed once with the
//! new token.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::cookie::Jar;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue, PRAGMA};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::abort::AbortRegistry;
use crate::config::ClientConfig;
use crate::endpoint::{self, ErrorBody};
use crate::error::{CancelReason, Error};
use crate::gate::{ReadinessGate, Release};
use crate::metrics::ApiMetrics;
use crate::refresh::{self, RefreshGate, RefreshLease, RefreshReason, Ticket};
use crate::throttle::{HealthThrottle, Visibility};
use crate::traits::SessionObserver;
use crate::types::{AccessToken, Envelope, LifecycleStatus, TokenPayload};

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    abort_key: Option<String>,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    no_store: bool,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersede any in-flight request issued under the same key.
    #[must_use]
    pub fn with_abort_key(mut self, key: impl Into<String>) -> Self {
        self.abort_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Bypass HTTP caches and add a cache-busting query parameter.
    #[must_use]
    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }
}

/// Fully buffered API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Decode the whole body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(Into::into)
    }

    /// Decode the `data` member of a `{ "data": ... }` body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the body is not an envelope around `T`.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.json::<Envelope<T>>().map(|e| e.data)
    }

    fn into_result(self) -> Result<Self, Error> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(self.into_status_error())
        }
    }

    fn into_status_error(self) -> Error {
        let message = ErrorBody::parse(&self.body)
            .message()
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("").to_owned());
        Error::HttpStatus {
            status: self.status,
            message,
        }
    }
}

struct Prepared {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    options: RequestOptions,
}

/// The held token plus a counter bumped on every set or clear, so a refresh
/// can tell whether the session changed while it was running.
#[derive(Default)]
struct TokenSlot {
    token: Option<AccessToken>,
    epoch: u64,
}

impl TokenSlot {
    fn set(&mut self, token: AccessToken) {
        self.token = Some(token);
        self.epoch += 1;
    }

    fn clear(&mut self) {
        self.token = None;
        self.epoch += 1;
    }
}

struct Inner {
    http: reqwest::Client,
    jar: Arc<Jar>,
    config: ClientConfig,
    token: RwLock<TokenSlot>,
    refresh: Arc<RefreshGate>,
    aborts: AbortRegistry,
    readiness: ReadinessGate,
    health: HealthThrottle,
    visibility: RwLock<Visibility>,
    metrics: Arc<ApiMetrics>,
    observer: RwLock<Option<Weak<dyn SessionObserver>>>,
}

/// Handle to the shared API client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url.as_str())
            .field("has_token", &self.inner.token.read().token.is_some())
            .field("status", &self.inner.readiness.status())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client with its own cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                jar,
                refresh: RefreshGate::new(config.refresh_cooldown),
                health: HealthThrottle::new(config.health_min_interval),
                metrics: Arc::new(ApiMetrics::new(config.flags.api_debug_metrics)),
                config,
                token: RwLock::new(TokenSlot::default()),
                aborts: AbortRegistry::new(),
                readiness: ReadinessGate::new(),
                visibility: RwLock::new(Visibility::Visible),
                observer: RwLock::new(None),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Jar holding the server-set refresh cookie (and the session hint, if
    /// a [`JarHintStore`](crate::JarHintStore) is used).
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.inner.jar)
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<ApiMetrics> {
        &self.inner.metrics
    }

    /// Register the party to notify when a refresh cannot recover the session.
    pub fn set_session_observer(&self, observer: Weak<dyn SessionObserver>) {
        *self.inner.observer.write() = Some(observer);
    }

    // ── Token ──────────────────────────────────────────────────────────

    /// Keep `token` in memory and attach it to subsequent requests.
    pub fn set_access_token(&self, token: AccessToken) {
        self.inner.token.write().set(token);
        self.inner.refresh.clear_cooldown();
    }

    /// Idempotent.
    pub fn clear_access_token(&self) {
        self.inner.token.write().clear();
    }

    /// Raw token for out-of-band authenticated transfers.
    #[must_use]
    pub fn token(&self) -> Option<AccessToken> {
        self.inner.token.read().token.clone()
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.inner.token.read().token.is_some()
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Record the session lifecycle; leaving `Initializing` releases gated requests.
    pub fn set_auth_lifecycle_status(&self, status: LifecycleStatus) {
        tracing::debug!(%status, "Auth lifecycle status");
        self.inner.readiness.set(status);
    }

    #[must_use]
    pub fn auth_lifecycle_status(&self) -> LifecycleStatus {
        self.inner.readiness.status()
    }

    #[must_use]
    pub fn subscribe_lifecycle(&self) -> watch::Receiver<LifecycleStatus> {
        self.inner.readiness.subscribe()
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        *self.inner.visibility.write() = visibility;
    }

    /// Try to obtain a token at process start.
    ///
    /// Returns `true` if a token is already held or one refresh succeeds.
    pub async fn bootstrap_session(&self) -> bool {
        if self.has_token() {
            return true;
        }
        match self.refresh_token(RefreshReason::Bootstrap).await {
            Ok(_) => true,
            Err(e) => {
                tracing::info!(error = %e, "No session to bootstrap");
                false
            }
        }
    }

    // ── Requests ───────────────────────────────────────────────────────

    /// Cancel the in-flight request tracked under `key`, if any.
    pub fn abort(&self, key: &str) -> bool {
        self.inner.aborts.abort(key)
    }

    /// Issue a request through the token, refresh and cancellation machinery.
    ///
    /// # Errors
    ///
    /// - [`Error::Canceled`] if superseded, aborted or throttled
    /// - [`Error::Network`] on transport failure
    /// - [`Error::HttpStatus`] for any non-success status left after refresh handling
    /// - [`Error::RefreshExhausted`] if a needed refresh failed
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse, Error> {
        self.inner.metrics.track_request(path);

        if self.inner.config.flags.health_polling_v2 && endpoint::is_health(path) {
            let authenticated = self.auth_lifecycle_status() == LifecycleStatus::Authenticated;
            let visibility = *self.inner.visibility.read();
            if let Err(rule) = self.inner.health.check(visibility, authenticated) {
                tracing::debug!(url = path, rule, "Health poll suppressed");
                return Err(Error::Canceled(CancelReason::Suppressed(rule)));
            }
        }

        let tracked = options
            .abort_key
            .as_deref()
            .map(|key| self.inner.aborts.track(key));
        let prepared = Prepared {
            method,
            path: path.to_owned(),
            body,
            options,
        };

        let result = match &tracked {
            Some(tracked) => {
                tokio::select! {
                    biased;
                    reason = tracked.handle().cancelled() => Err(Error::Canceled(reason)),
                    result = self.execute(&prepared) => result,
                }
            }
            None => self.execute(&prepared).await,
        };
        drop(tracked);

        if let Err(Error::Canceled(reason)) = &result {
            tracing::debug!(url = path, %reason, "Request canceled");
        }
        result
    }

    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, Error> {
        self.request(Method::GET, path, None, options).await
    }

    /// # Errors
    ///
    /// See [`request`](Self::request); also [`Error::Json`] if `body` cannot be encoded.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse, Error> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(body), options).await
    }

    /// # Errors
    ///
    /// See [`post`](Self::post).
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse, Error> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, Some(body), options).await
    }

    /// # Errors
    ///
    /// See [`post`](Self::post).
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<ApiResponse, Error> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, path, Some(body), options).await
    }

    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<ApiResponse, Error> {
        self.request(Method::DELETE, path, None, options).await
    }

    /// Fetch a protected binary (e.g. a lesson PDF) with the bearer header,
    /// never with the token in the URL.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get_bytes(&self, path: &str, options: RequestOptions) -> Result<Bytes, Error> {
        self.get(path, options).await.map(ApiResponse::into_bytes)
    }

    async fn execute(&self, req: &Prepared) -> Result<ApiResponse, Error> {
        if self.inner.config.flags.auth_readiness_guard && endpoint::is_auth_protected(&req.path) {
            if let Release::TimedOut = self.inner.readiness.wait(self.inner.config.ready_timeout).await
            {
                tracing::warn!(url = %req.path, "Auth readiness wait timed out, sending anyway");
            }
        }

        let sent_token = self.token();
        let response = self.send(req, sent_token.as_ref()).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return response.into_result();
        }

        tracing::warn!(
            url = %req.path,
            refreshing = self.inner.refresh.is_in_flight(),
            "401 received"
        );
        let Some(token) = self.recover(req, sent_token.as_ref(), &response.body).await? else {
            return Err(response.into_status_error());
        };

        // Replayed once; a second 401 is returned as is.
        self.send(req, Some(&token)).await?.into_result()
    }

    /// Decide whether a 401 is recoverable and return the token to replay with.
    async fn recover(
        &self,
        req: &Prepared,
        sent_token: Option<&AccessToken>,
        body: &[u8],
    ) -> Result<Option<AccessToken>, Error> {
        if endpoint::is_auth_bypass(&req.path) {
            return Ok(None);
        }
        if let Some(current) = self.token() {
            if sent_token != Some(&current) {
                tracing::debug!(url = %req.path, "Token changed while in flight, replaying");
                return Ok(Some(current));
            }
        }
        if let Some(left) = self.inner.refresh.cooldown_remaining() {
            tracing::warn!(url = %req.path, remaining_ms = left.as_millis() as u64, "Refresh cooling down, skipping");
            return Ok(None);
        }
        if sent_token.is_none() && !endpoint::looks_expired(body) {
            tracing::debug!(url = %req.path, "Unauthenticated 401, not refreshing");
            return Ok(None);
        }
        self.refresh_token(RefreshReason::Response401).await.map(Some)
    }

    async fn send(&self, req: &Prepared, token: Option<&AccessToken>) -> Result<ApiResponse, Error> {
        let url = self.inner.config.endpoint(&req.path)?;
        let mut builder = self
            .inner
            .http
            .request(req.method.clone(), url)
            .headers(req.options.headers.clone());

        if !req.options.query.is_empty() {
            builder = builder.query(&req.options.query);
        }
        if req.options.no_store {
            let stamp = (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).to_string();
            builder = builder
                .header(CACHE_CONTROL, "no-store, no-cache, max-age=0")
                .header(PRAGMA, "no-cache")
                .query(&[("_ts", stamp)]);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token.as_str());
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        self.inner.metrics.track_status(status.as_u16());
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        tracing::debug!(
            method = %req.method,
            url = %req.path,
            status = status.as_u16(),
            auth = token.is_some(),
            "API response"
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    // ── Refresh ────────────────────────────────────────────────────────

    /// Join the in-flight refresh or start one.
    ///
    /// The network call runs on its own task so that canceling one caller
    /// never abandons the refresh the others are waiting on.
    async fn refresh_token(&self, reason: RefreshReason) -> Result<AccessToken, Error> {
        let epoch = self.inner.token.read().epoch;
        let rx = match self.inner.refresh.begin() {
            Ticket::Lead { lease, rx } => {
                tracing::info!(%reason, "Attempting token refresh");
                tokio::spawn(run_refresh(Arc::clone(&self.inner), lease, epoch, reason));
                rx
            }
            Ticket::Wait(rx) => {
                tracing::info!(%reason, "Refresh in progress, waiting");
                rx
            }
            Ticket::CoolingDown(left) => {
                return Err(Error::RefreshExhausted(format!(
                    "refresh blocked for another {}ms",
                    left.as_millis()
                )));
            }
        };
        refresh::join(rx).await.map_err(Error::RefreshExhausted)
    }
}

/// Run one refresh and publish its outcome.
///
/// `epoch` is the token epoch seen when the refresh began. If a login or
/// logout has moved it since, the result is stale: the held token stays as
/// it is, no observer is told, and waiters replay with whatever token is now
/// held (or fail if there is none).
async fn run_refresh(inner: Arc<Inner>, lease: RefreshLease, epoch: u64, reason: RefreshReason) {
    inner.metrics.track_refresh_attempt(reason);
    let result = inner.call_refresh().await;
    if result.is_err() {
        inner.metrics.track_refresh_failure();
    }

    let mut slot = inner.token.write();
    if slot.epoch != epoch {
        let current = slot.token.clone();
        drop(slot);
        tracing::info!(%reason, ok = result.is_ok(), "Session changed during refresh, discarding result");
        lease.complete_stale(current.ok_or_else(|| "session changed during refresh".to_owned()));
        return;
    }

    match result {
        Ok(token) => {
            slot.set(token.clone());
            drop(slot);
            tracing::info!("Token refresh successful");
            lease.complete(Ok(token));
        }
        Err(e) => {
            slot.clear();
            drop(slot);
            tracing::error!(error = %e, %reason, "Token refresh failed");
            if reason == RefreshReason::Response401 {
                inner.notify_expired();
            }
            lease.complete(Err(e.to_string()));
        }
    }
}

impl Inner {
    /// `POST /auth/refresh` relying on the refresh cookie alone.
    async fn call_refresh(&self) -> Result<AccessToken, Error> {
        let url = self.config.endpoint(endpoint::REFRESH_PATH)?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let status = response.status();
        self.metrics.track_status(status.as_u16());
        let body = response.bytes().await?;

        let response = ApiResponse {
            status,
            headers: HeaderMap::new(),
            body,
        }
        .into_result()?;

        response
            .data::<TokenPayload>()?
            .access_token
            .ok_or(Error::MissingToken)
    }

    fn notify_expired(&self) {
        let observer = self.observer.read().as_ref().and_then(Weak::upgrade);
        match observer {
            Some(observer) => observer.session_expired(),
            None => tracing::debug!("No session observer registered"),
        }
    }
}
