//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use student_portal_auth::{
    ApiClient, ClientConfig, LifecycleStatus, MemoryHintStore, Navigator, QueryCache, RolePolicy,
    SessionController,
};
use wiremock::MockServer;

/// Navigator that records every navigation.
#[derive(Default)]
pub struct RecordingNavigator {
    pub path: Mutex<String>,
    pub pushed: Mutex<Vec<String>>,
    pub assigned: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn at(path: &str) -> Arc<Self> {
        let nav = Self::default();
        *nav.path.lock() = path.to_owned();
        Arc::new(nav)
    }

    pub fn pushed(&self) -> Vec<String> {
        self.pushed.lock().clone()
    }

    pub fn assigned(&self) -> Vec<String> {
        self.assigned.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.path.lock().clone()
    }

    fn push(&self, path: &str) {
        *self.path.lock() = path.to_owned();
        self.pushed.lock().push(path.to_owned());
    }

    fn assign(&self, url: &str) {
        self.assigned.lock().push(url.to_owned());
    }
}

/// Query cache that counts invalidations.
#[derive(Default)]
pub struct CountingCache {
    clears: AtomicUsize,
}

impl CountingCache {
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl QueryCache for CountingCache {
    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub session: Arc<SessionController>,
    pub client: ApiClient,
    pub navigator: Arc<RecordingNavigator>,
    pub cache: Arc<CountingCache>,
    pub hints: Arc<MemoryHintStore>,
}

pub fn config(server: &MockServer) -> ClientConfig {
    let base = server.uri().parse().unwrap();
    ClientConfig::new(base)
        .with_request_timeout(Duration::from_secs(5))
        .with_refresh_cooldown(Duration::from_secs(30))
        .with_ready_timeout(Duration::from_secs(5))
}

/// Client whose lifecycle has already settled, so nothing is gated.
pub fn ready_client(server: &MockServer) -> ApiClient {
    let client = ApiClient::new(config(server)).unwrap();
    client.set_auth_lifecycle_status(LifecycleStatus::Authenticated);
    client
}

pub fn harness(server: &MockServer, hint: bool) -> Harness {
    let client = ApiClient::new(config(server)).unwrap();
    let navigator = RecordingNavigator::at("/en");
    let cache = Arc::new(CountingCache::default());
    let hints = Arc::new(MemoryHintStore::new(hint));
    let session = SessionController::new(
        client.clone(),
        hints.clone(),
        navigator.clone(),
        cache.clone(),
        RolePolicy::default(),
    );
    Harness {
        session,
        client,
        navigator,
        cache,
        hints,
    }
}

pub fn token_body(token: &str) -> Value {
    json!({ "data": { "accessToken": token } })
}

pub fn me_body(role: &str) -> Value {
    json!({
        "data": {
            "id": "u-1",
            "email": "lina@example.com",
            "firstName": "Lina",
            "lastName": "Haddad",
            "role": role,
            "emailVerifiedAt": "2026-01-05T10:00:00Z"
        }
    })
}

pub fn expired_body() -> Value {
    json!({ "statusCode": 401, "message": "jwt expired" })
}

pub fn unauthorized_body() -> Value {
    json!({ "statusCode": 401, "message": "Unauthorized" })
}
