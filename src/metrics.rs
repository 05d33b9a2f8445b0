//! Rolling request counters for diagnosing refresh storms and noisy polling.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::endpoint;
use crate::refresh::RefreshReason;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsWindow {
    pub started_at: Instant,
    pub total_requests: u64,
    pub health_requests: u64,
    pub unauthorized_responses: u64,
    pub refresh_attempts: u64,
    pub refresh_failures: u64,
    pub refresh_bootstrap: u64,
    pub refresh_response_401: u64,
}

impl MetricsWindow {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: 0,
            health_requests: 0,
            unauthorized_responses: 0,
            refresh_attempts: 0,
            refresh_failures: 0,
            refresh_bootstrap: 0,
            refresh_response_401: 0,
        }
    }
}

/// Request metrics, a no-op unless enabled.
pub struct ApiMetrics {
    enabled: bool,
    window: Mutex<MetricsWindow>,
}

impl ApiMetrics {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            window: Mutex::new(MetricsWindow::new()),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn record(&self, f: impl FnOnce(&mut MetricsWindow)) {
        if self.enabled {
            f(&mut self.window.lock());
        }
    }

    pub fn track_request(&self, url: &str) {
        let health = endpoint::is_health(url);
        self.record(|w| {
            w.total_requests += 1;
            if health {
                w.health_requests += 1;
            }
        });
    }

    pub fn track_status(&self, status: u16) {
        if status == 401 {
            self.record(|w| w.unauthorized_responses += 1);
        }
    }

    pub fn track_refresh_attempt(&self, reason: RefreshReason) {
        self.record(|w| {
            w.refresh_attempts += 1;
            match reason {
                RefreshReason::Bootstrap => w.refresh_bootstrap += 1,
                RefreshReason::Response401 => w.refresh_response_401 += 1,
            }
        });
    }

    pub fn track_refresh_failure(&self) {
        self.record(|w| w.refresh_failures += 1);
    }

    /// Copy of the current window.
    #[must_use]
    pub fn snapshot(&self) -> MetricsWindow {
        *self.window.lock()
    }

    /// Log the current window and start a new one. Returns the closed window.
    pub fn flush(&self) -> Option<MetricsWindow> {
        if !self.enabled {
            return None;
        }
        let closed = std::mem::replace(&mut *self.window.lock(), MetricsWindow::new());

        let elapsed = closed.started_at.elapsed().max(Duration::from_millis(1));
        let minutes = elapsed.as_secs_f64() / 60.0;
        let health_per_minute = closed.health_requests as f64 / minutes;
        let unauthorized_per_thousand = if closed.total_requests > 0 {
            closed.unauthorized_responses as f64 / closed.total_requests as f64 * 1000.0
        } else {
            0.0
        };

        tracing::info!(
            window_secs = elapsed.as_secs(),
            requests = closed.total_requests,
            health_requests = closed.health_requests,
            health_per_minute = round2(health_per_minute),
            unauthorized = closed.unauthorized_responses,
            unauthorized_per_thousand = round2(unauthorized_per_thousand),
            refresh_attempts = closed.refresh_attempts,
            refresh_failures = closed.refresh_failures,
            refresh_bootstrap = closed.refresh_bootstrap,
            refresh_response_401 = closed.refresh_response_401,
            "API metrics window"
        );
        Some(closed)
    }

    /// Flush once a minute on the current runtime. `None` when disabled.
    pub fn spawn_reporter(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }
        let metrics = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WINDOW);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                metrics.flush();
            }
        }))
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
