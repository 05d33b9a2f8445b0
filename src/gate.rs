use std::time::Duration;

use tokio::sync::watch;

use crate::types::LifecycleStatus;

/// Holds auth-protected requests while the session is still bootstrapping.
///
/// Best effort: once `timeout` elapses the request is released anyway.
pub(crate) struct ReadinessGate {
    status: watch::Sender<LifecycleStatus>,
}

/// How a gated request was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    Open,
    Settled(LifecycleStatus),
    TimedOut,
}

impl ReadinessGate {
    pub(crate) fn new() -> Self {
        let (status, _) = watch::channel(LifecycleStatus::Initializing);
        Self { status }
    }

    pub(crate) fn status(&self) -> LifecycleStatus {
        *self.status.borrow()
    }

    /// Record the lifecycle status; leaving `Initializing` releases waiters.
    pub(crate) fn set(&self, next: LifecycleStatus) {
        self.status.send_replace(next);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LifecycleStatus> {
        self.status.subscribe()
    }

    pub(crate) async fn wait(&self, timeout: Duration) -> Release {
        if self.status().is_ready() {
            return Release::Open;
        }
        let mut rx = self.status.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|s| s.is_ready())).await {
            Ok(Ok(status)) => Release::Settled(*status),
            // The sender lives as long as the gate, so this arm is only reachable on timeout.
            Ok(Err(_)) | Err(_) => Release::TimedOut,
        }
    }
}
