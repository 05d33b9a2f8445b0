//! Single-flight coordination of token refreshes, with a failure cooldown.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::types::AccessToken;

/// Result shared with every caller waiting on one refresh.
pub(crate) type RefreshOutcome = Result<AccessToken, String>;

/// Why a refresh was started; only used for metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RefreshReason {
    #[display("bootstrap")]
    Bootstrap,
    #[display("response_401")]
    Response401,
}

enum Phase {
    Idle,
    InFlight {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

struct Inner {
    phase: Phase,
    blocked_until: Option<Instant>,
}

/// Guards "is a refresh in progress" and the cooldown window.
///
/// Exactly one caller gets a [`RefreshLease`] and starts the network call;
/// every caller, the leader included, parks on a oneshot and receives the
/// same outcome.
pub(crate) struct RefreshGate {
    inner: Mutex<Inner>,
    cooldown: Duration,
}

pub(crate) enum Ticket {
    /// Caller must start the refresh and complete the lease; `rx` yields its outcome.
    Lead {
        lease: RefreshLease,
        rx: oneshot::Receiver<RefreshOutcome>,
    },
    /// A refresh is already running; await its outcome.
    Wait(oneshot::Receiver<RefreshOutcome>),
    /// A recent failure blocks new attempts for this long.
    CoolingDown(Duration),
}

impl RefreshGate {
    pub(crate) fn new(cooldown: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                blocked_until: None,
            }),
            cooldown,
        })
    }

    /// Remaining cooldown, if one is active.
    pub(crate) fn cooldown_remaining(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        Self::remaining(&inner)
    }

    fn remaining(inner: &Inner) -> Option<Duration> {
        let until = inner.blocked_until?;
        let now = Instant::now();
        (now < until).then(|| until - now)
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        matches!(self.inner.lock().phase, Phase::InFlight { .. })
    }

    pub(crate) fn begin(self: &Arc<Self>) -> Ticket {
        let mut inner = self.inner.lock();
        if let Phase::InFlight { waiters } = &mut inner.phase {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            return Ticket::Wait(rx);
        }
        if let Some(left) = Self::remaining(&inner) {
            return Ticket::CoolingDown(left);
        }
        let (tx, rx) = oneshot::channel();
        inner.blocked_until = None;
        inner.phase = Phase::InFlight { waiters: vec![tx] };
        Ticket::Lead {
            lease: RefreshLease {
                gate: Arc::clone(self),
                done: false,
            },
            rx,
        }
    }

    /// Forget a previous failure, e.g. after a fresh login.
    pub(crate) fn clear_cooldown(&self) {
        self.inner.lock().blocked_until = None;
    }

    fn finish(&self, outcome: RefreshOutcome, cooldown: bool) {
        let waiters = {
            let mut inner = self.inner.lock();
            if cooldown && outcome.is_err() {
                inner.blocked_until = Some(Instant::now() + self.cooldown);
            }
            match std::mem::replace(&mut inner.phase, Phase::Idle) {
                Phase::InFlight { waiters } => waiters,
                Phase::Idle => Vec::new(),
            }
        };
        for waiter in waiters {
            // A dropped receiver just means that caller went away.
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Exclusive right to run the one in-flight refresh.
///
/// Dropping it without calling [`complete`](Self::complete) fails all waiters,
/// so a canceled leader never strands them.
pub(crate) struct RefreshLease {
    gate: Arc<RefreshGate>,
    done: bool,
}

impl RefreshLease {
    pub(crate) fn complete(mut self, outcome: RefreshOutcome) {
        self.done = true;
        self.gate.finish(outcome, true);
    }

    /// Hand waiters `outcome` for a refresh overtaken by a login or logout.
    /// Never starts a cooldown, so a fresh session is not blocked.
    pub(crate) fn complete_stale(mut self, outcome: RefreshOutcome) {
        self.done = true;
        self.gate.finish(outcome, false);
    }
}

impl Drop for RefreshLease {
    fn drop(&mut self) {
        if !self.done {
            self.gate.finish(Err("refresh abandoned".into()), true);
        }
    }
}

/// Await a [`Ticket::Wait`] receiver.
pub(crate) async fn join(rx: oneshot::Receiver<RefreshOutcome>) -> RefreshOutcome {
    rx.await
        .unwrap_or_else(|_| Err("refresh leader went away".into()))
}
