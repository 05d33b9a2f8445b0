use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Whether the host surface is currently visible to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Backpressure for the health poll.
///
/// Suppresses the call while hidden, within `min_interval` of the previous
/// sent call, or when unauthenticated after the first call.
pub(crate) struct HealthThrottle {
    min_interval: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl HealthThrottle {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: Mutex::new(None),
        }
    }

    /// `Ok(())` records a send; `Err` names the suppression rule.
    pub(crate) fn check(
        &self,
        visibility: Visibility,
        authenticated: bool,
    ) -> Result<(), &'static str> {
        if visibility == Visibility::Hidden {
            return Err("tab hidden");
        }
        let mut last = self.last_sent.lock();
        if let Some(at) = *last {
            if at.elapsed() < self.min_interval {
                return Err("polled too recently");
            }
            if !authenticated {
                return Err("not authenticated");
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }
}
