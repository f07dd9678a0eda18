//! Heartbeat bookkeeping: busy guard, failure counter and restart budget

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub type HealthFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// One heartbeat check against the child's pid; `true` means healthy
pub type HealthCheck = Arc<dyn Fn(u32) -> HealthFuture + Send + Sync>;

/// Default check: the process is still running
pub fn liveness_check() -> HealthCheck {
    Arc::new(|pid: u32| -> HealthFuture { Box::pin(async move { super::process::is_alive(pid) }) })
}

/// Keeps heartbeat checks from overlapping. A tick that finds a check still in
/// progress is skipped instead of queued.
#[derive(Clone, Default)]
pub struct HeartbeatGuard {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of one check; releases the guard on drop
pub struct HeartbeatTicket {
    busy: Arc<AtomicBool>,
}

impl HeartbeatGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` if a check is already running
    pub fn try_enter(&self) -> Option<HeartbeatTicket> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| HeartbeatTicket {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for HeartbeatTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// What a single heartbeat result means for the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    /// Below the threshold; keep running
    Failing { consecutive: u32 },
    /// This failure crossed the threshold; recover now
    ThresholdReached,
    /// Still failing while a recovery is already under way
    Recovering,
}

/// Consecutive-failure counter. Recovery is signalled once per threshold crossing.
#[derive(Debug)]
pub struct HealthTracker {
    max_failed_checks: u32,
    consecutive: u32,
    recovering: bool,
}

impl HealthTracker {
    pub fn new(max_failed_checks: u32) -> Self {
        HealthTracker {
            max_failed_checks: max_failed_checks.max(1),
            consecutive: 0,
            recovering: false,
        }
    }

    pub fn record(&mut self, healthy: bool) -> HealthVerdict {
        if healthy {
            self.consecutive = 0;
            return HealthVerdict::Healthy;
        }
        if self.recovering {
            return HealthVerdict::Recovering;
        }

        self.consecutive += 1;
        if self.consecutive >= self.max_failed_checks {
            self.recovering = true;
            HealthVerdict::ThresholdReached
        } else {
            HealthVerdict::Failing {
                consecutive: self.consecutive,
            }
        }
    }

    /// The recovery action finished; count from zero again
    pub fn recovery_finished(&mut self) {
        self.consecutive = 0;
        self.recovering = false;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }
}

/// Upper bound on restarts over the wrapper's lifetime
#[derive(Debug)]
pub struct RestartBudget {
    max: u32,
    used: u32,
}

impl RestartBudget {
    pub fn new(max: u32) -> Self {
        RestartBudget { max, used: 0 }
    }

    /// Take one restart if any remain
    pub fn try_consume(&mut self) -> bool {
        if self.used < self.max {
            self.used += 1;
            true
        } else {
            false
        }
    }

    pub fn used(&self) -> u32 {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_running_below_threshold() {
        let mut tracker = HealthTracker::new(3);
        assert_eq!(tracker.record(false), HealthVerdict::Failing { consecutive: 1 });
        assert_eq!(tracker.record(false), HealthVerdict::Failing { consecutive: 2 });
        assert_eq!(tracker.record(true), HealthVerdict::Healthy);
        assert_eq!(tracker.consecutive_failures(), 0);
        assert_eq!(tracker.record(false), HealthVerdict::Failing { consecutive: 1 });
    }

    #[test]
    fn threshold_fires_once_until_recovery_finishes() {
        let mut tracker = HealthTracker::new(2);
        tracker.record(false);
        assert_eq!(tracker.record(false), HealthVerdict::ThresholdReached);
        assert_eq!(tracker.record(false), HealthVerdict::Recovering);
        assert_eq!(tracker.record(false), HealthVerdict::Recovering);

        tracker.recovery_finished();
        assert_eq!(tracker.record(false), HealthVerdict::Failing { consecutive: 1 });
        assert_eq!(tracker.record(false), HealthVerdict::ThresholdReached);
    }

    #[test]
    fn budget_is_exhausted_after_max() {
        let mut budget = RestartBudget::new(2);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.used(), 2);
        assert!(!RestartBudget::new(0).try_consume());
    }

    #[test]
    fn guard_skips_while_busy() {
        let guard = HeartbeatGuard::new();
        let ticket = guard.try_enter().unwrap();
        assert!(guard.is_busy());
        assert!(guard.clone().try_enter().is_none());
        drop(ticket);
        assert!(!guard.is_busy());
        assert!(guard.try_enter().is_some());
    }
}
