//! Blocking-call adapter.
//!
//! A blocking MPI call must not run while the serialization lock is held:
//! the thread that could complete the wait may need the lock first. The
//! wrapper instead polls the non-blocking counterpart until it reports
//! readiness. Between misses the poller backs off in three tiers:
//!
//! | misses   | pause                          |
//! |----------|--------------------------------|
//! | 1..=10   | spin hint                      |
//! | 11..=100 | `thread::yield_now`            |
//! | > 100    | sleep [`SLEEP_INTERVAL`]       |
//!
//! There is no deadline; only readiness (or a probe error, which the probe
//! reports as ready) ends the loop.

use std::task::Poll;
use std::time::Duration;

/// Last miss count served by spinning.
pub const SPIN_LIMIT: u64 = 10;
/// Last miss count served by yielding.
pub const YIELD_LIMIT: u64 = 100;
/// Pause once past [`YIELD_LIMIT`].
pub const SLEEP_INTERVAL: Duration = Duration::from_micros(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackoffTier {
    Spin,
    Yield,
    Sleep,
}

impl BackoffTier {
    /// Tier for the `misses`-th consecutive unsuccessful probe (1-based).
    #[must_use]
    pub const fn for_misses(misses: u64) -> Self {
        if misses <= SPIN_LIMIT {
            Self::Spin
        } else if misses <= YIELD_LIMIT {
            Self::Yield
        } else {
            Self::Sleep
        }
    }

    pub fn pause(self) {
        match self {
            Self::Spin => std::hint::spin_loop(),
            Self::Yield => std::thread::yield_now(),
            Self::Sleep => std::thread::sleep(SLEEP_INTERVAL),
        }
    }
}

/// Where a poll loop stands after observing one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Not ready yet; pause in this tier before probing again.
    Polling(BackoffTier),
    /// The event happened.
    Ready,
}

/// Back-off state of one poll loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    misses: u64,
    ready: bool,
}

impl Backoff {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            misses: 0,
            ready: false,
        }
    }

    /// Feed one probe result.
    pub fn observe(&mut self, ready: bool) -> PollState {
        if ready || self.ready {
            self.ready = true;
            return PollState::Ready;
        }
        self.misses += 1;
        PollState::Polling(BackoffTier::for_misses(self.misses))
    }

    #[must_use]
    pub const fn misses(&self) -> u64 {
        self.misses
    }
}

/// Result of a completed poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome<T> {
    pub value: T,
    /// Probes issued, including the successful one.
    pub probes: u64,
}

/// Probe until ready, backing off with real pauses.
pub fn poll_until_ready<T>(probe: impl FnMut() -> Poll<T>) -> PollOutcome<T> {
    poll_with_pause(probe, BackoffTier::pause)
}

/// Probe until ready, handing every pause decision to `pause`.
pub fn poll_with_pause<T>(
    mut probe: impl FnMut() -> Poll<T>,
    mut pause: impl FnMut(BackoffTier),
) -> PollOutcome<T> {
    let mut backoff = Backoff::new();
    loop {
        let result = probe();
        match (backoff.observe(result.is_ready()), result) {
            (PollState::Ready, Poll::Ready(value)) => {
                return PollOutcome {
                    value,
                    probes: backoff.misses() + 1,
                };
            }
            (PollState::Polling(tier), _) => pause(tier),
            (PollState::Ready, Poll::Pending) => unreachable!("ready state without a value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_after(misses: u64) -> impl FnMut() -> Poll<u64> {
        let mut calls = 0_u64;
        move || {
            calls += 1;
            if calls > misses {
                Poll::Ready(calls)
            } else {
                Poll::Pending
            }
        }
    }

    fn tiers_seen(misses: u64) -> (PollOutcome<u64>, [u64; 3]) {
        let mut seen = [0_u64; 3];
        let outcome = poll_with_pause(ready_after(misses), |tier| match tier {
            BackoffTier::Spin => seen[0] += 1,
            BackoffTier::Yield => seen[1] += 1,
            BackoffTier::Sleep => seen[2] += 1,
        });
        (outcome, seen)
    }

    #[test]
    fn returns_on_the_ready_probe_and_not_before() {
        for (misses, expected) in [
            (0, [0, 0, 0]),
            (1, [1, 0, 0]),
            (11, [10, 1, 0]),
            (101, [10, 90, 1]),
        ] {
            let (outcome, seen) = tiers_seen(misses);
            assert_eq!(outcome.probes, misses + 1, "misses={misses}");
            assert_eq!(outcome.value, misses + 1, "misses={misses}");
            assert_eq!(seen, expected, "misses={misses}");
        }
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(BackoffTier::for_misses(1), BackoffTier::Spin);
        assert_eq!(BackoffTier::for_misses(SPIN_LIMIT), BackoffTier::Spin);
        assert_eq!(BackoffTier::for_misses(SPIN_LIMIT + 1), BackoffTier::Yield);
        assert_eq!(BackoffTier::for_misses(YIELD_LIMIT), BackoffTier::Yield);
        assert_eq!(BackoffTier::for_misses(YIELD_LIMIT + 1), BackoffTier::Sleep);
    }

    #[test]
    fn state_machine_latches_ready() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.observe(false), PollState::Polling(BackoffTier::Spin));
        assert_eq!(backoff.observe(true), PollState::Ready);
        assert_eq!(backoff.observe(false), PollState::Ready);
        assert_eq!(backoff.misses(), 1);
    }

    #[test]
    fn real_pauses_terminate() {
        let outcome = poll_until_ready(ready_after(105));
        assert_eq!(outcome.probes, 106);
    }
}
