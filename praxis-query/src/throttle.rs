//! Sliding-window self-throttle.
//!
//! The tracker remembers when recent calls went out. Once the number of
//! calls inside the window reaches the ceiling, the next caller is told to
//! pause before issuing its call, which keeps a burst of requests from
//! running straight into the provider's own limit.
//!
//! One tracker is shared by every runner wired against the same provider.
//! The lock is only held to prune and push timestamps; the pause happens
//! outside of it. Concurrent callers can therefore slightly over- or
//! undercount, which only shifts when a pause happens.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use praxis_core::ThrottleConfig;
use tokio::time::Instant;

/// What the caller has to do before issuing its call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Proceed,
    Pause {
        /// Calls seen inside the window, this one excluded.
        recent_calls: usize,
        pause: Duration,
    },
}

impl ThrottleDecision {
    pub fn pause(&self) -> Duration {
        match self {
            Self::Proceed => Duration::ZERO,
            Self::Pause { pause, .. } => *pause,
        }
    }
}

/// Recent call timestamps for one provider.
#[derive(Debug)]
pub struct ThrottleTracker {
    config: ThrottleConfig,
    calls: Mutex<VecDeque<Instant>>,
}

impl Default for ThrottleTracker {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl ThrottleTracker {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Calls recorded inside the current window.
    pub fn recent_calls(&self) -> usize {
        let now = Instant::now();
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut calls, now);
        calls.len()
    }

    /// Record a call that is about to go out and decide whether it must
    /// pause first.
    ///
    /// A paused call is recorded at the time it will actually be issued.
    pub fn register_call(&self) -> ThrottleDecision {
        let now = Instant::now();
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut calls, now);

        let recent_calls = calls.len();
        if recent_calls >= self.config.ceiling {
            let pause = self.config.pause();
            calls.push_back(now.checked_add(pause).unwrap_or(now));
            ThrottleDecision::Pause {
                recent_calls,
                pause,
            }
        } else {
            calls.push_back(now);
            ThrottleDecision::Proceed
        }
    }

    /// Forget every recorded call.
    pub fn reset(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    // Paused calls are stamped in the future, so entries are not in time
    // order and every one has to be checked.
    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        let window = self.config.window();
        calls.retain(|&at| now.saturating_duration_since(at) < window);
    }
}
