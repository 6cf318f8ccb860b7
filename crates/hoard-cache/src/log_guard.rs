//! Repeated error log suppression.
//!
//! While the store is down every cache call fails, often with one of a few
//! messages. The guard logs the first occurrence of each message, counts
//! identical ones inside a rolling window, and emits one summary line per
//! message when its window lapses or the connection recovers.

use crate::CacheError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Identical errors that were not logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressedSummary {
    /// The repeated message.
    pub message: String,
    /// How many repeats were swallowed.
    pub count: u64,
    /// Time elapsed between the first occurrence and the summary.
    pub span: Duration,
}

impl SuppressedSummary {
    /// Write the summary line.
    pub fn log(&self) {
        warn!(
            suppressed = self.count,
            span_secs = self.span.as_secs(),
            message = %self.message,
            "Suppressed repeated cache errors"
        );
    }
}

/// Outcome of recording one error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDecision {
    /// Log this error, after the summaries of runs that have closed.
    Emit { summaries: Vec<SuppressedSummary> },
    /// Already logged inside the window.
    Suppress,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    first_seen: Instant,
    suppressed: u64,
}

impl Run {
    fn summary(self, message: &str, now: Instant) -> Option<SuppressedSummary> {
        (self.suppressed > 0).then(|| SuppressedSummary {
            message: message.to_string(),
            count: self.suppressed,
            span: now.saturating_duration_since(self.first_seen),
        })
    }
}

#[derive(Debug, Default)]
struct GuardState {
    runs: HashMap<String, Run>,
    last_notice: Option<Instant>,
}

impl GuardState {
    /// Removes runs matching `closed`, returning their summaries oldest first.
    fn drain(&mut self, now: Instant, closed: impl Fn(&Run) -> bool) -> Vec<SuppressedSummary> {
        let ended: Vec<String> = self
            .runs
            .iter()
            .filter(|&(_, run)| closed(run))
            .map(|(message, _)| message.clone())
            .collect();

        let mut summaries: Vec<(Instant, SuppressedSummary)> = ended
            .into_iter()
            .filter_map(|message| {
                let run = self.runs.remove(&message)?;
                run.summary(&message, now).map(|s| (run.first_seen, s))
            })
            .collect();
        summaries.sort_by_key(|(first_seen, _)| *first_seen);
        summaries.into_iter().map(|(_, s)| s).collect()
    }
}

/// Rolling-window de-duplication of error log lines.
#[derive(Debug)]
pub struct ErrorLogGuard {
    window: Duration,
    notice_interval: Duration,
    state: Mutex<GuardState>,
}

impl ErrorLogGuard {
    /// Create a guard.
    #[must_use]
    pub fn new(window: Duration, notice_interval: Duration) -> Self {
        Self {
            window,
            notice_interval,
            state: Mutex::new(GuardState::default()),
        }
    }

    /// Record an error occurring now.
    pub fn record(&self, message: &str) -> ErrorDecision {
        self.record_at(message, Instant::now())
    }

    /// Record an error occurring at `now`.
    ///
    /// Each distinct message keeps its own window, so interleaved failures
    /// of different kinds do not reset each other.
    pub fn record_at(&self, message: &str, now: Instant) -> ErrorDecision {
        let window = self.window;
        let mut state = self.state.lock();

        if let Some(run) = state.runs.get_mut(message) {
            if now.saturating_duration_since(run.first_seen) < window {
                run.suppressed += 1;
                return ErrorDecision::Suppress;
            }
        }

        let summaries = state.drain(now, |run| now.saturating_duration_since(run.first_seen) >= window);
        state.runs.insert(
            message.to_string(),
            Run {
                first_seen: now,
                suppressed: 0,
            },
        );
        ErrorDecision::Emit { summaries }
    }

    /// The connection recovered; closes every open run.
    pub fn recovered(&self) -> Vec<SuppressedSummary> {
        self.recovered_at(Instant::now())
    }

    /// The connection recovered at `now`.
    pub fn recovered_at(&self, now: Instant) -> Vec<SuppressedSummary> {
        let mut state = self.state.lock();
        state.last_notice = None;
        state.drain(now, |_| true)
    }

    /// Returns true if a reconnect notice may be logged now.
    pub fn reconnect_notice(&self) -> bool {
        self.reconnect_notice_at(Instant::now())
    }

    /// Returns true if a reconnect notice may be logged at `now`.
    pub fn reconnect_notice_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        let due = state
            .last_notice
            .map_or(true, |last| now.saturating_duration_since(last) >= self.notice_interval);
        if due {
            state.last_notice = Some(now);
        }
        due
    }

    /// Returns true if `message` should be logged now, after writing the
    /// summaries of closed runs.
    fn admit(&self, message: &str) -> bool {
        match self.record(message) {
            ErrorDecision::Emit { summaries } => {
                summaries.iter().for_each(SuppressedSummary::log);
                true
            }
            ErrorDecision::Suppress => false,
        }
    }

    /// Log `err` raised by `operation` unless it was logged inside the window.
    pub fn report(&self, operation: &str, err: &CacheError) {
        if !self.admit(&err.fingerprint()) {
            return;
        }

        let message = err.to_string();
        match err.transport_kind() {
            Some(kind) => error!(
                operation,
                kind = %kind,
                hint = kind.hint(),
                error = %message,
                "Cache store unreachable"
            ),
            None => warn!(operation, error = %message, "Cache operation failed"),
        }
    }

    /// Log that `lock` is being skipped because its store is unreachable.
    pub fn report_lock_fallback(&self, lock: &str, err: &CacheError) {
        let fingerprint = format!("Running work without lock: {}", err.fingerprint());
        if self.admit(&fingerprint) {
            warn!(lock, error = %err, "Lock store unavailable; running work without lock");
        }
    }

    /// Log recovery, with the summaries of any suppressed errors.
    pub fn report_recovered(&self) {
        self.recovered().iter().for_each(SuppressedSummary::log);
        info!("Cache store reconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ErrorLogGuard {
        ErrorLogGuard::new(Duration::from_secs(60), Duration::from_secs(30))
    }

    fn emitted() -> ErrorDecision {
        ErrorDecision::Emit { summaries: vec![] }
    }

    #[test]
    fn test_repeats_are_counted_once() {
        let guard = guard();
        let t0 = Instant::now();

        assert_eq!(guard.record_at("down", t0), emitted());
        for i in 1..5 {
            assert_eq!(
                guard.record_at("down", t0 + Duration::from_secs(i)),
                ErrorDecision::Suppress
            );
        }

        let summaries = guard.recovered_at(t0 + Duration::from_secs(10));
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].count, 4);
        assert_eq!(summaries[0].message, "down");
        assert_eq!(summaries[0].span, Duration::from_secs(10));
        assert!(guard.recovered_at(t0 + Duration::from_secs(11)).is_empty());
    }

    #[test]
    fn test_interleaved_messages_are_tracked_separately() {
        let guard = guard();
        let t0 = Instant::now();

        assert_eq!(guard.record_at("a", t0), emitted());
        assert_eq!(guard.record_at("b", t0), emitted());
        for i in 1..=3 {
            let at = t0 + Duration::from_secs(i);
            assert_eq!(guard.record_at("a", at), ErrorDecision::Suppress);
            assert_eq!(guard.record_at("b", at), ErrorDecision::Suppress);
        }

        let summaries = guard.recovered_at(t0 + Duration::from_secs(5));
        let mut counts: Vec<(String, u64)> = summaries.into_iter().map(|s| (s.message, s.count)).collect();
        counts.sort();
        assert_eq!(counts, vec![("a".to_string(), 3), ("b".to_string(), 3)]);
    }

    #[test]
    fn test_window_lapse_reemits() {
        let guard = guard();
        let t0 = Instant::now();
        guard.record_at("down", t0);
        guard.record_at("down", t0 + Duration::from_secs(30));

        match guard.record_at("down", t0 + Duration::from_secs(60)) {
            ErrorDecision::Emit { summaries } => {
                assert_eq!(summaries.len(), 1);
                assert_eq!(summaries[0].count, 1);
            }
            other => panic!("unexpected decision: {:?}", other),
        }
        assert_eq!(
            guard.record_at("down", t0 + Duration::from_secs(61)),
            ErrorDecision::Suppress
        );
    }

    #[test]
    fn test_lapsed_runs_flush_on_next_emit() {
        let guard = guard();
        let t0 = Instant::now();
        guard.record_at("a", t0);
        guard.record_at("a", t0 + Duration::from_secs(1));

        match guard.record_at("b", t0 + Duration::from_secs(90)) {
            ErrorDecision::Emit { summaries } => {
                assert_eq!(summaries.len(), 1);
                assert_eq!(summaries[0].message, "a");
            }
            other => panic!("unexpected decision: {:?}", other),
        }
        assert_eq!(guard.record_at("a", t0 + Duration::from_secs(91)), emitted());
    }

    #[test]
    fn test_single_error_has_no_summary() {
        let guard = guard();
        let t0 = Instant::now();
        guard.record_at("down", t0);
        assert!(guard.recovered_at(t0).is_empty());
        assert_eq!(guard.record_at("down", t0), emitted());
    }

    #[test]
    fn test_reconnect_notice_rate_limited() {
        let guard = guard();
        let t0 = Instant::now();
        assert!(guard.reconnect_notice_at(t0));
        assert!(!guard.reconnect_notice_at(t0 + Duration::from_secs(29)));
        assert!(guard.reconnect_notice_at(t0 + Duration::from_secs(30)));

        guard.recovered_at(t0 + Duration::from_secs(31));
        assert!(guard.reconnect_notice_at(t0 + Duration::from_secs(32)));
    }
}
