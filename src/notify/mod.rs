//! Notification delivery boundary.
//!
//! Delivery is at-least-once from the monitor's perspective: a crash after
//! a send but before the state store commit means the next cycle recomputes
//! the same candidate and the reconcile filter either suppresses it (record
//! committed) or resends once (record not committed). Duplicate delivery is
//! an accepted, bounded cost; silent loss is not.
//!
//! # Retry Strategy
//!
//! Exponential backoff with defaults of 3 retries and a 1 second base delay
//! (1s, 2s, 4s). Network errors and 5xx responses retry; 4xx responses are
//! terminal.

mod report;
mod slack;

pub use report::IssueReport;
pub use slack::SlackNotifier;

use crate::Result;

/// Result of an accepted delivery.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// HTTP status code (if the channel is HTTP-shaped).
    pub status_code: Option<u16>,
    /// Number of attempts made, including the first.
    pub attempts: u32,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

/// Retry configuration for delivery backends.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds; doubles per attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (1-based).
    #[must_use]
    pub const fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms << attempt.saturating_sub(1)
    }
}

/// Trait for notification delivery backends.
pub trait Notifier: Send + Sync {
    /// Delivers an issue report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeliveryFailed`](crate::Error::DeliveryFailed) once
    /// the retry budget is exhausted or a terminal (4xx) response is seen.
    /// Callers must NOT update notification state on error, so the next
    /// cycle retries the same report.
    fn send(&self, report: &IssueReport) -> Result<DeliveryReceipt>;
}
