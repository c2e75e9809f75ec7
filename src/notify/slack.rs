//! Slack webhook delivery backend.

use super::{DeliveryReceipt, IssueReport, Notifier, RetryPolicy};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};

/// Notifier posting issue reports to a Slack incoming webhook.
///
/// The webhook URL embeds a credential, so it is held as a secret and never
/// logged.
pub struct SlackNotifier {
    client: reqwest::blocking::Client,
    webhook_url: SecretString,
    retry: RetryPolicy,
}

impl SlackNotifier {
    /// Creates a notifier for `webhook_url` with the given request timeout.
    #[must_use]
    pub fn new(webhook_url: SecretString, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("poi-sentinel/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            webhook_url,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attempts a single delivery without retries.
    fn attempt_delivery(&self, report: &IssueReport) -> std::result::Result<u16, String> {
        let body = serde_json::json!({ "text": report.render_text() });

        let response = self
            .client
            .post(self.webhook_url.expose_secret())
            .header("X-Sentinel-Delivery-Id", &report.event_id)
            .json(&body)
            .send()
            .map_err(|e| format!("HTTP request failed: {e}"))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            Ok(status)
        } else {
            Err(format!("HTTP {status} response"))
        }
    }

    /// Client errors never retry; the request itself is wrong.
    fn is_terminal(error: &str) -> bool {
        error.contains("HTTP 4")
    }

    #[allow(clippy::cast_possible_truncation)]
    fn elapsed_ms(start: Instant) -> u64 {
        // Duration in ms will not realistically exceed u64::MAX
        start.elapsed().as_millis() as u64
    }
}

impl Notifier for SlackNotifier {
    fn send(&self, report: &IssueReport) -> Result<DeliveryReceipt> {
        let start = Instant::now();
        let max_attempts = self.retry.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt_delivery(report) {
                Ok(status_code) => {
                    metrics::counter!("notifications_delivered_total").increment(1);
                    return Ok(DeliveryReceipt {
                        status_code: Some(status_code),
                        attempts: attempt,
                        duration_ms: Self::elapsed_ms(start),
                    });
                },
                Err(error) => {
                    if Self::is_terminal(&error) {
                        metrics::counter!("notifications_failed_total").increment(1);
                        return Err(Error::DeliveryFailed {
                            attempts: attempt,
                            cause: error,
                        });
                    }
                    tracing::warn!(attempt, error, "Notification delivery attempt failed");
                    last_error = error;
                    if attempt < max_attempts {
                        let delay = self.retry.delay_for_attempt(attempt);
                        std::thread::sleep(Duration::from_millis(delay));
                    }
                },
            }
        }

        metrics::counter!("notifications_failed_total").increment(1);
        Err(Error::DeliveryFailed {
            attempts: max_attempts,
            cause: last_error,
        })
    }
}
