//! Structured issue reports and their message rendering.

use crate::models::{Discrepancy, IndexerId, Issue, Reuse};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A formatted issue ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct IssueReport {
    /// Unique event ID for idempotency on the receiving side.
    pub event_id: String,
    /// When the report was assembled.
    pub created_at: DateTime<Utc>,
    /// The detected issue.
    pub issue: Issue,
}

impl IssueReport {
    /// Wraps an issue with delivery metadata.
    #[must_use]
    pub fn new(issue: Issue) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            issue,
        }
    }

    /// Renders the human-readable message body.
    #[must_use]
    pub fn render_text(&self) -> String {
        match &self.issue {
            Issue::Discrepancy(discrepancy) => render_discrepancy(discrepancy),
            Issue::Reuse(reuse) => render_reuse(reuse),
        }
    }
}

fn render_discrepancy(discrepancy: &Discrepancy) -> String {
    let mut parts = vec![
        ":rotating_light: *New POI Discrepancy Found*".to_string(),
        format!("*Deployment:* `{}`", discrepancy.deployment),
        format!("*Block:* `{}`", discrepancy.block_number),
        "*POI Submissions:*".to_string(),
    ];

    for (poi, indexers) in &discrepancy.submitters {
        parts.push(format!("*POI Hash:* `{poi}`"));
        let submitted_by: Vec<&str> = indexers.iter().map(IndexerId::as_str).collect();
        parts.push(format!("*Submitted by:* `{}`", submitted_by.join(", ")));
        parts.push(String::new());
    }

    parts.join("\n")
}

fn render_reuse(reuse: &Reuse) -> String {
    [
        ":warning: *POI Reuse Detected*".to_string(),
        format!("*POI Hash:* `{}`", reuse.poi),
        format!(
            "*Current:* deployment `{}` block `{}` indexer `{}`",
            reuse.deployment, reuse.block_number, reuse.indexer
        ),
        format!("Previously used {} days ago:", reuse.days_since_origin()),
        format!("• Deployment: `{}`", reuse.origin.deployment),
        format!("• Block: `{}`", reuse.origin.block_number),
        format!("• Indexer: `{}`", reuse.origin.indexer),
        format!("• Observed: {}", reuse.origin.observed_at.to_rfc3339()),
    ]
    .join("\n")
}
