//! GraphQL submission feed backend.
//!
//! Mirrors the upstream API shape: one query lists indexer addresses, then
//! one query per indexer fetches its latest POI agreements. Rows that fail
//! validation are dropped individually and logged; a single malformed
//! submission never aborts the snapshot.

use super::SubmissionFeed;
use crate::models::{DeploymentId, IndexerId, PoiHash, Submission};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Default number of indexers fetched per cycle.
const DEFAULT_INDEXER_LIMIT: usize = 100;

/// GraphQL envelope: `data` or `errors`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct IndexersData {
    indexers: Vec<IndexerRow>,
}

#[derive(Debug, Deserialize)]
struct IndexerRow {
    address: String,
}

#[derive(Debug, Deserialize)]
struct AgreementsData {
    #[serde(rename = "poiAgreementRatios")]
    agreements: Vec<AgreementRow>,
}

#[derive(Debug, Deserialize)]
struct AgreementRow {
    poi: PoiRow,
}

#[derive(Debug, Deserialize)]
struct PoiRow {
    hash: String,
    block: BlockRow,
    deployment: DeploymentRow,
    indexer: IndexerRow,
    #[serde(rename = "createdAt")]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct BlockRow {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct DeploymentRow {
    cid: String,
}

/// Submission feed backed by a GraphQL endpoint.
pub struct GraphqlFeed {
    client: reqwest::blocking::Client,
    endpoint: String,
    indexer_limit: usize,
}

impl GraphqlFeed {
    /// Creates a feed client for `endpoint` with the given request timeout.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("poi-sentinel/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            endpoint: endpoint.into(),
            indexer_limit: DEFAULT_INDEXER_LIMIT,
        }
    }

    /// Sets how many indexers are listed per cycle.
    #[must_use]
    pub fn with_indexer_limit(mut self, limit: usize) -> Self {
        self.indexer_limit = limit;
        self
    }

    fn post_query<T: serde::de::DeserializeOwned>(&self, query: &str) -> Result<T> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .map_err(|e| Error::FeedUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FeedUnavailable(format!("HTTP {status} response")));
        }

        let envelope: Envelope<T> = response
            .json()
            .map_err(|e| Error::FeedUnavailable(format!("invalid response body: {e}")))?;

        if let Some(errors) = envelope.errors {
            return Err(Error::FeedUnavailable(format!("GraphQL errors: {errors}")));
        }
        envelope
            .data
            .ok_or_else(|| Error::FeedUnavailable("response carried no data".to_string()))
    }

    fn list_indexers(&self) -> Result<Vec<String>> {
        let query = format!(
            "query {{ indexers(limit: {}) {{ address }} }}",
            self.indexer_limit
        );
        let data: IndexersData = self.post_query(&query)?;
        Ok(data.indexers.into_iter().map(|row| row.address).collect())
    }

    fn agreements_for(&self, indexer: &str) -> Result<Vec<AgreementRow>> {
        let query = format!(
            "query {{ poiAgreementRatios(indexerAddress: \"{indexer}\") {{ \
               poi {{ hash block {{ number }} deployment {{ cid }} \
                     indexer {{ address }} createdAt }} }} }}"
        );
        let data: AgreementsData = self.post_query(&query)?;
        Ok(data.agreements)
    }

    /// Validates one feed row into a [`Submission`].
    fn validate_row(row: PoiRow) -> Result<Submission> {
        if row.deployment.cid.trim().is_empty() {
            return Err(Error::MalformedSubmission {
                reason: "empty deployment id".to_string(),
            });
        }
        if row.indexer.address.trim().is_empty() {
            return Err(Error::MalformedSubmission {
                reason: "empty indexer address".to_string(),
            });
        }
        Ok(Submission {
            deployment: DeploymentId::from(row.deployment.cid),
            block_number: row.block.number,
            poi: PoiHash::parse(&row.hash)?,
            indexer: IndexerId::from(row.indexer.address),
            observed_at: row.created_at.unwrap_or_else(Utc::now),
        })
    }
}

impl SubmissionFeed for GraphqlFeed {
    fn latest_submissions(&self) -> Result<Vec<Submission>> {
        let indexers = self.list_indexers()?;
        if indexers.is_empty() {
            tracing::warn!("Feed returned no indexers");
            return Ok(Vec::new());
        }

        let mut submissions = Vec::new();
        for indexer in &indexers {
            // One unreachable indexer does not abort the snapshot; its
            // deployments are simply absent this cycle.
            let agreements = match self.agreements_for(indexer) {
                Ok(agreements) => agreements,
                Err(e) => {
                    tracing::warn!(indexer, error = %e, "Skipping indexer for this cycle");
                    metrics::counter!("feed_indexer_failures_total").increment(1);
                    continue;
                },
            };

            for row in agreements {
                match Self::validate_row(row.poi) {
                    Ok(submission) => submissions.push(submission),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping malformed submission");
                        metrics::counter!("submissions_dropped_total").increment(1);
                    },
                }
            }
        }

        metrics::counter!("feed_submissions_total").increment(submissions.len() as u64);
        Ok(submissions)
    }
}
