//! Submission feed boundary.
//!
//! The feed is a read-only source of the latest known POI submissions per
//! deployment. The monitor never writes through this boundary and treats
//! every failure as transient ([`Error::FeedUnavailable`](crate::Error)).

mod graphql;

pub use graphql::GraphqlFeed;

use crate::Result;
use crate::models::Submission;

/// Trait for submission feed backends.
///
/// One implementation queries a GraphQL API; tests script their own.
pub trait SubmissionFeed: Send + Sync {
    /// Returns the latest known submissions, flattened across deployments.
    ///
    /// The engine re-derives per-deployment latest-height groups from this
    /// list itself rather than trusting feed pagination, keeping the
    /// grouping invariant in one place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FeedUnavailable`](crate::Error::FeedUnavailable) if
    /// the feed cannot be queried at all. A partially available feed (some
    /// indexers unreachable) is not an error: missing deployments are
    /// simply absent from this cycle's snapshot.
    fn latest_submissions(&self) -> Result<Vec<Submission>>;
}
