use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical job listing produced by the normalizer. Identity is the
/// (external_id, source) pair; everything else is best-effort.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedJob {
    /// Source-provided identifier. Empty when the item carried no guid, id or
    /// link; the store rejects such records and the run counts them as failed.
    pub external_id: String,
    /// Feed URL or label the item came from.
    pub source: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "postedAt")]
    pub posted_at: Option<DateTime<Utc>>,
    /// The parsed item exactly as it appeared in the feed, kept for forward
    /// compatibility with fields the mapping does not know about.
    pub raw: Value,
}
