use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One audit row per import run. `ended_at` stays NULL while the run is in
/// flight; once set, new + updated + failed == total for runs that finished
/// a record loop (a run abandoned after exhausted retries is finalized with
/// all counts zero).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ImportLog {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total: i64,
    pub new_count: i64,
    pub updated_count: i64,
    pub failed_count: i64,
    pub file_name: String,
}

impl ImportLog {
    /// Shape of a log row right after `insert_started`, used for the
    /// `running` progress event before any counts exist.
    pub fn started(id: i64, started_at: DateTime<Utc>, file_name: &str) -> Self {
        Self {
            id,
            started_at,
            ended_at: None,
            total: 0,
            new_count: 0,
            updated_count: 0,
            failed_count: 0,
            file_name: file_name.to_string(),
        }
    }
}

/// Per-run accounting accumulated by the import worker.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunCounts {
    pub total: i64,
    pub new_count: i64,
    pub updated_count: i64,
    pub failed_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn import_log_serializes_camel_case() {
        let log = ImportLog::started(
            7,
            Utc.with_ymd_and_hms(2024, 7, 17, 12, 0, 0).unwrap(),
            "https://jobs.example/feed",
        );
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["fileName"], "https://jobs.example/feed");
        assert_eq!(json["newCount"], 0);
        assert!(json["endedAt"].is_null());
        assert!(json["startedAt"].is_string());
    }
}
