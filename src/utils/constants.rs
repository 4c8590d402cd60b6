pub const QUEUE_KEY: &str = "jobsync:queue:import";
pub const PROCESSING_KEY: &str = "jobsync:processing";
pub const PREFIX_LEASE: &str = "jobsync:lease";

pub const LEASE_SECS: u64 = 60;
pub const RECLAIM_INTERVAL_SECS: u64 = 30;
pub const IDLE_POLL_MS: u64 = 500;

pub const MAX_ATTEMPTS: usize = 5;
pub const INITIAL_BACKOFF_MS: u64 = 1000;

pub const FETCH_TIMEOUT_SECS: u64 = 15;
pub const LIST_TIMEOUT_SECS: u64 = 20;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 20;

pub const EVENT_BUFFER: usize = 64;
pub const SSE_RETRY_MS: u64 = 10000;
