pub mod import_log;
pub mod job;

pub use import_log::{ImportLog, RunCounts};
pub use job::NormalizedJob;
