pub mod db;
pub mod import_log_store;
pub mod job_store;
