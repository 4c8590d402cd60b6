pub mod import_worker;
pub mod runner;
