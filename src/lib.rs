pub mod config;
pub mod context;
pub mod cron;
pub mod error;
pub mod models;
pub mod queue;
pub mod rdconfig;
pub mod routes;
pub mod services;
pub mod stores;
pub mod utils;
pub mod workers;

pub use crate::utils::constants;
