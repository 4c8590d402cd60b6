pub mod broadcaster;
pub mod fetcher;
pub mod normalizer;
