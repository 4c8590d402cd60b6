use thiserror::Error;

/// Feed retrieval failed before any bytes could be parsed. Not retried here;
/// the import worker owns the retry loop.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// The payload was fetched but is not well-formed feed markup.
#[derive(Debug, Error)]
#[error("feed is not well-formed XML: {0}")]
pub struct ParseError(pub String);
