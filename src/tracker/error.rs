use thiserror::Error;

/// Why scraping one tracker failed.
///
/// Every variant is scoped to a single tracker: the engine reports it and
/// keeps going with the others.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    /// The tracker answered with an error frame or a `failure reason`.
    #[error("tracker returned error: {0}")]
    TrackerFailure(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The announce URL does not end in an `announce` segment, so there is
    /// no scrape URL to derive.
    #[error("tracker does not follow the scrape convention: {0}")]
    UnsupportedConvention(String),

    #[error("http status {0}")]
    HttpStatus(u16),

    #[error("timeout")]
    Timeout,

    #[error("scrape cancelled")]
    Cancelled,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("could not resolve {0}")]
    Resolve(String),

    /// Another tracker URI of the same run already resolved to this UDP
    /// endpoint.
    #[error("endpoint {0} is already being scraped")]
    DuplicateEndpoint(std::net::SocketAddr),
}
