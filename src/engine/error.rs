use thiserror::Error;

/// A failure that ends a whole engine run.
///
/// Reported at most once per run through
/// [`ScrapeListener::on_error`](super::ScrapeListener::on_error).
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The readiness poller or the shared UDP socket could not be set up.
    #[error("engine setup failed: {0}")]
    Setup(#[source] std::io::Error),

    /// Waiting on the readiness poller failed mid-run.
    #[error("poll failed: {0}")]
    Poll(#[source] std::io::Error),
}
