//! Tracker scrape protocols (BEP-3 scrape convention, BEP-15, BEP-48)
//!
//! Building blocks shared by the concurrent [`engine`](crate::engine) and
//! the single-tracker scrapers:
//!
//! - [`frame`] encodes and decodes UDP tracker frames.
//! - [`http`] derives scrape URLs and decodes bencoded scrape bodies.
//! - [`ConnectionCache`] remembers UDP connection ids for 60 seconds.
//! - [`UdpSession`] runs the UDP connect/scrape state machine.
//! - [`UdpScraper`], [`HttpScraper`] and [`TrackerScraper`] scrape one
//!   tracker at a time.

mod cache;
mod error;
pub mod frame;
pub mod http;
mod response;
mod scraper;
mod session;
mod udp;

pub use cache::ConnectionCache;
pub use error::TrackerError;
pub use http::{parse_scrape_response, scrape_request_url, scrape_url, HttpScraper};
pub use response::{SwarmState, TrackerKind};
pub(crate) use response::resolve;
pub use scraper::TrackerScraper;
pub use session::{SessionPhase, Transition, UdpSession};
pub use udp::{ScrapeCloser, ScrapeOptions, UdpScraper};

#[cfg(test)]
mod tests;
