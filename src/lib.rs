//! tscrape - A BitTorrent tracker scrape library
//!
//! This library asks BitTorrent trackers how many seeders, leechers and
//! completed downloads they know of for a torrent, over both the UDP tracker
//! protocol and the HTTP scrape convention.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`torrent`] - Info-hashes and the announce tiers a scrape runs over
//! - [`tracker`] - BEP-15 UDP frames, HTTP scrape URLs and responses, the
//!   connection id cache and single-tracker scrapers
//! - [`engine`] - Concurrent scraping of every tracker of a torrent
//! - [`constants`] - Protocol constants and defaults

pub mod bencode;
pub mod constants;
pub mod engine;
pub mod torrent;
pub mod tracker;

pub use bencode::{decode, encode, BencodeError, Value};
pub use engine::{
    EventCollector, IdlePolicy, ScrapeConfig, ScrapeEngine, ScrapeError, ScrapeEvent,
    ScrapeListener,
};
pub use torrent::{InfoHash, InfoHashError, Torrent, TorrentRef};
pub use tracker::{
    ConnectionCache, HttpScraper, ScrapeCloser, ScrapeOptions, SwarmState, TrackerError,
    TrackerKind, TrackerScraper, UdpScraper, UdpSession,
};
