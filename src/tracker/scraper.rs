use std::sync::Arc;

use super::cache::ConnectionCache;
use super::error::TrackerError;
use super::http::HttpScraper;
use super::response::{SwarmState, TrackerKind};
use super::udp::{ScrapeOptions, UdpScraper};
use crate::constants::HTTP_TIMEOUT;
use crate::torrent::InfoHash;

/// A single-tracker scraper picked by URL scheme.
pub enum TrackerScraper {
    Http {
        scraper: HttpScraper,
        info_hash: InfoHash,
    },
    Udp(UdpScraper),
}

impl TrackerScraper {
    pub async fn new(
        url: &str,
        info_hash: InfoHash,
        cache: Arc<ConnectionCache>,
    ) -> Result<Self, TrackerError> {
        match TrackerKind::classify(url)? {
            (TrackerKind::Http, announce) => Ok(TrackerScraper::Http {
                scraper: HttpScraper::from_url(announce, HTTP_TIMEOUT)?,
                info_hash,
            }),
            (TrackerKind::Udp, announce) => Ok(TrackerScraper::Udp(
                UdpScraper::from_url(announce, info_hash, cache).await?,
            )),
        }
    }

    /// Applies to UDP trackers only.
    pub fn with_options(self, options: ScrapeOptions) -> Self {
        match self {
            TrackerScraper::Udp(udp) => TrackerScraper::Udp(udp.with_options(options)),
            http => http,
        }
    }

    pub fn kind(&self) -> TrackerKind {
        match self {
            TrackerScraper::Http { .. } => TrackerKind::Http,
            TrackerScraper::Udp(_) => TrackerKind::Udp,
        }
    }

    pub async fn scrape(&self) -> Result<SwarmState, TrackerError> {
        match self {
            TrackerScraper::Http { scraper, info_hash } => scraper.scrape(info_hash).await,
            TrackerScraper::Udp(udp) => udp.scrape().await,
        }
    }

    /// Cancels a pending UDP scrape. HTTP scrapes are bounded by their
    /// request timeout and ignore this.
    pub fn close(&self) {
        if let TrackerScraper::Udp(udp) = self {
            udp.close();
        }
    }
}
