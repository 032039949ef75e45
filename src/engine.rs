//! Concurrent multi-tracker scraping
//!
//! [`ScrapeEngine`] scrapes every tracker of a torrent in a single thread.
//! UDP trackers share one non-blocking socket and are told apart by their
//! address; each HTTP tracker gets its own non-blocking TCP stream. A
//! `mio` poller multiplexes all of them, and results stream out through a
//! [`ScrapeListener`] as they arrive.
//!
//! The run ends once every tracker has reported, or after
//! [`ScrapeConfig::idle_timeout`] passes without any socket activity. What
//! happens to trackers still pending at that point is governed by
//! [`IdlePolicy`].
//!
//! # Example
//!
//! ```no_run
//! use tscrape::engine::{EventCollector, ScrapeConfig, ScrapeEngine};
//! use tscrape::torrent::{InfoHash, TorrentRef};
//!
//! let torrent = TorrentRef::with_trackers(
//!     InfoHash::new([0; 20]),
//!     ["udp://tracker.example:6969/announce", "http://tracker.example/announce"],
//! );
//!
//! let engine = ScrapeEngine::new(ScrapeConfig::default());
//! let mut events = EventCollector::new();
//! engine.scrape(&torrent, &mut events);
//!
//! for (tracker, state) in events.successes() {
//!     println!("{tracker}: {state}");
//! }
//! ```

mod channel;
mod error;
mod listener;
mod reactor;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::constants::{EVENTS_CAPACITY, IDLE_TIMEOUT, MAX_HTTP_RESPONSE, UDP_PACKET_LEN};
use crate::torrent::Torrent;
use crate::tracker::{ConnectionCache, TrackerKind};

pub use error::ScrapeError;
pub use listener::{EventCollector, ScrapeEvent, ScrapeListener};

use reactor::{Emitter, Reactor};

/// What to do with trackers that are still pending when the run goes idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdlePolicy {
    /// Stop without reporting them.
    #[default]
    Abandon,
    /// Report [`TrackerError::Timeout`](crate::tracker::TrackerError::Timeout)
    /// for each of them.
    ReportTimeout,
}

/// Tuning of a [`ScrapeEngine`].
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Longest stretch without socket activity before the run stops.
    pub idle_timeout: Duration,
    pub idle_policy: IdlePolicy,
    /// Receive buffer size for UDP datagrams.
    pub udp_packet_len: usize,
    /// Upper bound on a buffered HTTP response, head included.
    pub max_http_response: usize,
    /// Readiness events fetched per poll.
    pub events_capacity: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            idle_timeout: IDLE_TIMEOUT,
            idle_policy: IdlePolicy::default(),
            udp_packet_len: UDP_PACKET_LEN,
            max_http_response: MAX_HTTP_RESPONSE,
            events_capacity: EVENTS_CAPACITY,
        }
    }
}

impl ScrapeConfig {
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_idle_policy(mut self, idle_policy: IdlePolicy) -> Self {
        self.idle_policy = idle_policy;
        self
    }

    pub fn with_udp_packet_len(mut self, len: usize) -> Self {
        self.udp_packet_len = len;
        self
    }

    pub fn with_max_http_response(mut self, len: usize) -> Self {
        self.max_http_response = len;
        self
    }

    pub fn with_events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = capacity.max(1);
        self
    }
}

/// Scrapes all trackers of a torrent concurrently.
///
/// An engine holds no sockets between runs; each [`scrape`](Self::scrape)
/// call opens and closes its own. Runs share UDP connection ids through the
/// [`ConnectionCache`].
#[derive(Debug, Clone)]
pub struct ScrapeEngine {
    config: ScrapeConfig,
    cache: Arc<ConnectionCache>,
}

impl ScrapeEngine {
    /// Creates an engine backed by the process-wide connection cache.
    pub fn new(config: ScrapeConfig) -> Self {
        Self {
            config,
            cache: ConnectionCache::shared(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ConnectionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ConnectionCache> {
        &self.cache
    }

    /// Scrapes every tracker of `torrent`, blocking until the run ends.
    ///
    /// Each tracker produces at most one success or tracker error on
    /// `listener`, in completion order. A tracker that cannot be handled
    /// (unsupported scheme, unresolvable host, no scrape URL) fails on its
    /// own without holding up the others. Failing to set up the poller or
    /// the shared UDP socket ends the run through
    /// [`ScrapeListener::on_error`].
    pub fn scrape(&self, torrent: &dyn Torrent, listener: &mut dyn ScrapeListener) {
        let info_hash = torrent.info_hash();
        let mut emit = Emitter { torrent, listener };

        let mut seen = HashSet::new();
        let mut trackers = Vec::new();
        for uri in torrent.trackers() {
            if !seen.insert(uri) {
                continue;
            }
            match TrackerKind::classify(uri) {
                Ok((kind, url)) => trackers.push((uri, kind, url)),
                Err(e) => emit.tracker_error(uri, e),
            }
        }

        debug!(%info_hash, trackers = trackers.len(), "starting scrape");
        if trackers.is_empty() {
            return;
        }

        let mut reactor = match Reactor::open(info_hash, &self.config, &self.cache) {
            Ok(reactor) => reactor,
            Err(e) => {
                emit.fatal(ScrapeError::Setup(e));
                return;
            }
        };

        for (uri, kind, url) in &trackers {
            let added = match kind {
                TrackerKind::Udp => reactor.add_udp(uri, url),
                TrackerKind::Http => reactor.add_http(uri, url),
            };
            if let Err(e) = added {
                emit.tracker_error(uri, e);
            }
        }

        if let Err(e) = reactor.register_udp() {
            warn!(error = %e, "failed to register udp socket");
            emit.fatal(ScrapeError::Setup(e));
            return;
        }

        reactor.run(&mut emit);
    }

    /// Runs [`scrape`](Self::scrape) and returns every event it produced.
    pub fn scrape_collect(&self, torrent: &dyn Torrent) -> EventCollector {
        let mut events = EventCollector::new();
        self.scrape(torrent, &mut events);
        events
    }
}
