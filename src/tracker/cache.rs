use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::constants::CONNECTION_ID_TTL;

#[derive(Debug, Clone, Copy)]
struct Entry {
    connection_id: u64,
    expires_at: Instant,
}

/// Connection ids negotiated with UDP trackers, keyed by tracker endpoint.
///
/// An entry is valid for a fixed time after it was written; reading it does
/// not extend its life. All methods take `&self`, so one cache can be shared
/// (behind an `Arc`) by any number of engines and scrapers running on
/// different threads.
///
/// # Examples
///
/// ```
/// use tscrape::tracker::ConnectionCache;
///
/// let cache = ConnectionCache::new();
/// let tracker = "127.0.0.1:6969".parse().unwrap();
///
/// cache.put(tracker, 0x1234);
/// assert_eq!(cache.get(&tracker), Some(0x1234));
/// ```
#[derive(Debug)]
pub struct ConnectionCache {
    entries: DashMap<SocketAddr, Entry>,
    ttl: Duration,
}

impl ConnectionCache {
    /// A cache whose entries live for 60 seconds.
    pub fn new() -> Self {
        Self::with_ttl(CONNECTION_ID_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// The process-wide cache used when no cache is injected.
    pub fn shared() -> Arc<ConnectionCache> {
        static SHARED: OnceLock<Arc<ConnectionCache>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(ConnectionCache::new())).clone()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the connection id for `addr` unless it is missing or expired.
    pub fn get(&self, addr: &SocketAddr) -> Option<u64> {
        self.get_entry(addr).map(|(id, _)| id)
    }

    /// Returns the connection id together with the instant it expires.
    pub fn get_entry(&self, addr: &SocketAddr) -> Option<(u64, Instant)> {
        self.lookup(addr, Instant::now())
    }

    pub(crate) fn lookup(&self, addr: &SocketAddr, now: Instant) -> Option<(u64, Instant)> {
        let entry = *self.entries.get(addr)?;
        if now >= entry.expires_at {
            // Only drop the entry if nobody rewrote it in the meantime.
            self.entries
                .remove_if(addr, |_, current| current.expires_at <= now);
            return None;
        }
        Some((entry.connection_id, entry.expires_at))
    }

    /// Stores `connection_id` for `addr`, replacing any previous entry, and
    /// returns when it expires.
    pub fn put(&self, addr: SocketAddr, connection_id: u64) -> Instant {
        self.insert_at(addr, connection_id, Instant::now())
    }

    pub(crate) fn insert_at(&self, addr: SocketAddr, connection_id: u64, now: Instant) -> Instant {
        let expires_at = now + self.ttl;
        self.entries.insert(
            addr,
            Entry {
                connection_id,
                expires_at,
            },
        );
        expires_at
    }

    pub fn remove(&self, addr: &SocketAddr) -> Option<u64> {
        self.entries.remove(addr).map(|(_, e)| e.connection_id)
    }

    /// Drops every expired entry. Lookups ignore expired entries anyway;
    /// this only reclaims memory.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ConnectionCache {
    fn default() -> Self {
        Self::new()
    }
}
