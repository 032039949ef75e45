use std::fmt;
use std::net::SocketAddr;

use url::Url;

use super::error::TrackerError;

/// Swarm statistics reported by a tracker for one torrent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SwarmState {
    /// Peers with the complete torrent (seeders).
    pub complete: u32,
    /// Number of completed downloads the tracker has recorded.
    pub downloaded: u32,
    /// Peers still downloading (leechers).
    pub incomplete: u32,
}

impl SwarmState {
    pub fn new(complete: u32, downloaded: u32, incomplete: u32) -> Self {
        Self {
            complete,
            downloaded,
            incomplete,
        }
    }
}

impl fmt::Display for SwarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} seeders, {} leechers, {} downloads",
            self.complete, self.incomplete, self.downloaded
        )
    }
}

/// Transport a tracker URI is scraped over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerKind {
    Http,
    Udp,
}

impl TrackerKind {
    /// Parses `uri` and classifies it by scheme.
    ///
    /// ```
    /// use tscrape::tracker::TrackerKind;
    ///
    /// let (kind, _) = TrackerKind::classify("udp://tracker.example:6969/announce").unwrap();
    /// assert_eq!(kind, TrackerKind::Udp);
    /// assert!(TrackerKind::classify("wss://tracker.example/announce").is_err());
    /// ```
    pub fn classify(uri: &str) -> Result<(Self, Url), TrackerError> {
        let url = Url::parse(uri).map_err(|e| TrackerError::InvalidUrl(format!("{uri}: {e}")))?;

        // Url lowercases the scheme while parsing.
        let kind = match url.scheme() {
            "http" => TrackerKind::Http,
            "udp" => TrackerKind::Udp,
            other => return Err(TrackerError::UnsupportedProtocol(other.to_string())),
        };
        Ok((kind, url))
    }
}

/// Resolves a tracker URL to the first usable socket address.
///
/// UDP trackers carry no default port and are only reachable over IPv4 from
/// the shared `0.0.0.0` socket, so `ipv4_only` filters the candidates.
pub(crate) fn resolve(url: &Url, ipv4_only: bool) -> Result<SocketAddr, TrackerError> {
    if url.host_str().is_none() {
        return Err(TrackerError::InvalidUrl(format!("{url}: missing host")));
    }
    if url.port_or_known_default().is_none() {
        return Err(TrackerError::InvalidUrl(format!("{url}: missing port")));
    }

    let addrs = url
        .socket_addrs(|| None)
        .map_err(|e| TrackerError::Resolve(format!("{url}: {e}")))?;

    addrs
        .into_iter()
        .find(|addr| !ipv4_only || addr.is_ipv4())
        .ok_or_else(|| TrackerError::Resolve(format!("{url}: no usable address")))
}
