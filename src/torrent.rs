//! The torrent handle a scrape is run for.
//!
//! Parsing `.torrent` files is not this crate's job. A scrape only needs the
//! info-hash and the announce tiers ([BEP-12]), so callers hand those over
//! through the [`Torrent`] trait. [`TorrentRef`] is a plain owned
//! implementation for callers that already extracted both.
//!
//! ```
//! use tscrape::torrent::{InfoHash, Torrent, TorrentRef};
//!
//! let torrent = TorrentRef::new(
//!     InfoHash::new([0xab; 20]),
//!     vec![
//!         vec!["udp://tracker.example:1337/announce".to_string()],
//!         vec!["http://backup.example/announce".to_string()],
//!     ],
//! );
//! assert_eq!(torrent.trackers().count(), 2);
//! ```
//!
//! [BEP-12]: http://bittorrent.org/beps/bep_0012.html

mod info_hash;

pub use info_hash::{InfoHash, InfoHashError};

/// What the scrape engine reads from a torrent.
pub trait Torrent {
    fn info_hash(&self) -> InfoHash;

    /// Announce URIs grouped in tiers, in preference order.
    fn announce_tiers(&self) -> &[Vec<String>];

    /// All announce URIs, tier by tier.
    fn trackers(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(
            self.announce_tiers()
                .iter()
                .flat_map(|tier| tier.iter().map(String::as_str)),
        )
    }
}

/// An info-hash plus its announce tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentRef {
    info_hash: InfoHash,
    tiers: Vec<Vec<String>>,
}

impl TorrentRef {
    pub fn new(info_hash: InfoHash, tiers: Vec<Vec<String>>) -> Self {
        Self { info_hash, tiers }
    }

    /// A torrent with a single tier holding every tracker.
    pub fn with_trackers<I, S>(info_hash: InfoHash, trackers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(info_hash, vec![trackers.into_iter().map(Into::into).collect()])
    }
}

impl Torrent for TorrentRef {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn announce_tiers(&self) -> &[Vec<String>] {
        &self.tiers
    }
}
