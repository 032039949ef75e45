//! Protocol constants and tuning parameters.
//!
//! Wire values come from [BEP-15] and the HTTP scrape convention. Timeouts
//! and buffer sizes are the defaults used by [`ScrapeConfig`] and
//! [`ScrapeOptions`] and can be overridden there.
//!
//! [BEP-15]: http://bittorrent.org/beps/bep_0015.html
//! [`ScrapeConfig`]: crate::engine::ScrapeConfig
//! [`ScrapeOptions`]: crate::tracker::ScrapeOptions

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// User agent string for HTTP scrape requests
pub const USER_AGENT: &str = "tscrape/0.1.0";

// ============================================================================
// UDP tracker protocol (BEP-15)
// ============================================================================

/// Magic connection id sent with every connect request. A session holding
/// this value has not completed the handshake yet.
pub const UDP_PROTOCOL_ID: u64 = 0x41727101980;

/// Action code of a connect exchange
pub const ACTION_CONNECT: u32 = 0;

/// Action code of a scrape exchange
pub const ACTION_SCRAPE: u32 = 2;

/// Action code of a tracker error frame
pub const ACTION_ERROR: u32 = 3;

/// Length of a connect request and of a connect response
pub const CONNECT_FRAME_LEN: usize = 16;

/// Length of a single info-hash scrape request
pub const SCRAPE_REQUEST_LEN: usize = 36;

/// Length of a single info-hash scrape response
pub const SCRAPE_RESPONSE_LEN: usize = 20;

/// Smallest frame a tracker can answer with (action + transaction id)
pub const MIN_RESPONSE_LEN: usize = 8;

/// Receive buffer for tracker datagrams. The largest frame we expect is an
/// error message; 512 bytes leaves plenty of room.
pub const UDP_PACKET_LEN: usize = 512;

/// How long a connection id handed out by a tracker stays usable
pub const CONNECTION_ID_TTL: Duration = Duration::from_secs(60);

// ============================================================================
// Sequential UDP scraper
// ============================================================================

/// Base receive timeout, doubled on every retry (`15 * 2^attempt` seconds)
pub const UDP_BASE_TIMEOUT: Duration = Duration::from_secs(15);

/// Attempts per exchange before giving up (last wait is 1920 s)
pub const UDP_MAX_ATTEMPTS: u32 = 8;

/// Attempts when the scrape is run as part of shutting down
pub const UDP_MAX_ATTEMPTS_ON_STOP: u32 = 1;

// ============================================================================
// HTTP trackers
// ============================================================================

/// Request timeout for the single-tracker HTTP scraper
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on a buffered HTTP scrape response (headers + body)
pub const MAX_HTTP_RESPONSE: usize = 64 * 1024;

/// Read chunk used when draining a tracker stream
pub const HTTP_READ_CHUNK: usize = 4096;

// ============================================================================
// Concurrent engine
// ============================================================================

/// Bounded wait on the readiness multiplexer. A wait that ends with no
/// ready channel ends the run.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the readiness event buffer
pub const EVENTS_CAPACITY: usize = 128;
