use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};
use url::Url;

use super::cache::ConnectionCache;
use super::error::TrackerError;
use super::response::{resolve, SwarmState, TrackerKind};
use super::session::{Transition, UdpSession};
use crate::constants::{UDP_BASE_TIMEOUT, UDP_MAX_ATTEMPTS, UDP_MAX_ATTEMPTS_ON_STOP, UDP_PACKET_LEN};
use crate::torrent::InfoHash;

/// Retry policy of the sequential UDP scraper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeOptions {
    /// Wait of the first attempt; attempt `n` waits `base_timeout * 2^n`.
    pub base_timeout: Duration,
    /// Attempts per exchange (connect, then scrape) before timing out.
    pub max_attempts: u32,
}

impl ScrapeOptions {
    /// A single attempt, for scrapes issued while shutting down.
    pub fn stopping() -> Self {
        Self {
            max_attempts: UDP_MAX_ATTEMPTS_ON_STOP,
            ..Self::default()
        }
    }

    pub fn with_base_timeout(mut self, base_timeout: Duration) -> Self {
        self.base_timeout = base_timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Receive timeout for `attempt` (0-based).
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base_timeout.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
    }
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            base_timeout: UDP_BASE_TIMEOUT,
            max_attempts: UDP_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

/// Cancels a [`UdpScraper`] from any thread or task.
#[derive(Debug, Clone)]
pub struct ScrapeCloser {
    signal: Arc<StopSignal>,
}

impl ScrapeCloser {
    /// Asks the scraper to stop. A blocked receive returns right away with
    /// [`TrackerError::Cancelled`]; later scrapes fail the same way. Calling
    /// it again, or after the scrape finished, does nothing.
    pub fn close(&self) {
        if !self.signal.stopped.swap(true, Ordering::SeqCst) {
            self.signal.notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.signal.stopped.load(Ordering::SeqCst)
    }
}

/// Scrapes a single UDP tracker with exponential backoff.
///
/// The socket is connected to the tracker, so datagrams from anywhere else
/// never reach the session.
///
/// # Examples
///
/// ```no_run
/// use tscrape::tracker::{ConnectionCache, UdpScraper};
/// use tscrape::torrent::InfoHash;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let scraper = UdpScraper::connect(
///     "udp://tracker.example:6969/announce",
///     InfoHash::new([0; 20]),
///     ConnectionCache::shared(),
/// )
/// .await?;
///
/// let closer = scraper.closer();
/// std::thread::spawn(move || {
///     std::thread::sleep(std::time::Duration::from_secs(30));
///     closer.close();
/// });
///
/// let state = scraper.scrape().await?;
/// println!("{state}");
/// # Ok(())
/// # }
/// ```
pub struct UdpScraper {
    socket: UdpSocket,
    tracker: Url,
    addr: SocketAddr,
    info_hash: InfoHash,
    cache: Arc<ConnectionCache>,
    options: ScrapeOptions,
    signal: Arc<StopSignal>,
}

impl UdpScraper {
    pub async fn connect(
        url: &str,
        info_hash: InfoHash,
        cache: Arc<ConnectionCache>,
    ) -> Result<Self, TrackerError> {
        let (kind, tracker) = TrackerKind::classify(url)?;
        if kind != TrackerKind::Udp {
            return Err(TrackerError::UnsupportedProtocol(tracker.scheme().to_string()));
        }
        Self::from_url(tracker, info_hash, cache).await
    }

    pub async fn from_url(
        tracker: Url,
        info_hash: InfoHash,
        cache: Arc<ConnectionCache>,
    ) -> Result<Self, TrackerError> {
        let addr = resolve(&tracker, false)?;
        let bind = if addr.is_ipv4() {
            SocketAddr::from(([0u8; 4], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(bind).await?;
        socket.connect(addr).await?;

        Ok(Self {
            socket,
            tracker,
            addr,
            info_hash,
            cache,
            options: ScrapeOptions::default(),
            signal: Arc::new(StopSignal::default()),
        })
    }

    pub fn with_options(mut self, options: ScrapeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn closer(&self) -> ScrapeCloser {
        ScrapeCloser {
            signal: Arc::clone(&self.signal),
        }
    }

    /// Same as [`ScrapeCloser::close`].
    pub fn close(&self) {
        self.closer().close();
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> &Url {
        &self.tracker
    }

    /// Runs the connect/scrape exchange to completion.
    ///
    /// Each exchange gets `max_attempts` tries; a receive timeout resends the
    /// same kind of request under a new transaction id and a doubled wait.
    /// Error frames, malformed frames and socket errors end the scrape
    /// immediately.
    pub async fn scrape(&self) -> Result<SwarmState, TrackerError> {
        let mut session = UdpSession::new(
            self.tracker.as_str(),
            self.addr,
            self.info_hash,
            &self.cache,
        );
        let mut buf = vec![0u8; UDP_PACKET_LEN];
        let mut request = session.next_request();
        let mut attempt = 0;

        while attempt < self.options.max_attempts {
            if self.is_stopped() {
                return Err(TrackerError::Cancelled);
            }

            self.socket.send(&request).await?;

            let wait = self.options.timeout_for(attempt);
            trace!(tracker = %self.tracker, attempt, ?wait, phase = ?session.phase(), "waiting for tracker");

            match self.receive(&mut session, &mut buf, Instant::now() + wait).await? {
                Some(Transition::Finished(result)) => return result,
                Some(Transition::Send(scrape)) => {
                    // Connected: the scrape exchange starts its own backoff.
                    request = scrape;
                    attempt = 0;
                }
                Some(Transition::Ignored) | None => {
                    if self.is_stopped() {
                        return Err(TrackerError::Cancelled);
                    }
                    debug!(tracker = %self.tracker, attempt, phase = ?session.phase(), "tracker timed out, retrying");
                    request = session.next_request();
                    attempt += 1;
                }
            }
        }

        Err(TrackerError::Timeout)
    }

    /// Waits until a datagram moves the session forward or `deadline`
    /// passes (`None`).
    async fn receive(
        &self,
        session: &mut UdpSession,
        buf: &mut [u8],
        deadline: Instant,
    ) -> Result<Option<Transition>, TrackerError> {
        loop {
            let notified = self.signal.notify.notified();
            tokio::pin!(notified);
            // Enabled before the flag check so a racing close() still wakes us.
            notified.as_mut().enable();
            if self.is_stopped() {
                return Err(TrackerError::Cancelled);
            }

            let received = tokio::select! {
                _ = &mut notified => return Err(TrackerError::Cancelled),
                received = timeout_at(deadline, self.socket.recv(buf)) => received,
            };

            let n = match received {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            };

            match session.on_datagram(&buf[..n], &self.cache) {
                Transition::Ignored => continue,
                transition => return Ok(Some(transition)),
            }
        }
    }

    fn is_stopped(&self) -> bool {
        self.signal.stopped.load(Ordering::SeqCst)
    }
}
