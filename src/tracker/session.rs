use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use rand::Rng as _;
use tracing::{debug, trace};

use super::cache::ConnectionCache;
use super::error::TrackerError;
use super::frame::{ConnectRequest, Response, ScrapeRequest};
use super::response::SwarmState;
use crate::constants::UDP_PROTOCOL_ID;
use crate::torrent::InfoHash;

/// Where a UDP scrape conversation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for a connect response.
    Connecting,
    /// Holding a connection id, waiting for a scrape response.
    Scraping,
    Done,
}

/// What the owner of a session has to do after feeding it a datagram.
#[derive(Debug)]
pub enum Transition {
    /// Not for us (stale or foreign transaction id); keep waiting.
    Ignored,
    /// Send this frame to the tracker and keep waiting.
    Send(Bytes),
    /// The conversation is over.
    Finished(Result<SwarmState, TrackerError>),
}

#[derive(Debug, Clone, Copy)]
struct Connection {
    id: u64,
    expires_at: Instant,
}

/// Protocol state of one UDP tracker scrape.
///
/// The session owns no socket. Its owner sends whatever
/// [`next_request`](Self::next_request) or [`Transition::Send`] hands out and
/// feeds every datagram from the tracker's address back through
/// [`on_datagram`](Self::on_datagram). Requests and responses are matched by
/// transaction id only, so one socket can carry many sessions.
#[derive(Debug)]
pub struct UdpSession {
    tracker: String,
    addr: SocketAddr,
    info_hash: InfoHash,
    transaction_id: i32,
    connection: Option<Connection>,
    phase: SessionPhase,
}

impl UdpSession {
    /// Starts a session, reusing a live connection id from `cache`.
    pub fn new(
        tracker: impl Into<String>,
        addr: SocketAddr,
        info_hash: InfoHash,
        cache: &ConnectionCache,
    ) -> Self {
        let connection = cache
            .get_entry(&addr)
            .map(|(id, expires_at)| Connection { id, expires_at });
        let phase = if connection.is_some() {
            SessionPhase::Scraping
        } else {
            SessionPhase::Connecting
        };

        Self {
            tracker: tracker.into(),
            addr,
            info_hash,
            transaction_id: rand::rng().random(),
            connection,
            phase,
        }
    }

    pub fn tracker(&self) -> &str {
        &self.tracker
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn transaction_id(&self) -> i32 {
        self.transaction_id
    }

    /// The connection id the next scrape request would carry, or the
    /// protocol magic while not connected.
    pub fn connection_id(&self) -> u64 {
        self.connection.map_or(UDP_PROTOCOL_ID, |c| c.id)
    }

    pub fn is_done(&self) -> bool {
        self.phase == SessionPhase::Done
    }

    /// Builds the next request under a fresh transaction id.
    ///
    /// The connection id is checked against its expiry right here, so an id
    /// that lapsed since it was read falls back to a new handshake.
    pub fn next_request(&mut self) -> Bytes {
        self.transaction_id = rand::rng().random();

        match self.connection.filter(|c| Instant::now() < c.expires_at) {
            Some(connection) => {
                self.phase = SessionPhase::Scraping;
                ScrapeRequest {
                    connection_id: connection.id,
                    transaction_id: self.transaction_id,
                    info_hash: self.info_hash,
                }
                .encode()
            }
            None => {
                if self.connection.take().is_some() {
                    debug!(tracker = %self.tracker, "connection id expired, reconnecting");
                }
                self.phase = SessionPhase::Connecting;
                ConnectRequest {
                    transaction_id: self.transaction_id,
                }
                .encode()
            }
        }
    }

    /// Feeds one datagram received from the tracker.
    pub fn on_datagram(&mut self, data: &[u8], cache: &ConnectionCache) -> Transition {
        if self.is_done() {
            return Transition::Ignored;
        }

        let response = match Response::parse(data) {
            Ok(response) => response,
            Err(e) => return self.finish(Err(e)),
        };

        if response.transaction_id() != self.transaction_id {
            trace!(
                tracker = %self.tracker,
                expected = self.transaction_id,
                got = response.transaction_id(),
                "discarding stale datagram"
            );
            return Transition::Ignored;
        }

        match (self.phase, response) {
            (_, Response::Error { message, .. }) => {
                self.finish(Err(TrackerError::TrackerFailure(message)))
            }
            (SessionPhase::Connecting, Response::Connect { connection_id, .. }) => {
                let expires_at = cache.put(self.addr, connection_id);
                self.connection = Some(Connection {
                    id: connection_id,
                    expires_at,
                });
                debug!(tracker = %self.tracker, connection_id, "connected");
                Transition::Send(self.next_request())
            }
            (SessionPhase::Scraping, Response::Scrape { state, .. }) => self.finish(Ok(state)),
            (phase, other) => self.finish(Err(TrackerError::InvalidResponse(format!(
                "unexpected {} response while {:?}",
                other.action(),
                phase
            )))),
        }
    }

    /// Gives up on the conversation.
    pub fn time_out(&mut self) -> Transition {
        if self.is_done() {
            return Transition::Ignored;
        }
        self.finish(Err(TrackerError::Timeout))
    }

    fn finish(&mut self, result: Result<SwarmState, TrackerError>) -> Transition {
        self.phase = SessionPhase::Done;
        Transition::Finished(result)
    }
}
