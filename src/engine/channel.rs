use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use bytes::Bytes;
use mio::net::{TcpStream, UdpSocket};
use mio::Interest;
use tracing::{trace, warn};

use crate::constants::HTTP_READ_CHUNK;
use crate::torrent::InfoHash;
use crate::tracker::http::{parse_http_response, ResponseHead};
use crate::tracker::{ConnectionCache, SwarmState, Transition, TrackerError, UdpSession};

/// A datagram waiting for the shared socket to become writable.
#[derive(Debug)]
pub(super) struct PendingWrite {
    pub payload: Bytes,
    pub target: SocketAddr,
}

/// The shared UDP socket and every session multiplexed over it.
pub(super) struct UdpChannel {
    pub socket: UdpSocket,
    pub sessions: HashMap<SocketAddr, UdpSession>,
    pending: VecDeque<PendingWrite>,
    recv_buf: Vec<u8>,
    /// Interest the socket is registered with, `None` before registration.
    pub registered: Option<Interest>,
}

impl UdpChannel {
    pub fn new(socket: UdpSocket, packet_len: usize) -> Self {
        Self {
            socket,
            sessions: HashMap::new(),
            pending: VecDeque::new(),
            recv_buf: vec![0u8; packet_len],
            registered: None,
        }
    }

    pub fn interest(&self) -> Interest {
        if self.pending.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    /// Sends right away unless earlier writes are still queued, in which
    /// case the datagram waits its turn.
    pub fn send_or_queue(&mut self, payload: Bytes, target: SocketAddr) -> io::Result<()> {
        if !self.pending.is_empty() {
            self.pending.push_back(PendingWrite { payload, target });
            return Ok(());
        }

        match self.socket.send_to(&payload, target) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                trace!(%target, "socket full, queueing datagram");
                self.pending.push_back(PendingWrite { payload, target });
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drains the queue in order until it empties or the socket fills up.
    ///
    /// Returns the targets whose datagram failed with a hard error.
    pub fn flush(&mut self) -> Vec<(SocketAddr, io::Error)> {
        let mut failed = Vec::new();

        while let Some(write) = self.pending.front() {
            match self.socket.send_to(&write.payload, write.target) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => failed.push((write.target, e)),
            }
            self.pending.pop_front();
        }

        failed
    }

    /// Drops queued datagrams of a session that already finished.
    pub fn forget(&mut self, target: SocketAddr) {
        self.pending.retain(|write| write.target != target);
    }

    /// Reads datagrams until the socket runs dry and feeds each one to the
    /// session registered for its sender.
    ///
    /// Returns every session that finished, along with its result.
    pub fn receive(
        &mut self,
        cache: &ConnectionCache,
    ) -> Vec<(UdpSession, Result<SwarmState, TrackerError>)> {
        let mut finished = Vec::new();

        loop {
            let (n, from) = match self.socket.recv_from(&mut self.recv_buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Reporting the error clears it, so keep draining.
                Err(e) => {
                    warn!(error = %e, "udp receive failed");
                    continue;
                }
            };

            let Some(session) = self.sessions.get_mut(&from) else {
                trace!(%from, len = n, "datagram from unknown sender");
                continue;
            };

            match session.on_datagram(&self.recv_buf[..n], cache) {
                Transition::Ignored => {}
                Transition::Send(payload) => {
                    if let Err(e) = self.send_or_queue(payload, from) {
                        self.forget(from);
                        if let Some(session) = self.sessions.remove(&from) {
                            finished.push((session, Err(e.into())));
                        }
                    }
                }
                Transition::Finished(result) => {
                    if let Some(session) = self.sessions.remove(&from) {
                        self.forget(from);
                        finished.push((session, result));
                    }
                }
            }
        }

        finished
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HttpPhase {
    Connecting,
    Writing,
    Reading,
}

/// What the reactor has to do after an HTTP channel handled an event.
#[derive(Debug)]
pub(super) enum Step {
    Wait,
    Reregister(Interest),
    Done(Result<SwarmState, TrackerError>),
}

/// One non-blocking HTTP scrape exchange.
pub(super) struct HttpChannel {
    pub tracker: String,
    pub stream: TcpStream,
    phase: HttpPhase,
    request: Bytes,
    written: usize,
    response: Vec<u8>,
}

impl HttpChannel {
    pub fn new(tracker: impl Into<String>, stream: TcpStream, request: Bytes) -> Self {
        Self {
            tracker: tracker.into(),
            stream,
            phase: HttpPhase::Connecting,
            request,
            written: 0,
            response: Vec::new(),
        }
    }

    pub fn phase(&self) -> HttpPhase {
        self.phase
    }

    /// Advances the exchange as far as the socket allows.
    pub fn on_ready(&mut self, info_hash: &InfoHash, max_response: usize) -> Step {
        match self.advance(info_hash, max_response) {
            Ok(step) => step,
            Err(e) => Step::Done(Err(e)),
        }
    }

    fn advance(&mut self, info_hash: &InfoHash, max_response: usize) -> Result<Step, TrackerError> {
        if self.phase == HttpPhase::Connecting {
            if !self.finish_connect()? {
                return Ok(Step::Wait);
            }
            trace!(tracker = %self.tracker, "connected");
            self.phase = HttpPhase::Writing;
        }

        if self.phase == HttpPhase::Writing {
            if !self.write_request()? {
                return Ok(Step::Wait);
            }
            self.phase = HttpPhase::Reading;
            return Ok(Step::Reregister(Interest::READABLE));
        }

        let eof = self.read_response(max_response)?;
        match ResponseHead::parse(&self.response)? {
            Some(head) if eof || head.is_complete(&self.response) => {
                Ok(Step::Done(parse_http_response(&self.response, info_hash)))
            }
            None if eof => Err(TrackerError::InvalidResponse(
                "connection closed before headers".into(),
            )),
            _ => Ok(Step::Wait),
        }
    }

    /// `Ok(false)` while the connect is still in flight.
    fn finish_connect(&mut self) -> Result<bool, TrackerError> {
        if let Some(e) = self.stream.take_error()? {
            return Err(e.into());
        }
        match self.stream.peer_addr() {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// `Ok(true)` once the whole request is out.
    fn write_request(&mut self) -> Result<bool, TrackerError> {
        while self.written < self.request.len() {
            match self.stream.write(&self.request[self.written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    /// Reads until the stream runs dry; `Ok(true)` on end of stream.
    fn read_response(&mut self, max_response: usize) -> Result<bool, TrackerError> {
        let mut chunk = [0u8; HTTP_READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(true),
                Ok(n) => {
                    self.response.extend_from_slice(&chunk[..n]);
                    if self.response.len() > max_response {
                        return Err(TrackerError::InvalidResponse(format!(
                            "response exceeds {max_response} bytes"
                        )));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}
