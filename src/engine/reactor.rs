use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use mio::event::Event;
use mio::net::{TcpStream, UdpSocket};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, trace, warn};
use url::Url;

use super::channel::{HttpChannel, Step, UdpChannel};
use super::error::ScrapeError;
use super::listener::ScrapeListener;
use super::{IdlePolicy, ScrapeConfig};
use crate::torrent::{InfoHash, Torrent};
use crate::tracker::http::build_get_request;
use crate::tracker::{
    resolve, scrape_request_url, ConnectionCache, SwarmState, TrackerError, Transition,
    UdpSession,
};

const UDP_TOKEN: Token = Token(0);

/// Binds a torrent to its listener for the duration of a run.
pub(super) struct Emitter<'a> {
    pub torrent: &'a dyn Torrent,
    pub listener: &'a mut dyn ScrapeListener,
}

impl Emitter<'_> {
    pub fn result(&mut self, tracker: &str, result: Result<SwarmState, TrackerError>) {
        match result {
            Ok(state) => {
                debug!(tracker, %state, "scrape succeeded");
                self.listener.on_tracker_success(self.torrent, tracker, state);
            }
            Err(e) => self.tracker_error(tracker, e),
        }
    }

    pub fn tracker_error(&mut self, tracker: &str, cause: TrackerError) {
        debug!(tracker, error = %cause, "scrape failed");
        self.listener.on_tracker_error(self.torrent, tracker, cause);
    }

    pub fn fatal(&mut self, cause: ScrapeError) {
        warn!(error = %cause, "scrape run aborted");
        self.listener.on_error(self.torrent, cause);
    }
}

/// Owns the poller and every socket of one run.
///
/// Dropping it deregisters and closes whatever is still open, whichever way
/// the run ends.
pub(super) struct Reactor<'a> {
    poll: Poll,
    udp: UdpChannel,
    http: HashMap<Token, HttpChannel>,
    next_token: usize,
    info_hash: InfoHash,
    config: &'a ScrapeConfig,
    cache: &'a ConnectionCache,
}

impl<'a> Reactor<'a> {
    pub fn open(
        info_hash: InfoHash,
        config: &'a ScrapeConfig,
        cache: &'a ConnectionCache,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        let socket = UdpSocket::bind(SocketAddr::from(([0u8; 4], 0)))?;
        trace!(local = ?socket.local_addr(), "bound shared udp socket");

        Ok(Self {
            poll,
            udp: UdpChannel::new(socket, config.udp_packet_len),
            http: HashMap::new(),
            next_token: UDP_TOKEN.0 + 1,
            info_hash,
            config,
            cache,
        })
    }

    /// Starts a UDP session and sends its first request.
    pub fn add_udp(&mut self, tracker: &str, url: &Url) -> Result<(), TrackerError> {
        let addr = resolve(url, true)?;
        if let Some(existing) = self.udp.sessions.get(&addr) {
            debug!(tracker, other = existing.tracker(), %addr, "endpoint already in use");
            return Err(TrackerError::DuplicateEndpoint(addr));
        }

        let mut session = UdpSession::new(tracker, addr, self.info_hash, self.cache);
        let request = session.next_request();
        trace!(tracker, %addr, phase = ?session.phase(), "sending first request");
        self.udp.send_or_queue(request, addr)?;
        self.udp.sessions.insert(addr, session);
        Ok(())
    }

    /// Opens a non-blocking connection to an HTTP tracker.
    pub fn add_http(&mut self, tracker: &str, url: &Url) -> Result<(), TrackerError> {
        let request_url = scrape_request_url(url, &self.info_hash)?;
        let addr = resolve(&request_url, false)?;

        let mut stream = TcpStream::connect(addr)?;
        let token = Token(self.next_token);
        self.poll
            .registry()
            .register(&mut stream, token, Interest::WRITABLE)?;
        self.next_token += 1;

        trace!(tracker, %addr, ?token, "connecting");
        self.http.insert(
            token,
            HttpChannel::new(tracker, stream, build_get_request(&request_url)),
        );
        Ok(())
    }

    pub fn register_udp(&mut self) -> io::Result<()> {
        let interest = self.udp.interest();
        self.poll
            .registry()
            .register(&mut self.udp.socket, UDP_TOKEN, interest)?;
        self.udp.registered = Some(interest);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.udp.sessions.len() + self.http.len()
    }

    /// Dispatches readiness events until every tracker has reported or the
    /// trackers stay silent for a whole idle timeout.
    pub fn run(&mut self, emit: &mut Emitter<'_>) {
        let mut events = Events::with_capacity(self.config.events_capacity);

        while self.pending() > 0 {
            if let Err(e) = self.poll.poll(&mut events, Some(self.config.idle_timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                emit.fatal(ScrapeError::Poll(e));
                return;
            }

            if events.is_empty() {
                self.on_idle(emit);
                return;
            }

            for event in events.iter() {
                match event.token() {
                    UDP_TOKEN => self.on_udp_event(event, emit),
                    token => self.on_http_event(token, emit),
                }
            }
        }

        trace!("all trackers answered");
    }

    fn on_udp_event(&mut self, event: &Event, emit: &mut Emitter<'_>) {
        if event.is_writable() {
            for (addr, e) in self.udp.flush() {
                self.udp.forget(addr);
                if let Some(session) = self.udp.sessions.remove(&addr) {
                    emit.tracker_error(session.tracker(), e.into());
                }
            }
        }

        if event.is_readable() {
            for (session, result) in self.udp.receive(self.cache) {
                emit.result(session.tracker(), result);
            }
        }

        if let Err(e) = self.sync_udp_interest() {
            // Without the socket in the poller no session can progress.
            for (_, session) in self.udp.sessions.drain() {
                emit.tracker_error(session.tracker(), TrackerError::Io(clone_io(&e)));
            }
        }
    }

    fn sync_udp_interest(&mut self) -> io::Result<()> {
        let interest = self.udp.interest();
        if self.udp.registered == Some(interest) {
            return Ok(());
        }
        self.poll
            .registry()
            .reregister(&mut self.udp.socket, UDP_TOKEN, interest)?;
        self.udp.registered = Some(interest);
        Ok(())
    }

    fn on_http_event(&mut self, token: Token, emit: &mut Emitter<'_>) {
        let Some(channel) = self.http.get_mut(&token) else {
            return;
        };

        let result = match channel.on_ready(&self.info_hash, self.config.max_http_response) {
            Step::Wait => return,
            Step::Reregister(interest) => {
                match self
                    .poll
                    .registry()
                    .reregister(&mut channel.stream, token, interest)
                {
                    Ok(()) => {
                        trace!(tracker = %channel.tracker, ?interest, phase = ?channel.phase(), "request sent");
                        return;
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Step::Done(result) => result,
        };

        if let Some(mut channel) = self.http.remove(&token) {
            let _ = self.poll.registry().deregister(&mut channel.stream);
            emit.result(&channel.tracker, result);
        }
    }

    fn on_idle(&mut self, emit: &mut Emitter<'_>) {
        match self.config.idle_policy {
            IdlePolicy::Abandon => {
                debug!(
                    pending = self.pending(),
                    timeout = ?self.config.idle_timeout,
                    "no tracker activity, abandoning pending trackers"
                );
            }
            IdlePolicy::ReportTimeout => {
                for (_, mut session) in self.udp.sessions.drain() {
                    if let Transition::Finished(result) = session.time_out() {
                        emit.result(session.tracker(), result);
                    }
                }
                let tokens: Vec<Token> = self.http.keys().copied().collect();
                for token in tokens {
                    if let Some(mut channel) = self.http.remove(&token) {
                        let _ = self.poll.registry().deregister(&mut channel.stream);
                        emit.tracker_error(&channel.tracker, TrackerError::Timeout);
                    }
                }
            }
        }
    }
}

impl Drop for Reactor<'_> {
    fn drop(&mut self) {
        let registry = self.poll.registry();
        if self.udp.registered.is_some() {
            let _ = registry.deregister(&mut self.udp.socket);
        }
        for (_, mut channel) in self.http.drain() {
            let _ = registry.deregister(&mut channel.stream);
        }
        trace!(abandoned = self.udp.sessions.len(), "reactor closed");
    }
}

fn clone_io(e: &io::Error) -> io::Error {
    io::Error::new(e.kind(), e.to_string())
}
