use super::error::ScrapeError;
use crate::torrent::Torrent;
use crate::tracker::{SwarmState, TrackerError};

/// Receives the results of an engine run.
///
/// Each tracker of the torrent produces at most one success or tracker error.
/// `on_error` fires at most once, when the run itself cannot proceed.
pub trait ScrapeListener {
    fn on_tracker_success(&mut self, torrent: &dyn Torrent, tracker: &str, state: SwarmState);

    fn on_tracker_error(&mut self, torrent: &dyn Torrent, tracker: &str, cause: TrackerError);

    fn on_error(&mut self, torrent: &dyn Torrent, cause: ScrapeError);
}

/// One listener callback, as a value.
#[derive(Debug)]
pub enum ScrapeEvent {
    TrackerSuccess { tracker: String, state: SwarmState },
    TrackerError { tracker: String, error: TrackerError },
    Error(ScrapeError),
}

impl ScrapeEvent {
    /// The tracker this event is about, `None` for run-level errors.
    pub fn tracker(&self) -> Option<&str> {
        match self {
            ScrapeEvent::TrackerSuccess { tracker, .. }
            | ScrapeEvent::TrackerError { tracker, .. } => Some(tracker),
            ScrapeEvent::Error(_) => None,
        }
    }
}

/// Buffers every event of a run.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<ScrapeEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ScrapeEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ScrapeEvent> {
        self.events
    }

    pub fn successes(&self) -> impl Iterator<Item = (&str, SwarmState)> {
        self.events.iter().filter_map(|e| match e {
            ScrapeEvent::TrackerSuccess { tracker, state } => Some((tracker.as_str(), *state)),
            _ => None,
        })
    }

    pub fn tracker_errors(&self) -> impl Iterator<Item = (&str, &TrackerError)> {
        self.events.iter().filter_map(|e| match e {
            ScrapeEvent::TrackerError { tracker, error } => Some((tracker.as_str(), error)),
            _ => None,
        })
    }

    pub fn fatal(&self) -> Option<&ScrapeError> {
        self.events.iter().find_map(|e| match e {
            ScrapeEvent::Error(error) => Some(error),
            _ => None,
        })
    }
}

impl ScrapeListener for EventCollector {
    fn on_tracker_success(&mut self, _: &dyn Torrent, tracker: &str, state: SwarmState) {
        self.events.push(ScrapeEvent::TrackerSuccess {
            tracker: tracker.to_string(),
            state,
        });
    }

    fn on_tracker_error(&mut self, _: &dyn Torrent, tracker: &str, cause: TrackerError) {
        self.events.push(ScrapeEvent::TrackerError {
            tracker: tracker.to_string(),
            error: cause,
        });
    }

    fn on_error(&mut self, _: &dyn Torrent, cause: ScrapeError) {
        self.events.push(ScrapeEvent::Error(cause));
    }
}

/// Forwards events to an async consumer. Events sent after the receiver
/// went away are dropped.
impl ScrapeListener for tokio::sync::mpsc::UnboundedSender<ScrapeEvent> {
    fn on_tracker_success(&mut self, _: &dyn Torrent, tracker: &str, state: SwarmState) {
        let _ = self.send(ScrapeEvent::TrackerSuccess {
            tracker: tracker.to_string(),
            state,
        });
    }

    fn on_tracker_error(&mut self, _: &dyn Torrent, tracker: &str, cause: TrackerError) {
        let _ = self.send(ScrapeEvent::TrackerError {
            tracker: tracker.to_string(),
            error: cause,
        });
    }

    fn on_error(&mut self, _: &dyn Torrent, cause: ScrapeError) {
        let _ = self.send(ScrapeEvent::Error(cause));
    }
}
