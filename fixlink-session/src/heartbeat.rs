/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Heartbeat and TestRequest timing.
//!
//! While a session is logged on it must:
//! - send a Heartbeat when nothing was sent for one interval
//! - send a TestRequest when nothing was received for one interval plus grace
//! - give up when that TestRequest stays unanswered for another interval
//!
//! Times come from `tokio::time` so paused-clock tests drive them.

use std::time::Duration;
use tokio::time::Instant;

/// What the session loop should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing is due.
    Idle,
    /// Send a Heartbeat.
    SendHeartbeat,
    /// Send a TestRequest carrying this TestReqID.
    SendTestRequest(String),
    /// The counterparty went silent.
    TimedOut {
        /// Time since the last inbound message.
        silent_for: Duration,
    },
}

/// Tracks heartbeat deadlines for one connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    last_sent: Instant,
    last_received: Instant,
    pending_test: Option<(String, Instant)>,
    test_counter: u64,
}

impl HeartbeatMonitor {
    /// Creates a monitor whose clocks start now.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval,
            last_sent: now,
            last_received: now,
            pending_test: None,
            test_counter: 0,
        }
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Restarts both clocks and forgets any outstanding TestRequest.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.last_sent = now;
        self.last_received = now;
        self.pending_test = None;
    }

    /// Records an outbound message.
    pub fn on_sent(&mut self) {
        self.last_sent = Instant::now();
    }

    /// Records an inbound message.
    ///
    /// Any inbound traffic proves the peer is alive, so an outstanding
    /// TestRequest is considered answered.
    pub fn on_received(&mut self) {
        self.last_received = Instant::now();
        self.pending_test = None;
    }

    /// Returns the outstanding TestReqID, if any.
    #[must_use]
    pub fn pending_test_request(&self) -> Option<&str> {
        self.pending_test.as_ref().map(|(id, _)| id.as_str())
    }

    /// Decides what is due at `now`, recording a TestRequest if one is issued.
    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        if let Some((_, sent_at)) = &self.pending_test {
            if now.duration_since(*sent_at) >= self.interval {
                return HeartbeatAction::TimedOut {
                    silent_for: now.duration_since(self.last_received),
                };
            }
        } else if now.duration_since(self.last_received) >= self.receive_window() {
            self.test_counter += 1;
            let id = format!("TEST{}", self.test_counter);
            self.pending_test = Some((id.clone(), now));
            self.last_sent = now;
            return HeartbeatAction::SendTestRequest(id);
        }

        if now.duration_since(self.last_sent) >= self.interval {
            return HeartbeatAction::SendHeartbeat;
        }
        HeartbeatAction::Idle
    }

    /// Returns the earliest instant at which [`poll`](Self::poll) may act.
    #[must_use]
    pub fn next_deadline(&self) -> Instant {
        let heartbeat = later(self.last_sent, self.interval);
        let silence = match &self.pending_test {
            Some((_, sent_at)) => later(*sent_at, self.interval),
            None => later(self.last_received, self.receive_window()),
        };
        heartbeat.min(silence)
    }

    fn receive_window(&self) -> Duration {
        self.interval.saturating_add(self.interval / 5)
    }
}

/// `at + by`, clamped to roughly thirty years out.
fn later(at: Instant, by: Duration) -> Instant {
    at.checked_add(by.min(FAR_FUTURE)).unwrap_or(at)
}

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
