/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Per-session connection supervisor.
//!
//! A supervisor owns the reconnect loop for exactly one session:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> LoggedOn
//!      ^              |             |            |
//!      +--------------+-------------+------------+   (after ReconnectInterval)
//! ```
//!
//! Every state change goes through the registry. The loop ends when the
//! initiator broadcasts a stop, leaving the session in `Stopping`.

use crate::registry::{SessionEntry, SessionRegistry};
use fixlink_core::error::{RuntimeError, SessionError, TransportError};
use fixlink_session::config::SessionConfig;
use fixlink_session::handle::SessionHandle;
use fixlink_session::state::ConnectionState;
use fixlink_transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Run state of the initiator, broadcast to every supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Idle,
    Running,
    Stopping { force: bool },
    Stopped,
}

impl Lifecycle {
    pub(crate) const fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping { .. } | Self::Stopped)
    }

    const fn is_forced(&self) -> bool {
        match self {
            Self::Stopping { force } => *force,
            _ => true,
        }
    }
}

/// Waits for a stop request and reports whether it is forced.
///
/// A dropped initiator counts as a forced stop.
async fn stop_requested(lifecycle: &mut watch::Receiver<Lifecycle>) -> bool {
    match lifecycle.wait_for(Lifecycle::is_stopping).await {
        Ok(state) => state.is_forced(),
        Err(_) => true,
    }
}

/// How one connection cycle ended.
enum Cycle {
    /// The connection ended; reconnect after the interval.
    Ended(Option<SessionError>),
    /// A stop was requested.
    Stopped,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Drives one session until the initiator stops.
pub(crate) struct ConnectionSupervisor {
    config: SessionConfig,
    entry: Arc<SessionEntry>,
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn Transport>,
    lifecycle: watch::Receiver<Lifecycle>,
}

impl ConnectionSupervisor {
    pub(crate) fn new(
        config: SessionConfig,
        entry: Arc<SessionEntry>,
        registry: Arc<SessionRegistry>,
        transport: Arc<dyn Transport>,
        lifecycle: watch::Receiver<Lifecycle>,
    ) -> Self {
        Self {
            config,
            entry,
            registry,
            transport,
            lifecycle,
        }
    }

    /// Runs the reconnect loop.
    pub(crate) async fn run(mut self) {
        let session = self.config.session_id.clone();
        info!(session = %session, addr = %self.config.connect_addr(), "supervisor started");

        match self.reconnect_loop().await {
            Ok(()) => {
                if self.set_state(ConnectionState::Stopping).is_ok() {
                    info!(session = %session, "supervisor stopped");
                }
            }
            Err(e) => error!(session = %session, error = %e, "supervisor aborted"),
        }
    }

    async fn reconnect_loop(&mut self) -> Result<(), RuntimeError> {
        let mut first_attempt = true;
        loop {
            if !first_attempt {
                let interval = self.config.reconnect_interval;
                debug!(session = %self.config.session_id, delay_ms = millis(interval), "reconnect scheduled");
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    _ = stop_requested(&mut self.lifecycle) => return Ok(()),
                }
            }
            first_attempt = false;
            if self.lifecycle.borrow().is_stopping() {
                return Ok(());
            }

            match self.connect_cycle().await? {
                Cycle::Stopped => return Ok(()),
                Cycle::Ended(reason) => {
                    match reason {
                        Some(e) => {
                            warn!(session = %self.config.session_id, error = %e, "connection ended");
                            self.entry.record_error(e.to_string());
                        }
                        None => {
                            info!(session = %self.config.session_id, "counterparty ended the session");
                        }
                    }
                    self.set_state(ConnectionState::Disconnected)?;
                }
            }
        }
    }

    /// One attempt: connect, log on, serve until the connection ends.
    async fn connect_cycle(&mut self) -> Result<Cycle, RuntimeError> {
        self.set_state(ConnectionState::Connecting)?;
        let attempt = self.entry.record_attempt();
        let (host, port) = match (&self.config.connect_host, self.config.connect_port) {
            (Some(host), Some(port)) => (host.clone(), port),
            _ => {
                return Ok(Cycle::Ended(Some(SessionError::NotConnected)));
            }
        };
        debug!(session = %self.config.session_id, attempt, host = %host, port, "connecting");

        let connect_timeout = self.config.connect_timeout;
        let stream = tokio::select! {
            result = timeout(connect_timeout, self.transport.connect(&host, port)) => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Ok(Cycle::Ended(Some(e.into()))),
                Err(_) => {
                    return Ok(Cycle::Ended(Some(
                        TransportError::ConnectTimeout {
                            addr: format!("{host}:{port}"),
                            timeout_ms: millis(connect_timeout),
                        }
                        .into(),
                    )));
                }
            },
            _ = stop_requested(&mut self.lifecycle) => return Ok(Cycle::Stopped),
        };

        self.set_state(ConnectionState::Connected)?;
        info!(session = %self.config.session_id, attempt, "transport connected");

        let entry = Arc::clone(&self.entry);
        let mut handle = entry.handle().lock().await;
        handle.on_transport_connected(stream).await;
        let outcome = self.drive(&mut **handle).await;
        handle.on_transport_lost().await;
        outcome
    }

    /// Logs on, serves, and logs off when a graceful stop arrives.
    async fn drive(&mut self, handle: &mut dyn SessionHandle) -> Result<Cycle, RuntimeError> {
        let logon_timeout = self.config.logon_timeout;
        let logon = tokio::select! {
            result = timeout(logon_timeout, handle.begin_logon()) => {
                result.unwrap_or(Err(SessionError::LogonTimeout {
                    timeout_ms: millis(logon_timeout),
                }))
            }
            _ = stop_requested(&mut self.lifecycle) => return Ok(Cycle::Stopped),
        };
        if let Err(e) = logon {
            return Ok(Cycle::Ended(Some(e)));
        }

        self.set_state(ConnectionState::LoggedOn)?;
        info!(session = %self.config.session_id, "logged on");

        let force = tokio::select! {
            result = handle.serve() => return Ok(Cycle::Ended(result.err())),
            force = stop_requested(&mut self.lifecycle) => force,
        };

        if !force {
            let logout_timeout = self.config.logout_timeout;
            match timeout(logout_timeout, handle.begin_logoff()).await {
                Ok(Ok(())) => info!(session = %self.config.session_id, "logged out"),
                Ok(Err(e)) => warn!(session = %self.config.session_id, error = %e, "logout failed"),
                Err(_) => warn!(
                    session = %self.config.session_id,
                    timeout_ms = millis(logout_timeout),
                    "logout not acknowledged, closing"
                ),
            }
        }
        Ok(Cycle::Stopped)
    }

    fn set_state(&self, next: ConnectionState) -> Result<ConnectionState, RuntimeError> {
        self.registry.update_state(&self.config.session_id, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::NoOpApplication;
    use crate::factory::{FixSessionFactory, SessionFactory};
    use crate::testing::{Counterparty, EOF, ScriptedTransport};
    use fixlink_core::message::MsgType;
    use fixlink_core::types::SessionId;

    struct Harness {
        registry: Arc<SessionRegistry>,
        transport: Arc<ScriptedTransport>,
        lifecycle: watch::Sender<Lifecycle>,
        session_id: SessionId,
        task: tokio::task::JoinHandle<()>,
    }

    async fn spawn_supervisor(transport: ScriptedTransport, port: u16) -> Harness {
        let session_id = SessionId::new("FIX.4.4", "CLIENT", "BROKER");
        let config = SessionConfig::new(session_id.clone())
            .with_connect_address("127.0.0.1", port)
            .with_reconnect_interval(Duration::from_secs(1));

        let registry = Arc::new(SessionRegistry::new());
        let handle = FixSessionFactory::new(Arc::new(NoOpApplication))
            .create(&config)
            .await;
        let entry = registry.put(session_id.clone(), handle).expect("new session");

        let transport = Arc::new(transport);
        let (lifecycle, receiver) = watch::channel(Lifecycle::Running);
        let supervisor = ConnectionSupervisor::new(
            config,
            entry,
            Arc::clone(&registry),
            Arc::clone(&transport) as Arc<dyn Transport>,
            receiver,
        );
        let task = tokio::spawn(supervisor.run());

        Harness {
            registry,
            transport,
            lifecycle,
            session_id,
            task,
        }
    }

    async fn wait_for_state(harness: &Harness, state: ConnectionState) {
        for _ in 0..200 {
            if harness.registry.state(&harness.session_id) == Some(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached {state}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_reconnect_interval() {
        let harness = spawn_supervisor(ScriptedTransport::new(), 9001).await;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let times = harness.transport.attempt_times(9001);
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
        let entry = harness.registry.get(&harness.session_id).expect("entry");
        assert_eq!(entry.connect_attempts(), 3);
        assert!(entry.last_error().is_some_and(|e| e.contains("refused")));
        assert_eq!(entry.state(), ConnectionState::Disconnected);

        harness.lifecycle.send_replace(Lifecycle::Stopping { force: true });
        harness.task.await.expect("supervisor");
        assert_eq!(entry.state(), ConnectionState::Stopping);
    }

    #[tokio::test]
    async fn test_logs_on_and_logs_off_gracefully() {
        let transport = ScriptedTransport::new().reachable(9002);
        let harness = spawn_supervisor(transport, 9002).await;

        wait_for_state(&harness, ConnectionState::LoggedOn).await;
        assert!(harness.registry.is_logged_on());

        harness.lifecycle.send_replace(Lifecycle::Stopping { force: false });
        harness.task.await.expect("supervisor");
        assert_eq!(
            harness.registry.state(&harness.session_id),
            Some(ConnectionState::Stopping)
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.transport.journal(), vec!["A", "5", EOF]);
    }

    #[tokio::test]
    async fn test_forced_stop_skips_logout() {
        let transport = ScriptedTransport::new().reachable(9003);
        let harness = spawn_supervisor(transport, 9003).await;

        wait_for_state(&harness, ConnectionState::LoggedOn).await;
        harness.lifecycle.send_replace(Lifecycle::Stopping { force: true });
        harness.task.await.expect("supervisor");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.transport.journal(), vec!["A", EOF]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_logon_reconnects() {
        let transport = ScriptedTransport::new()
            .reachable(9004)
            .with_counterparty(Counterparty {
                ack_logon: false,
                ack_logout: true,
                ..Counterparty::default()
            });
        let harness = spawn_supervisor(transport, 9004).await;

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(harness.transport.attempts(9004), 2);
        let entry = harness.registry.get(&harness.session_id).expect("entry");
        assert!(entry.last_error().is_some_and(|e| e.contains("not authorised")));
        assert!(!harness.registry.is_logged_on());

        harness.lifecycle.send_replace(Lifecycle::Stopping { force: true });
        harness.task.await.expect("supervisor");
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_connection_reconnects_with_same_handle() {
        let transport = ScriptedTransport::new()
            .reachable(9007)
            .with_counterparty(Counterparty {
                drop_after_logon: true,
                ..Counterparty::default()
            });
        let harness = spawn_supervisor(transport, 9007).await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        let entry = harness.registry.get(&harness.session_id).expect("entry");
        assert_eq!(entry.connect_attempts(), 1);
        assert!(entry.last_error().is_some_and(|e| e.contains("closed")));
        assert_eq!(entry.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let times = harness.transport.attempt_times(9007);
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_secs(1));
        assert_eq!(entry.state(), ConnectionState::Disconnected);

        let logons = harness.transport.received(&MsgType::Logon);
        assert_eq!(logons.len(), 2);
        assert_eq!(logons[0].seq_num(), Some(1));
        assert_eq!(logons[1].seq_num(), Some(2));

        harness.lifecycle.send_replace(Lifecycle::Stopping { force: true });
        harness.task.await.expect("supervisor");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_logout_is_bounded() {
        let transport = ScriptedTransport::new()
            .reachable(9005)
            .with_counterparty(Counterparty {
                ack_logon: true,
                ack_logout: false,
                ..Counterparty::default()
            });
        let harness = spawn_supervisor(transport, 9005).await;

        wait_for_state(&harness, ConnectionState::LoggedOn).await;
        harness.lifecycle.send_replace(Lifecycle::Stopping { force: false });
        harness.task.await.expect("supervisor");

        assert_eq!(
            harness.registry.state(&harness.session_id),
            Some(ConnectionState::Stopping)
        );
    }

    #[tokio::test]
    async fn test_dropped_lifecycle_stops_supervisor() {
        let harness = spawn_supervisor(ScriptedTransport::new(), 9006).await;
        drop(harness.lifecycle);

        harness.task.await.expect("supervisor");
        assert_eq!(
            harness.registry.state(&harness.session_id),
            Some(ConnectionState::Stopping)
        );
    }
}
