/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! The session initiator.
//!
//! An [`Initiator`] owns one connection supervisor per configured session and
//! a registry every caller can query. It runs in one of two drive modes:
//!
//! - [`DriveMode::Threaded`]: supervisors run as tokio tasks; [`Initiator::block`]
//!   waits until another task calls [`Initiator::stop`].
//! - [`DriveMode::Polling`]: supervisors only make progress inside
//!   [`Initiator::poll`], which the application calls from its own loop.
//!
//! All methods take `&self`, so an initiator is typically shared through an
//! `Arc` between the task that drives it and the task that stops it.

use crate::factory::SessionFactory;
use crate::registry::{SessionRegistry, SessionSnapshot};
use crate::supervisor::{ConnectionSupervisor, Lifecycle};
use fixlink_core::error::{ConfigError, Result, RuntimeError};
use fixlink_core::types::SessionId;
use fixlink_session::config::SessionConfig;
use fixlink_session::state::ConnectionState;
use fixlink_transport::Transport;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Default time budget of one [`Initiator::poll`] call.
pub const DEFAULT_POLL_STEP: Duration = Duration::from_millis(10);

/// Extra time granted to supervisors on top of the logout timeout when
/// stopping.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// How supervisors are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriveMode {
    /// Supervisors run as background tasks.
    #[default]
    Threaded,
    /// Supervisors advance only inside [`Initiator::poll`].
    Polling,
}

impl DriveMode {
    /// Returns the mode name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Threaded => "threaded",
            Self::Polling => "polling",
        }
    }
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type SupervisorTask = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
struct Driver {
    tasks: JoinSet<()>,
    task_sessions: HashMap<tokio::task::Id, SessionId>,
    pending: Vec<SupervisorTask>,
}

/// Drives a set of outbound FIX sessions with automatic reconnect.
pub struct Initiator {
    configs: Vec<SessionConfig>,
    factory: Arc<dyn SessionFactory>,
    transport: Arc<dyn Transport>,
    mode: DriveMode,
    poll_step: Duration,
    registry: Arc<SessionRegistry>,
    lifecycle: watch::Sender<Lifecycle>,
    driver: Mutex<Driver>,
}

impl Initiator {
    pub(crate) fn new(
        configs: Vec<SessionConfig>,
        factory: Arc<dyn SessionFactory>,
        transport: Arc<dyn Transport>,
        mode: DriveMode,
        poll_step: Duration,
    ) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::Idle);
        Self {
            configs,
            factory,
            transport,
            mode,
            poll_step,
            registry: Arc::new(SessionRegistry::new()),
            lifecycle,
            driver: Mutex::new(Driver::default()),
        }
    }

    /// Returns the drive mode chosen at build time.
    #[must_use]
    pub const fn drive_mode(&self) -> DriveMode {
        self.mode
    }

    /// Validates the configuration, creates every session and launches its
    /// supervisor. When already running it only reports a pending supervisor
    /// fault.
    ///
    /// In polling mode supervisors are created but only advance inside
    /// [`poll`](Self::poll).
    ///
    /// # Errors
    /// Returns `ConfigError` for an invalid configuration, with nothing
    /// created. Returns `RuntimeError::NoRuntime` outside a tokio runtime and
    /// `RuntimeError::AlreadyStopped` after [`stop`](Self::stop).
    pub async fn start(&self) -> Result<()> {
        let mut driver = self.driver.lock().await;
        self.launch(&mut driver).await
    }

    /// Starts the initiator and waits until it is stopped.
    ///
    /// # Errors
    /// Returns `RuntimeError::WrongDriveMode` in polling mode, any error from
    /// [`start`](Self::start), or a fault raised by a supervisor while
    /// running.
    pub async fn block(&self) -> Result<()> {
        self.require_mode(DriveMode::Threaded, "block")?;
        let mut lifecycle = self.lifecycle.subscribe();
        self.start().await?;

        debug!("blocking until stopped");
        // The sender lives in `self`, so the channel cannot close here.
        let _ = lifecycle
            .wait_for(|state| *state == Lifecycle::Stopped)
            .await;
        self.surface_fault()
    }

    /// Advances every supervisor for at most one poll step.
    ///
    /// The first call starts the initiator.
    ///
    /// # Returns
    /// `Ok(false)` once the initiator has stopped and there is no further
    /// work, `Ok(true)` otherwise.
    ///
    /// # Errors
    /// Returns `RuntimeError::WrongDriveMode` in threaded mode, any error from
    /// [`start`](Self::start), or a fault raised by a supervisor.
    pub async fn poll(&self) -> Result<bool> {
        self.require_mode(DriveMode::Polling, "poll")?;
        let mut driver = self.driver.lock().await;

        let current = *self.lifecycle.borrow();
        match current {
            Lifecycle::Idle => self.launch(&mut driver).await?,
            Lifecycle::Running => {}
            Lifecycle::Stopping { .. } | Lifecycle::Stopped => {
                self.surface_fault()?;
                return Ok(false);
            }
        }

        drive_pending(&mut driver.pending, self.poll_step).await;
        self.surface_fault()?;
        Ok(true)
    }

    /// Stops all sessions gracefully: each logged-on session sends a Logout
    /// and waits up to its logout timeout for the acknowledgement.
    ///
    /// Idempotent; a stop before start just prevents any later start.
    pub async fn stop(&self) {
        self.stop_with(false).await;
    }

    /// Stops all sessions. With `force` the transports close immediately
    /// without a logout handshake.
    pub async fn stop_with(&self, force: bool) {
        let mut driver = self.driver.lock().await;

        let current = *self.lifecycle.borrow();
        match current {
            Lifecycle::Idle => {
                self.lifecycle.send_replace(Lifecycle::Stopped);
                debug!("initiator stopped before start");
                return;
            }
            Lifecycle::Stopping { .. } | Lifecycle::Stopped => return,
            Lifecycle::Running => {}
        }

        info!(force, "stopping initiator");
        self.lifecycle.send_replace(Lifecycle::Stopping { force });

        let grace = self.stop_grace(force);
        match self.mode {
            DriveMode::Threaded => self.join_supervisors(&mut driver, grace).await,
            DriveMode::Polling => {
                drive_pending(&mut driver.pending, grace).await;
                if !driver.pending.is_empty() {
                    warn!(
                        remaining = driver.pending.len(),
                        "supervisors did not finish in time, dropping"
                    );
                    driver.pending.clear();
                }
            }
        }

        for entry in self.registry.entries() {
            // Supervisors cut short never released their transport.
            if entry.state().has_transport() {
                entry.handle().lock().await.on_transport_lost().await;
            }
            if entry.state() != ConnectionState::Stopping {
                let _ = self
                    .registry
                    .update_state(entry.session_id(), ConnectionState::Stopping);
            }
        }

        self.lifecycle.send_replace(Lifecycle::Stopped);
        info!("initiator stopped");
    }

    /// Returns true once [`stop`](Self::stop) has completed.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.lifecycle.borrow() == Lifecycle::Stopped
    }

    /// Returns the configured session identities in configuration order.
    ///
    /// Once started the list comes from the registry.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionId> {
        if self.registry.is_empty() {
            return self
                .configs
                .iter()
                .map(|config| config.session_id.clone())
                .collect();
        }
        self.registry.session_ids()
    }

    /// Returns true if any session is logged on.
    #[must_use]
    pub fn is_logged_on(&self) -> bool {
        self.registry.is_logged_on()
    }

    /// Returns true if the given session is logged on. Unknown sessions are
    /// reported as not logged on.
    #[must_use]
    pub fn is_session_logged_on(&self, session_id: &SessionId) -> bool {
        self.registry.is_session_logged_on(session_id)
    }

    /// Returns the connection state of one session, or `None` before start
    /// or for an unknown session.
    #[must_use]
    pub fn session_state(&self, session_id: &SessionId) -> Option<ConnectionState> {
        self.registry.state(session_id)
    }

    /// Returns a snapshot of every started session.
    #[must_use]
    pub fn session_states(&self) -> Vec<SessionSnapshot> {
        self.registry.snapshot_all()
    }

    async fn launch(&self, driver: &mut Driver) -> Result<()> {
        let current = *self.lifecycle.borrow();
        match current {
            Lifecycle::Idle => {}
            Lifecycle::Running => return self.surface_fault(),
            Lifecycle::Stopping { .. } | Lifecycle::Stopped => {
                return Err(RuntimeError::AlreadyStopped.into());
            }
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(RuntimeError::NoRuntime { operation: "start" }.into());
        }
        self.validate()?;

        for config in &self.configs {
            let handle = self.factory.create(config).await;
            let entry = self.registry.put(config.session_id.clone(), handle)?;
            let supervisor = ConnectionSupervisor::new(
                config.clone(),
                entry,
                Arc::clone(&self.registry),
                Arc::clone(&self.transport),
                self.lifecycle.subscribe(),
            );
            match self.mode {
                DriveMode::Threaded => {
                    let task = driver.tasks.spawn(supervisor.run());
                    driver
                        .task_sessions
                        .insert(task.id(), config.session_id.clone());
                }
                DriveMode::Polling => driver.pending.push(Box::pin(supervisor.run())),
            }
        }

        self.lifecycle.send_replace(Lifecycle::Running);
        info!(sessions = self.configs.len(), mode = %self.mode, "initiator started");
        Ok(())
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.configs.is_empty() {
            return Err(ConfigError::NoSessions);
        }
        let mut seen = HashSet::new();
        for config in &self.configs {
            config.validate()?;
            if !seen.insert(&config.session_id) {
                return Err(ConfigError::DuplicateSession {
                    session: config.session_id.clone(),
                });
            }
        }
        Ok(())
    }

    fn require_mode(&self, mode: DriveMode, operation: &'static str) -> Result<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(RuntimeError::WrongDriveMode {
                operation,
                mode: self.mode.as_str(),
            }
            .into())
        }
    }

    fn surface_fault(&self) -> Result<()> {
        match self.registry.take_fault() {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    fn stop_grace(&self, force: bool) -> Duration {
        if force {
            return STOP_GRACE;
        }
        self.configs
            .iter()
            .map(|config| config.logout_timeout)
            .max()
            .unwrap_or_default()
            .saturating_add(STOP_GRACE)
    }

    async fn join_supervisors(&self, driver: &mut Driver, grace: Duration) {
        let Driver {
            tasks,
            task_sessions,
            ..
        } = driver;

        let joined = timeout(grace, async {
            while let Some(result) = tasks.join_next_with_id().await {
                if let Err(e) = result {
                    self.report_join_error(task_sessions, &e);
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                remaining = tasks.len(),
                "supervisors did not finish in time, aborting"
            );
            tasks.abort_all();
            while let Some(result) = tasks.join_next_with_id().await {
                if let Err(e) = result {
                    self.report_join_error(task_sessions, &e);
                }
            }
        }
        task_sessions.clear();
    }

    fn report_join_error(&self, task_sessions: &HashMap<tokio::task::Id, SessionId>, e: &JoinError) {
        if !e.is_panic() {
            return;
        }
        if let Some(session) = task_sessions.get(&e.id()) {
            error!(session = %session, "supervisor panicked");
            self.registry.fail(RuntimeError::SupervisorPanicked {
                session: session.clone(),
            });
        }
    }
}

/// Polls the pending supervisors until they all finish or `budget` elapses.
async fn drive_pending(pending: &mut Vec<SupervisorTask>, budget: Duration) {
    if pending.is_empty() {
        return;
    }
    let drive = std::future::poll_fn(|cx| {
        pending.retain_mut(|task| task.as_mut().poll(cx).is_pending());
        if pending.is_empty() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    });
    let _ = timeout(budget, drive).await;
}

impl fmt::Debug for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Initiator")
            .field("sessions", &self.configs.len())
            .field("mode", &self.mode)
            .field("lifecycle", &*self.lifecycle.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::InitiatorBuilder;
    use crate::testing::{Counterparty, EOF, ScriptedTransport, run_counterparty};
    use fixlink_core::error::InitiatorError;
    use parking_lot::Mutex as SyncMutex;
    use tokio::net::TcpListener;

    fn session(target: &str, port: u16) -> SessionConfig {
        SessionConfig::new(SessionId::new("FIX.4.4", "CLIENT", target))
            .with_connect_address("127.0.0.1", port)
            .with_reconnect_interval(Duration::from_secs(1))
            .with_logout_timeout(Duration::from_secs(1))
    }

    fn initiator(transport: &Arc<ScriptedTransport>, sessions: Vec<SessionConfig>) -> Initiator {
        InitiatorBuilder::new()
            .add_sessions(sessions)
            .with_transport(Arc::clone(transport) as Arc<dyn Transport>)
            .build()
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..300 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_sessions_keep_retrying() {
        let transport = Arc::new(ScriptedTransport::new());
        let initiator = initiator(&transport, vec![session("ALPHA", 9101), session("BRAVO", 9102)]);

        initiator.start().await.expect("start");
        tokio::time::sleep(Duration::from_secs(3)).await;

        for port in [9101, 9102] {
            let attempts = transport.attempts(port);
            assert!((2..=9).contains(&attempts), "{attempts} attempts on {port}");
        }
        assert!(!initiator.is_logged_on());
        for snapshot in initiator.session_states() {
            assert_ne!(snapshot.state, ConnectionState::LoggedOn);
            assert!(snapshot.last_error.is_some());
        }

        initiator.stop().await;
        for snapshot in initiator.session_states() {
            assert_eq!(snapshot.state, ConnectionState::Stopping);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_entry_per_session_after_start() {
        let transport = Arc::new(ScriptedTransport::new());
        let configs = vec![session("ALPHA", 9151), session("BRAVO", 9152)];
        let initiator = initiator(&transport, configs.clone());
        assert!(initiator.session_states().is_empty());

        initiator.start().await.expect("start");
        initiator.start().await.expect("second start is a no-op");

        let states = initiator.session_states();
        assert_eq!(states.len(), 2);
        assert_eq!(
            initiator.sessions(),
            configs.iter().map(|c| c.session_id.clone()).collect::<Vec<_>>()
        );
        for (snapshot, config) in states.iter().zip(&configs) {
            assert_eq!(snapshot.session_id, config.session_id);
            assert!(matches!(
                snapshot.state,
                ConnectionState::Disconnected | ConnectionState::Connecting
            ));
        }
        initiator.stop_with(true).await;
    }

    #[tokio::test]
    async fn test_reachable_and_unreachable_sessions() {
        let transport = Arc::new(ScriptedTransport::new().reachable(9201));
        let up = session("ALPHA", 9201);
        let down = session("BRAVO", 9202);
        let initiator = initiator(&transport, vec![up.clone(), down.clone()]);

        initiator.start().await.expect("start");
        wait_until(|| initiator.is_session_logged_on(&up.session_id)).await;

        assert!(initiator.is_logged_on());
        assert!(!initiator.is_session_logged_on(&down.session_id));
        assert_eq!(
            initiator.session_state(&up.session_id),
            Some(ConnectionState::LoggedOn)
        );

        initiator.stop().await;
        assert_eq!(
            initiator.session_state(&up.session_id),
            Some(ConnectionState::Stopping)
        );
        assert_eq!(
            initiator.session_state(&down.session_id),
            Some(ConnectionState::Stopping)
        );
        assert!(!initiator.is_logged_on());
    }

    #[tokio::test]
    async fn test_graceful_stop_logs_out_before_close() {
        let transport = Arc::new(ScriptedTransport::new().reachable(9301));
        let initiator = initiator(&transport, vec![session("ALPHA", 9301)]);

        initiator.start().await.expect("start");
        wait_until(|| initiator.is_logged_on()).await;
        initiator.stop().await;

        wait_until(|| transport.journal().last().is_some_and(|m| m == EOF)).await;
        assert_eq!(transport.journal(), vec!["A", "5", EOF]);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let transport = Arc::new(ScriptedTransport::new().reachable(9401));
        let initiator = initiator(&transport, vec![session("ALPHA", 9401)]);

        initiator.start().await.expect("start");
        wait_until(|| initiator.is_logged_on()).await;

        initiator.stop().await;
        initiator.stop().await;
        initiator.stop_with(true).await;

        assert!(initiator.is_stopped());
        let logouts = transport.journal().iter().filter(|m| *m == "5").count();
        assert_eq!(logouts, 1);
        assert!(matches!(
            initiator.start().await,
            Err(InitiatorError::Runtime(RuntimeError::AlreadyStopped))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_stop_halts_connect_attempts() {
        let transport = Arc::new(ScriptedTransport::new());
        let initiator = initiator(&transport, vec![session("ALPHA", 9501)]);

        initiator.start().await.expect("start");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        initiator.stop_with(true).await;

        let attempts = transport.attempts(9501);
        assert!(attempts >= 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.attempts(9501), attempts);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let transport = Arc::new(ScriptedTransport::new());
        let initiator = initiator(&transport, vec![session("ALPHA", 9601)]);

        initiator.stop().await;
        assert!(initiator.is_stopped());
        assert!(matches!(
            initiator.start().await,
            Err(InitiatorError::Runtime(RuntimeError::AlreadyStopped))
        ));
        assert_eq!(transport.attempts(9601), 0);
    }

    #[tokio::test]
    async fn test_invalid_configuration_creates_nothing() {
        let transport = Arc::new(ScriptedTransport::new());

        let empty = initiator(&transport, Vec::new());
        assert_eq!(
            empty.start().await,
            Err(InitiatorError::Config(ConfigError::NoSessions))
        );

        let duplicate = initiator(&transport, vec![session("ALPHA", 9701), session("ALPHA", 9702)]);
        assert!(matches!(
            duplicate.start().await,
            Err(InitiatorError::Config(ConfigError::DuplicateSession { .. }))
        ));
        assert!(duplicate.session_states().is_empty());

        let unaddressed = SessionConfig::new(SessionId::new("FIX.4.4", "CLIENT", "BRAVO"));
        let missing = initiator(&transport, vec![session("ALPHA", 9703), unaddressed]);
        let result = missing.start().await;
        assert!(result.as_ref().is_err_and(InitiatorError::is_config));
        assert!(missing.session_states().is_empty());

        tokio::task::yield_now().await;
        assert_eq!(transport.attempts(9703), 0);
    }

    #[tokio::test]
    async fn test_unbounded_logout_timeout_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new().reachable(9704));
        let forever = session("ALPHA", 9704).with_logout_timeout(Duration::from_secs(u64::MAX));
        let initiator = initiator(&transport, vec![forever]);

        assert!(matches!(
            initiator.start().await,
            Err(InitiatorError::Config(ConfigError::InvalidSetting {
                setting: "LogoutTimeout",
                ..
            }))
        ));
        assert!(initiator.session_states().is_empty());
        initiator.stop().await;
        assert!(initiator.is_stopped());
    }

    #[tokio::test]
    async fn test_wrong_drive_mode() {
        let threaded = InitiatorBuilder::new().add_session(session("ALPHA", 9801)).build();
        assert_eq!(
            threaded.poll().await,
            Err(InitiatorError::Runtime(RuntimeError::WrongDriveMode {
                operation: "poll",
                mode: "threaded"
            }))
        );

        let polling = InitiatorBuilder::new()
            .add_session(session("ALPHA", 9801))
            .with_drive_mode(DriveMode::Polling)
            .build();
        assert!(matches!(
            polling.block().await,
            Err(InitiatorError::Runtime(RuntimeError::WrongDriveMode { operation: "block", .. }))
        ));
    }

    #[test]
    fn test_start_requires_runtime() {
        let transport = Arc::new(ScriptedTransport::new());
        let initiator = initiator(&transport, vec![session("ALPHA", 9901)]);

        let result = futures::executor::block_on(initiator.start());
        assert_eq!(
            result,
            Err(InitiatorError::Runtime(RuntimeError::NoRuntime {
                operation: "start"
            }))
        );
    }

    #[tokio::test]
    async fn test_polling_mode_advances_only_when_polled() {
        let transport = Arc::new(ScriptedTransport::new().reachable(9902));
        let initiator = InitiatorBuilder::new()
            .add_session(session("ALPHA", 9902))
            .with_transport(Arc::clone(&transport) as Arc<dyn Transport>)
            .with_drive_mode(DriveMode::Polling)
            .build();

        initiator.start().await.expect("start");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.attempts(9902), 0);

        for _ in 0..300 {
            assert!(initiator.poll().await.expect("poll"));
            if initiator.is_logged_on() {
                break;
            }
        }
        assert!(initiator.is_logged_on());

        initiator.stop().await;
        assert!(!initiator.poll().await.expect("poll"));
        assert!(transport.journal().contains(&"5".to_string()));
    }

    #[tokio::test]
    async fn test_block_returns_after_stop() {
        let transport = Arc::new(ScriptedTransport::new().reachable(9903));
        let initiator = Arc::new(initiator(&transport, vec![session("ALPHA", 9903)]));

        let blocked = tokio::spawn({
            let initiator = Arc::clone(&initiator);
            async move { initiator.block().await }
        });
        wait_until(|| initiator.is_logged_on()).await;
        assert!(!blocked.is_finished());

        initiator.stop().await;
        assert_eq!(blocked.await.expect("join"), Ok(()));
    }

    #[tokio::test]
    async fn test_logs_on_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let journal = Arc::new(SyncMutex::new(Vec::new()));
        let counterparty = tokio::spawn({
            let journal = Arc::clone(&journal);
            async move {
                let (stream, _) = listener.accept().await.expect("accept");
                run_counterparty(stream, Counterparty::default(), journal, Default::default()).await;
            }
        });

        let initiator = InitiatorBuilder::new()
            .add_session(session("ALPHA", port))
            .build();
        initiator.start().await.expect("start");
        wait_until(|| initiator.is_logged_on()).await;

        initiator.stop().await;
        counterparty.await.expect("counterparty");
        assert_eq!(*journal.lock(), vec!["A", "5", EOF]);
    }
}
