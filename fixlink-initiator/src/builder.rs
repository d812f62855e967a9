/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Initiator builder for fluent configuration.
//!
//! This module provides a builder API for configuring an [`Initiator`].
//! Session configurations are checked when the initiator starts, not here.

use crate::application::{Application, NoOpApplication};
use crate::factory::{FixSessionFactory, SessionFactory};
use crate::initiator::{DEFAULT_POLL_STEP, DriveMode, Initiator};
use fixlink_session::config::SessionConfig;
use fixlink_transport::{TcpConnector, Transport};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring an initiator.
pub struct InitiatorBuilder<A: Application = NoOpApplication> {
    /// Application callback handler.
    application: Arc<A>,
    /// Session configurations.
    sessions: Vec<SessionConfig>,
    /// Transport override; TCP when unset.
    transport: Option<Arc<dyn Transport>>,
    /// Session factory override; [`FixSessionFactory`] when unset.
    factory: Option<Arc<dyn SessionFactory>>,
    /// How supervisors are driven.
    drive_mode: DriveMode,
    /// Time budget of one poll in polling mode.
    poll_step: Duration,
}

impl Default for InitiatorBuilder<NoOpApplication> {
    fn default() -> Self {
        Self::new()
    }
}

impl InitiatorBuilder<NoOpApplication> {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            application: Arc::new(NoOpApplication),
            sessions: Vec::new(),
            transport: None,
            factory: None,
            drive_mode: DriveMode::default(),
            poll_step: DEFAULT_POLL_STEP,
        }
    }
}

impl<A: Application + 'static> InitiatorBuilder<A> {
    /// Sets the application callback handler.
    #[must_use]
    pub fn with_application<B: Application>(self, application: B) -> InitiatorBuilder<B> {
        InitiatorBuilder {
            application: Arc::new(application),
            sessions: self.sessions,
            transport: self.transport,
            factory: self.factory,
            drive_mode: self.drive_mode,
            poll_step: self.poll_step,
        }
    }

    /// Adds a session configuration.
    #[must_use]
    pub fn add_session(mut self, config: SessionConfig) -> Self {
        self.sessions.push(config);
        self
    }

    /// Adds several session configurations, keeping their order.
    #[must_use]
    pub fn add_sessions(mut self, configs: impl IntoIterator<Item = SessionConfig>) -> Self {
        self.sessions.extend(configs);
        self
    }

    /// Replaces the TCP transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the default session factory.
    ///
    /// The application handler is then only used by the replacement if it
    /// was built with it.
    #[must_use]
    pub fn with_session_factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Sets the drive mode.
    #[must_use]
    pub const fn with_drive_mode(mut self, mode: DriveMode) -> Self {
        self.drive_mode = mode;
        self
    }

    /// Sets the time budget of one poll in polling mode.
    #[must_use]
    pub const fn with_poll_step(mut self, step: Duration) -> Self {
        self.poll_step = step;
        self
    }

    /// Returns the configured sessions.
    #[must_use]
    pub fn sessions(&self) -> &[SessionConfig] {
        &self.sessions
    }

    /// Returns the drive mode.
    #[must_use]
    pub const fn drive_mode(&self) -> DriveMode {
        self.drive_mode
    }

    /// Returns the poll step.
    #[must_use]
    pub const fn poll_step(&self) -> Duration {
        self.poll_step
    }

    /// Returns the application handler.
    #[must_use]
    pub fn application(&self) -> Arc<A> {
        Arc::clone(&self.application)
    }

    /// Builds the initiator. Nothing connects until it is started.
    #[must_use]
    pub fn build(self) -> Initiator {
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(FixSessionFactory::new(self.application)));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(TcpConnector::new()));
        Initiator::new(
            self.sessions,
            factory,
            transport,
            self.drive_mode,
            self.poll_step,
        )
    }
}

impl<A: Application> fmt::Debug for InitiatorBuilder<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitiatorBuilder")
            .field("sessions", &self.sessions)
            .field("custom_transport", &self.transport.is_some())
            .field("custom_factory", &self.factory.is_some())
            .field("drive_mode", &self.drive_mode)
            .field("poll_step", &self.poll_step)
            .finish_non_exhaustive()
    }
}
