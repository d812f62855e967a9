/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Common utilities shared across examples.

#![allow(dead_code)]

use async_trait::async_trait;
use fixlink_core::message::Message;
use fixlink_core::types::SessionId;
use fixlink_initiator::{Application, RejectReason};
use fixlink_session::config::SessionConfig;
use std::env;
use std::time::Duration;
use tracing::info;

/// Default counterparty port.
pub const DEFAULT_PORT: u16 = 9876;

/// Default counterparty host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Example configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ExampleConfig {
    /// Counterparty hostname.
    pub host: String,
    /// Counterparty port.
    pub port: u16,
    /// Sender CompID.
    pub sender_comp_id: String,
    /// Target CompID.
    pub target_comp_id: String,
    /// Seconds between reconnect attempts.
    pub reconnect_interval: u64,
    /// How long to run before stopping, in seconds.
    pub run_for: u64,
}

impl ExampleConfig {
    /// Reads `FIX_HOST`, `FIX_PORT`, `FIX_SENDER`, `FIX_TARGET`,
    /// `FIX_RECONNECT` and `FIX_RUN_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            host: env::var("FIX_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env_number("FIX_PORT").unwrap_or(DEFAULT_PORT),
            sender_comp_id: env::var("FIX_SENDER").unwrap_or_else(|_| "CLIENT".to_string()),
            target_comp_id: env::var("FIX_TARGET").unwrap_or_else(|_| "SERVER".to_string()),
            reconnect_interval: env_number("FIX_RECONNECT").unwrap_or(5),
            run_for: env_number("FIX_RUN_SECS").unwrap_or(30),
        }
    }

    /// Builds the session configuration for `target_comp_id` on `port`.
    #[must_use]
    pub fn session(&self, target_comp_id: &str, port: u16) -> SessionConfig {
        SessionConfig::new(SessionId::new(
            "FIX.4.4",
            self.sender_comp_id.as_str(),
            target_comp_id,
        ))
        .with_connect_address(self.host.as_str(), port)
        .with_reconnect_interval(Duration::from_secs(self.reconnect_interval))
    }

    /// Returns how long the example runs.
    #[must_use]
    pub const fn run_for(&self) -> Duration {
        Duration::from_secs(self.run_for)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Initializes logging for examples.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

/// Application that logs session events.
#[derive(Debug, Default)]
pub struct LoggingApplication;

#[async_trait]
impl Application for LoggingApplication {
    async fn on_create(&self, session_id: &SessionId) {
        info!(session = %session_id, "session created");
    }

    async fn on_logon(&self, session_id: &SessionId) {
        info!(session = %session_id, "logon");
    }

    async fn on_logout(&self, session_id: &SessionId) {
        info!(session = %session_id, "logout");
    }

    async fn from_app(&self, message: &Message, session_id: &SessionId) -> Result<(), RejectReason> {
        info!(session = %session_id, msg_type = %message.msg_type(), fields = message.len(), "application message");
        Ok(())
    }
}
