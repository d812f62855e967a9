/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Error types for the FixLink initiator.
//!
//! Only [`ConfigError`] and [`RuntimeError`] cross the public boundary of the
//! initiator. [`TransportError`] and [`SessionError`] describe per-session
//! failures that are always absorbed by the reconnect loop of the owning
//! supervisor.

use crate::types::SessionId;
use thiserror::Error;

/// Result type alias using [`InitiatorError`] as the error type.
pub type Result<T> = std::result::Result<T, InitiatorError>;

/// Top-level error returned by the initiator control operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitiatorError {
    /// Invalid or missing session settings.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Unexpected internal failure.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl InitiatorError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a runtime error.
    #[must_use]
    pub const fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }
}

/// Errors in the per-session configuration.
///
/// Never retried: the caller must fix the settings and build a new initiator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The initiator has no sessions configured.
    #[error("no sessions defined for initiator")]
    NoSessions,

    /// Two configured sessions share the same identity.
    #[error("duplicate session: {session}")]
    DuplicateSession {
        /// The repeated identity.
        session: SessionId,
    },

    /// A required setting is absent.
    #[error("missing setting {setting} for session {session}")]
    MissingSetting {
        /// Session the setting belongs to, as far as it could be determined.
        session: String,
        /// Settings key.
        setting: &'static str,
    },

    /// A setting is present but its value is unusable.
    #[error("invalid setting {setting}={value} for session {session}: {reason}")]
    InvalidSetting {
        /// Session the setting belongs to, as far as it could be determined.
        session: String,
        /// Settings key.
        setting: &'static str,
        /// Offending value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Unexpected internal failures surfaced from `start`, `block` and `poll`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The operation needs a Tokio runtime and none is running.
    #[error("no tokio runtime available for {operation}")]
    NoRuntime {
        /// Operation that needed the runtime.
        operation: &'static str,
    },

    /// The operation belongs to the other drive mode.
    #[error("{operation} is not available in {mode} drive mode")]
    WrongDriveMode {
        /// Operation that was called.
        operation: &'static str,
        /// Drive mode selected at construction.
        mode: &'static str,
    },

    /// The initiator was already stopped and cannot be restarted.
    #[error("initiator already stopped")]
    AlreadyStopped,

    /// A session state transition violated the state machine.
    #[error("invalid state transition for {session}: {from} -> {to}")]
    InvalidTransition {
        /// Session whose state was updated.
        session: SessionId,
        /// State before the update.
        from: String,
        /// Requested state.
        to: String,
    },

    /// The registry has no entry for the session.
    #[error("unknown session: {session}")]
    UnknownSession {
        /// The identity that was looked up.
        session: SessionId,
    },

    /// A supervisor task terminated abnormally.
    #[error("supervisor for {session} panicked")]
    SupervisorPanicked {
        /// Session the supervisor was driving.
        session: SessionId,
    },
}

/// Failures while establishing or using a transport connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connect attempt failed.
    #[error("connect to {addr} failed: {reason}")]
    Connect {
        /// Remote address.
        addr: String,
        /// Underlying error text.
        reason: String,
    },

    /// The connect attempt did not complete in time.
    #[error("connect to {addr} timed out after {timeout_ms} ms")]
    ConnectTimeout {
        /// Remote address.
        addr: String,
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// Framing error on the byte stream.
    #[error("codec error: {0}")]
    Codec(String),

    /// I/O error on an established connection.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failures in the session-level handshake or while serving a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The counterparty answered the Logon with a Logout or a reject.
    #[error("logon rejected: {reason}")]
    LogonRejected {
        /// Text supplied by the counterparty.
        reason: String,
    },

    /// No Logon acknowledgement arrived in time.
    #[error("logon timed out after {timeout_ms} ms")]
    LogonTimeout {
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// A message arrived that the current phase does not allow.
    #[error("unexpected message type {msg_type} during {phase}")]
    UnexpectedMessage {
        /// MsgType (tag 35) of the message.
        msg_type: String,
        /// Phase of the session when it arrived.
        phase: &'static str,
    },

    /// The counterparty stopped answering TestRequests.
    #[error("heartbeat timeout after {elapsed_ms} milliseconds")]
    HeartbeatTimeout {
        /// Elapsed time in milliseconds since the last message.
        elapsed_ms: u64,
    },

    /// Incoming sequence number below the expected value.
    #[error("sequence too low: expected >= {expected}, received {received}")]
    SequenceTooLow {
        /// Minimum expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// The counterparty ended the session with a Logout.
    #[error("logout received: {reason}")]
    LogoutReceived {
        /// Text supplied by the counterparty, possibly empty.
        reason: String,
    },

    /// The operation needs a connected transport.
    #[error("session is not connected")]
    NotConnected,

    /// Transport failure underneath the session.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
