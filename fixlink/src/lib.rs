/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # FixLink
//!
//! A FIX session initiator for Rust.
//!
//! FixLink keeps a set of outbound FIX sessions connected: each configured
//! session gets a supervisor that connects, logs on, and reconnects after a
//! fixed interval whenever the connection drops, until the initiator is
//! stopped.
//!
//! ## Features
//!
//! - **Two drive modes**: background tasks, or caller-driven polling
//! - **Observable**: thread-safe per-session connection state
//! - **Graceful shutdown**: Logout handshake bounded by a timeout, or forced close
//! - **Async support**: Built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixlink::prelude::*;
//!
//! let initiator = InitiatorBuilder::new()
//!     .with_application(MyApplication)
//!     .add_session(
//!         SessionConfig::new(SessionId::new("FIX.4.4", "CLIENT", "BROKER"))
//!             .with_connect_address("127.0.0.1", 9876),
//!     )
//!     .build();
//!
//! initiator.start().await?;
//! // ...
//! initiator.stop().await;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Identifiers, messages, and error definitions
//! - [`transport`]: Frame codec and TCP connector
//! - [`session`]: Session configuration, state machine, heartbeat and sequences
//! - [`initiator`]: Supervisors, registry, and the initiator itself

pub mod core {
    //! Identifiers, messages, and error definitions.
    pub use fixlink_core::*;
}

pub mod transport {
    //! Frame codec and TCP connector.
    pub use fixlink_transport::*;
}

pub mod session {
    //! Session configuration, state machine, heartbeat and sequences.
    pub use fixlink_session::*;
}

pub mod initiator {
    //! Supervisors, registry, and the initiator itself.
    pub use fixlink_initiator::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use fixlink_core::{
        ConfigError, InitiatorError, Message, MsgType, Result, RuntimeError, SeqNum,
        SessionError, SessionId, Timestamp, TransportError,
    };

    // Transport
    pub use fixlink_transport::{TcpConnector, Transport};

    // Session
    pub use fixlink_session::{ConnectionState, SessionConfig, SessionHandle};

    // Initiator
    pub use fixlink_initiator::{
        Application, DriveMode, Initiator, InitiatorBuilder, NoOpApplication, RejectReason,
        SessionFactory, SessionSnapshot,
    };
}
