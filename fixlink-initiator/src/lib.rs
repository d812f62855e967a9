/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # FixLink Initiator
//!
//! Supervised outbound FIX sessions with automatic reconnect.
//!
//! This crate provides:
//! - **Initiator**: Owns a supervisor per session, in threaded or polling mode
//! - **Registry**: Thread-safe session lookup and connection state
//! - **FixSession**: Default handle speaking Logon/Heartbeat/Logout
//! - **Application trait**: Callback interface for session events
//! - **Builder API**: Fluent configuration for initiator setup

pub mod application;
pub mod builder;
pub mod factory;
pub mod fix_session;
pub mod initiator;
pub mod registry;
mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use application::{Application, NoOpApplication, RejectReason};
pub use builder::InitiatorBuilder;
pub use factory::{FixSessionFactory, SessionFactory};
pub use fix_session::FixSession;
pub use initiator::{DEFAULT_POLL_STEP, DriveMode, Initiator};
pub use registry::{SessionEntry, SessionRegistry, SessionSnapshot};
