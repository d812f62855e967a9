/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # FixLink Core
//!
//! Core types, messages, and error definitions for the FixLink initiator.
//!
//! This crate provides the building blocks shared by every FixLink crate:
//! - **Error types**: Configuration, runtime, transport and session errors with `thiserror`
//! - **Session identity**: [`SessionId`], the registry key for a logical session
//! - **Messages**: [`Message`] and [`MsgType`] for the session-level admin flow
//! - **Core types**: [`SeqNum`] and [`Timestamp`]

pub mod error;
pub mod message;
pub mod types;

pub use error::{
    ConfigError, InitiatorError, Result, RuntimeError, SessionError, TransportError,
};
pub use message::{Message, MsgType, tags};
pub use types::{SeqNum, SessionId, Timestamp};
