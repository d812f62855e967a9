/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # FixLink Session
//!
//! Session layer building blocks for the FixLink initiator.
//!
//! This crate provides:
//! - **Configuration**: Per-session settings and their validation
//! - **State machine**: Lock-free connection state with checked transitions
//! - **Handle contract**: The trait a supervisor drives for each session
//! - **Heartbeat handling**: Heartbeat/TestRequest timing
//! - **Sequence management**: Atomic sequence counters that survive reconnects

pub mod config;
pub mod handle;
pub mod heartbeat;
pub mod sequence;
pub mod state;

pub use config::{DEFAULT_RECONNECT_INTERVAL, SessionConfig, settings};
pub use handle::SessionHandle;
pub use heartbeat::{HeartbeatAction, HeartbeatMonitor};
pub use sequence::{SeqCheck, SequenceNumbers};
pub use state::{AtomicConnectionState, ConnectionState};
