/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # FixLink Transport
//!
//! Network transport layer for the FixLink initiator.
//!
//! This crate provides:
//! - **Connector**: The [`Transport`] trait and the TCP implementation
//! - **Codec**: Tokio codec for FIX message framing

pub mod codec;
pub mod connector;

pub use codec::{CodecError, FrameCodec, checksum};
pub use connector::{BoxedStream, DuplexStream, TcpConnector, Transport};
