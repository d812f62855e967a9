/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Session handle contract.
//!
//! A [`SessionHandle`] is the logical session behind one [`SessionId`]. It is
//! built once and reused across reconnects, so whatever it owns (sequence
//! numbers, application state) survives transport loss. Exactly one
//! supervisor drives a handle, calling the methods in this order for every
//! connection:
//!
//! ```text
//! on_transport_connected -> begin_logon -> serve -> [begin_logoff] -> on_transport_lost
//! ```
//!
//! Any step may fail; the supervisor then skips to `on_transport_lost`. The
//! handle reports outcomes through return values and never touches connection
//! state itself.

use async_trait::async_trait;
use fixlink_core::error::SessionError;
use fixlink_core::types::SessionId;
use fixlink_transport::BoxedStream;

/// One logical session driven by its supervisor.
#[async_trait]
pub trait SessionHandle: Send {
    /// Identity of the session.
    fn session_id(&self) -> &SessionId;

    /// Takes ownership of a freshly connected transport.
    async fn on_transport_connected(&mut self, stream: BoxedStream);

    /// Performs the logon handshake on the current transport.
    ///
    /// The supervisor bounds the call with the logon timeout.
    ///
    /// # Errors
    /// Returns `SessionError` if the counterparty rejects the logon or the
    /// transport fails.
    async fn begin_logon(&mut self) -> Result<(), SessionError>;

    /// Services the logged-on session until it ends.
    ///
    /// Must be cancel-safe: the supervisor drops the future when a stop is
    /// requested.
    ///
    /// # Errors
    /// Returns why the session ended; `Ok(())` means an orderly logout
    /// initiated by the counterparty.
    async fn serve(&mut self) -> Result<(), SessionError>;

    /// Performs an orderly logoff on the current transport.
    ///
    /// The supervisor bounds the call with the logout timeout.
    ///
    /// # Errors
    /// Returns `SessionError` if the Logout cannot be sent or acknowledged.
    async fn begin_logoff(&mut self) -> Result<(), SessionError>;

    /// Releases the transport. Called after every connection, successful or
    /// not.
    async fn on_transport_lost(&mut self);
}
