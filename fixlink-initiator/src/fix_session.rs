/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Default session handle speaking the FIX session protocol.
//!
//! [`FixSession`] frames the transport with [`FrameCodec`] and implements the
//! administrative flow an initiator needs: Logon, Heartbeat and TestRequest
//! handling while logged on, and an acknowledged Logout. Sequence numbers are
//! kept in the handle so they survive reconnects unless the configuration
//! asks for a reset.

use crate::application::Application;
use async_trait::async_trait;
use fixlink_core::error::{SessionError, TransportError};
use fixlink_core::message::{Message, MsgType, tags};
use fixlink_core::types::{SessionId, Timestamp};
use fixlink_session::config::SessionConfig;
use fixlink_session::handle::SessionHandle;
use fixlink_session::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use fixlink_session::sequence::{SeqCheck, SequenceNumbers};
use fixlink_transport::{BoxedStream, CodecError, FrameCodec};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// A FIX session handle driven by a connection supervisor.
pub struct FixSession<A: Application> {
    config: SessionConfig,
    application: Arc<A>,
    sequences: Arc<SequenceNumbers>,
    heartbeat: HeartbeatMonitor,
    framed: Option<Framed<BoxedStream, FrameCodec>>,
    logged_on: bool,
}

impl<A: Application> FixSession<A> {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(config: SessionConfig, application: Arc<A>) -> Self {
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_interval);
        Self {
            config,
            application,
            sequences: Arc::new(SequenceNumbers::new()),
            heartbeat,
            framed: None,
            logged_on: false,
        }
    }

    /// Returns the shared sequence counters.
    #[must_use]
    pub fn sequences(&self) -> Arc<SequenceNumbers> {
        Arc::clone(&self.sequences)
    }

    /// Returns true between an accepted Logon and the end of the session.
    #[must_use]
    pub const fn is_logged_on(&self) -> bool {
        self.logged_on
    }

    /// Builds an outbound message with the standard header, consuming the
    /// next outbound sequence number.
    fn new_message(&self, msg_type: MsgType) -> Message {
        let id = &self.config.session_id;
        let mut message = Message::new(id.begin_string.clone(), msg_type);
        message.push(tags::SENDER_COMP_ID, id.sender_comp_id.clone());
        if let Some(sub_id) = &id.sender_sub_id {
            message.push(tags::SENDER_SUB_ID, sub_id.clone());
        }
        message.push(tags::TARGET_COMP_ID, id.target_comp_id.clone());
        if let Some(sub_id) = &id.target_sub_id {
            message.push(tags::TARGET_SUB_ID, sub_id.clone());
        }
        message.push(
            tags::MSG_SEQ_NUM,
            self.sequences.allocate_sender().to_string(),
        );
        message.push(tags::SENDING_TIME, Timestamp::now().to_fix_string());
        message
    }

    async fn send(&mut self, mut message: Message) -> Result<(), SessionError> {
        if message.msg_type().is_admin() {
            self.application
                .to_admin(&mut message, &self.config.session_id)
                .await;
        }
        let framed = self.framed.as_mut().ok_or(SessionError::NotConnected)?;
        framed.send(message).await.map_err(TransportError::from)?;
        self.heartbeat.on_sent();
        Ok(())
    }

    async fn recv(&mut self) -> Result<Message, SessionError> {
        let framed = self.framed.as_mut().ok_or(SessionError::NotConnected)?;
        let message = frame_result(framed.next().await)?;
        self.heartbeat.on_received();
        Ok(message)
    }

    /// Checks the inbound sequence number.
    ///
    /// Returns `Ok(false)` for a possible duplicate that should be skipped.
    /// Gaps are accepted: resend recovery is not performed.
    fn accept_sequence(&self, message: &Message) -> Result<bool, SessionError> {
        let Some(received) = message.seq_num() else {
            return Ok(true);
        };
        match self.sequences.check_incoming(received) {
            SeqCheck::InOrder => {
                self.sequences.accept_incoming(received);
                Ok(true)
            }
            SeqCheck::Gap { expected, received } => {
                warn!(
                    session = %self.config.session_id,
                    expected,
                    received,
                    "inbound sequence gap"
                );
                self.sequences.accept_incoming(received);
                Ok(true)
            }
            SeqCheck::TooLow { expected, received } => {
                if message.get(tags::POSS_DUP_FLAG) == Some("Y") {
                    debug!(
                        session = %self.config.session_id,
                        received,
                        "ignoring possible duplicate"
                    );
                    Ok(false)
                } else {
                    Err(SessionError::SequenceTooLow { expected, received })
                }
            }
        }
    }

    async fn mark_logged_out(&mut self) {
        if self.logged_on {
            self.logged_on = false;
            self.application.on_logout(&self.config.session_id).await;
        }
    }

    async fn reply_to_test_request(&mut self, request: &Message) -> Result<(), SessionError> {
        let mut heartbeat = self.new_message(MsgType::Heartbeat);
        if let Some(id) = request.get(tags::TEST_REQ_ID) {
            heartbeat.push(tags::TEST_REQ_ID, id);
        }
        self.send(heartbeat).await
    }

    /// Processes one inbound message while logged on.
    ///
    /// Returns `Ok(true)` once the counterparty has logged out.
    async fn handle_inbound(&mut self, message: Message) -> Result<bool, SessionError> {
        if !self.accept_sequence(&message)? {
            return Ok(false);
        }

        let session_id = &self.config.session_id;
        if message.msg_type().is_admin() {
            if let Err(reason) = self.application.from_admin(&message, session_id).await {
                warn!(session = %session_id, code = reason.code, text = %reason.text, "admin message rejected");
            }
        }

        match message.msg_type() {
            MsgType::Heartbeat => {}
            MsgType::TestRequest => self.reply_to_test_request(&message).await?,
            MsgType::Logout => {
                let reason = message.get(tags::TEXT).unwrap_or_default().to_string();
                info!(session = %self.config.session_id, reason = %reason, "counterparty logged out");
                let reply = self.new_message(MsgType::Logout);
                if let Err(e) = self.send(reply).await {
                    debug!(session = %self.config.session_id, error = %e, "logout reply not sent");
                }
                self.mark_logged_out().await;
                return Ok(true);
            }
            MsgType::Logon => {
                warn!(session = %session_id, "ignoring Logon on a logged-on session");
            }
            MsgType::ResendRequest | MsgType::SequenceReset | MsgType::Reject => {
                debug!(session = %session_id, msg_type = %message.msg_type(), "admin message not acted on");
            }
            MsgType::Application(_) => {
                if let Err(reason) = self.application.from_app(&message, session_id).await {
                    warn!(session = %session_id, code = reason.code, text = %reason.text, "application message rejected");
                }
            }
        }
        Ok(false)
    }

    async fn on_heartbeat_deadline(&mut self) -> Result<(), SessionError> {
        match self.heartbeat.poll(Instant::now()) {
            HeartbeatAction::Idle => Ok(()),
            HeartbeatAction::SendHeartbeat => {
                let heartbeat = self.new_message(MsgType::Heartbeat);
                self.send(heartbeat).await
            }
            HeartbeatAction::SendTestRequest(id) => {
                debug!(session = %self.config.session_id, test_req_id = %id, "counterparty silent, sending TestRequest");
                let mut request = self.new_message(MsgType::TestRequest);
                request.push(tags::TEST_REQ_ID, id);
                self.send(request).await
            }
            HeartbeatAction::TimedOut { silent_for } => Err(SessionError::HeartbeatTimeout {
                elapsed_ms: u64::try_from(silent_for.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

fn frame_result(frame: Option<Result<Message, CodecError>>) -> Result<Message, SessionError> {
    match frame {
        Some(Ok(message)) => Ok(message),
        Some(Err(e)) => Err(TransportError::from(e).into()),
        None => Err(TransportError::Closed.into()),
    }
}

impl<A: Application> fmt::Debug for FixSession<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixSession")
            .field("session_id", &self.config.session_id)
            .field("connected", &self.framed.is_some())
            .field("logged_on", &self.logged_on)
            .field("sequences", &self.sequences)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<A: Application> SessionHandle for FixSession<A> {
    fn session_id(&self) -> &SessionId {
        &self.config.session_id
    }

    async fn on_transport_connected(&mut self, stream: BoxedStream) {
        let codec = FrameCodec::new().with_max_message_size(self.config.max_message_size);
        self.framed = Some(Framed::new(stream, codec));
        self.heartbeat.reset();
        debug!(session = %self.config.session_id, "transport attached");
    }

    async fn begin_logon(&mut self) -> Result<(), SessionError> {
        if self.config.reset_on_logon {
            self.sequences.reset();
        }
        self.heartbeat.reset();

        let mut logon = self.new_message(MsgType::Logon);
        logon.push(tags::ENCRYPT_METHOD, "0");
        logon.push(
            tags::HEART_BT_INT,
            self.config.heartbeat_interval.as_secs().to_string(),
        );
        if self.config.reset_on_logon {
            logon.push(tags::RESET_SEQ_NUM_FLAG, "Y");
        }
        self.send(logon).await?;
        debug!(session = %self.config.session_id, "logon sent");

        let reply = self.recv().await?;
        match reply.msg_type() {
            MsgType::Logon => {
                if reply.get(tags::RESET_SEQ_NUM_FLAG) == Some("Y") {
                    if let Some(seq) = reply.seq_num() {
                        self.sequences.accept_incoming(seq);
                    }
                } else {
                    self.accept_sequence(&reply)?;
                }
                if let Err(reason) = self
                    .application
                    .from_admin(&reply, &self.config.session_id)
                    .await
                {
                    return Err(SessionError::LogonRejected {
                        reason: reason.text,
                    });
                }
                self.logged_on = true;
                self.application.on_logon(&self.config.session_id).await;
                Ok(())
            }
            MsgType::Logout => Err(SessionError::LogonRejected {
                reason: reply
                    .get(tags::TEXT)
                    .unwrap_or("logout received during logon")
                    .to_string(),
            }),
            other => Err(SessionError::UnexpectedMessage {
                msg_type: other.as_str().to_string(),
                phase: "logon",
            }),
        }
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        loop {
            let deadline = self.heartbeat.next_deadline();
            let framed = self.framed.as_mut().ok_or(SessionError::NotConnected)?;
            tokio::select! {
                frame = framed.next() => {
                    let message = frame_result(frame)?;
                    self.heartbeat.on_received();
                    if self.handle_inbound(message).await? {
                        return Ok(());
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    self.on_heartbeat_deadline().await?;
                }
            }
        }
    }

    async fn begin_logoff(&mut self) -> Result<(), SessionError> {
        let logout = self.new_message(MsgType::Logout);
        self.send(logout).await?;
        info!(session = %self.config.session_id, "logout sent");

        loop {
            let message = self.recv().await?;
            if !self.accept_sequence(&message)? {
                continue;
            }
            match message.msg_type() {
                MsgType::Logout => {
                    self.mark_logged_out().await;
                    return Ok(());
                }
                MsgType::TestRequest => self.reply_to_test_request(&message).await?,
                _ => {}
            }
        }
    }

    async fn on_transport_lost(&mut self) {
        self.mark_logged_out().await;
        if self.framed.take().is_some() {
            debug!(session = %self.config.session_id, "transport released");
        }
        if self.config.reset_on_disconnect {
            self.sequences.reset();
        }
    }
}
