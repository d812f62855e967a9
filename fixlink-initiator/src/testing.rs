/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! In-memory counterparty and scripted transport for tests.

use async_trait::async_trait;
use fixlink_core::error::TransportError;
use fixlink_core::message::{Message, MsgType, tags};
use fixlink_core::types::Timestamp;
use fixlink_transport::{BoxedStream, FrameCodec, Transport};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_util::codec::Framed;

/// Journal entry recorded when the initiator closes the connection.
pub(crate) const EOF: &str = "EOF";

/// A message as the counterparty BROKER would send it to CLIENT.
pub(crate) fn peer_message(msg_type: MsgType, seq: u64) -> Message {
    Message::new("FIX.4.4", msg_type)
        .with_field(tags::SENDER_COMP_ID, "BROKER")
        .with_field(tags::TARGET_COMP_ID, "CLIENT")
        .with_field(tags::MSG_SEQ_NUM, seq.to_string())
        .with_field(tags::SENDING_TIME, Timestamp::now().to_fix_string())
}

/// How the scripted counterparty answers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Counterparty {
    pub ack_logon: bool,
    pub ack_logout: bool,
    /// Close the connection right after acknowledging a Logon.
    pub drop_after_logon: bool,
}

impl Default for Counterparty {
    fn default() -> Self {
        Self {
            ack_logon: true,
            ack_logout: true,
            drop_after_logon: false,
        }
    }
}

/// Shared log of what counterparties received, as MsgType values.
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

/// Shared copy of every message counterparties received.
pub(crate) type Received = Arc<Mutex<Vec<Message>>>;

/// Serves one connection until the initiator closes it.
pub(crate) async fn run_counterparty<S>(
    stream: S,
    behaviour: Counterparty,
    journal: Journal,
    received: Received,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, FrameCodec::new());
    let mut seq = 1;
    while let Some(Ok(message)) = framed.next().await {
        journal.lock().push(message.msg_type().as_str().to_string());
        let drop_now = behaviour.drop_after_logon && *message.msg_type() == MsgType::Logon;
        received.lock().push(message.clone());
        let reply = match message.msg_type() {
            MsgType::Logon if behaviour.ack_logon => {
                Some(peer_message(MsgType::Logon, seq).with_field(tags::RESET_SEQ_NUM_FLAG, "Y"))
            }
            MsgType::Logon => {
                Some(peer_message(MsgType::Logout, seq).with_field(tags::TEXT, "not authorised"))
            }
            MsgType::Logout if behaviour.ack_logout => Some(peer_message(MsgType::Logout, seq)),
            MsgType::TestRequest => {
                let id = message.get(tags::TEST_REQ_ID).unwrap_or_default().to_string();
                Some(peer_message(MsgType::Heartbeat, seq).with_field(tags::TEST_REQ_ID, id))
            }
            _ => None,
        };
        if let Some(reply) = reply {
            seq += 1;
            if framed.send(reply).await.is_err() {
                break;
            }
        }
        if drop_now {
            break;
        }
    }
    journal.lock().push(EOF.to_string());
}

/// Transport whose reachable ports lead to an in-memory counterparty.
///
/// Every other port refuses the connection.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    reachable: HashSet<u16>,
    counterparty: Counterparty,
    attempts: Mutex<HashMap<u16, Vec<Instant>>>,
    journal: Journal,
    received: Received,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reachable(mut self, port: u16) -> Self {
        self.reachable.insert(port);
        self
    }

    pub(crate) fn with_counterparty(mut self, counterparty: Counterparty) -> Self {
        self.counterparty = counterparty;
        self
    }

    pub(crate) fn attempts(&self, port: u16) -> u32 {
        self.attempt_times(port).len() as u32
    }

    pub(crate) fn attempt_times(&self, port: u16) -> Vec<Instant> {
        self.attempts.lock().get(&port).cloned().unwrap_or_default()
    }

    pub(crate) fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    /// Messages received so far with the given MsgType.
    pub(crate) fn received(&self, msg_type: &MsgType) -> Vec<Message> {
        self.received
            .lock()
            .iter()
            .filter(|message| message.msg_type() == msg_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedStream, TransportError> {
        self.attempts.lock().entry(port).or_default().push(Instant::now());
        if !self.reachable.contains(&port) {
            return Err(TransportError::Connect {
                addr: format!("{host}:{port}"),
                reason: "connection refused".to_string(),
            });
        }
        let (local, remote) = tokio::io::duplex(64 * 1024);
        tokio::spawn(run_counterparty(
            remote,
            self.counterparty,
            Arc::clone(&self.journal),
            Arc::clone(&self.received),
        ));
        Ok(Box::new(local))
    }
}
