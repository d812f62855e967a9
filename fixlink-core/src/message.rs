/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Owned FIX messages for the session-level flow.
//!
//! The initiator only needs to build and inspect administrative messages
//! (Logon, Logout, Heartbeat, TestRequest), so a message is a MsgType plus an
//! ordered list of body fields. Header framing fields (8, 9, 10) are added and
//! stripped by the transport codec.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Well-known tag numbers used by the session layer.
pub mod tags {
    /// BeginString.
    pub const BEGIN_STRING: u32 = 8;
    /// BodyLength.
    pub const BODY_LENGTH: u32 = 9;
    /// CheckSum.
    pub const CHECK_SUM: u32 = 10;
    /// MsgSeqNum.
    pub const MSG_SEQ_NUM: u32 = 34;
    /// MsgType.
    pub const MSG_TYPE: u32 = 35;
    /// PossDupFlag.
    pub const POSS_DUP_FLAG: u32 = 43;
    /// SenderCompID.
    pub const SENDER_COMP_ID: u32 = 49;
    /// SenderSubID.
    pub const SENDER_SUB_ID: u32 = 50;
    /// SendingTime.
    pub const SENDING_TIME: u32 = 52;
    /// TargetCompID.
    pub const TARGET_COMP_ID: u32 = 56;
    /// TargetSubID.
    pub const TARGET_SUB_ID: u32 = 57;
    /// Text.
    pub const TEXT: u32 = 58;
    /// EncryptMethod.
    pub const ENCRYPT_METHOD: u32 = 98;
    /// HeartBtInt.
    pub const HEART_BT_INT: u32 = 108;
    /// TestReqID.
    pub const TEST_REQ_ID: u32 = 112;
    /// ResetSeqNumFlag.
    pub const RESET_SEQ_NUM_FLAG: u32 = 141;
}

/// FIX message type (tag 35).
///
/// Administrative types are named; everything else is carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    /// Heartbeat (0).
    Heartbeat,
    /// Test Request (1).
    TestRequest,
    /// Resend Request (2).
    ResendRequest,
    /// Reject (3).
    Reject,
    /// Sequence Reset (4).
    SequenceReset,
    /// Logout (5).
    Logout,
    /// Logon (A).
    Logon,
    /// Any application-level message type.
    Application(String),
}

impl MsgType {
    /// Returns the wire value of the message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::Logon => "A",
            Self::Application(value) => value,
        }
    }

    /// Returns true for session-level message types.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        !matches!(self, Self::Application(_))
    }
}

impl From<&str> for MsgType {
    fn from(value: &str) -> Self {
        match value {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "A" => Self::Logon,
            other => Self::Application(other.to_string()),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An owned FIX message without its framing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    begin_string: String,
    msg_type: MsgType,
    fields: SmallVec<[(u32, String); 12]>,
}

impl Message {
    /// Creates an empty message of the given type.
    #[must_use]
    pub fn new(begin_string: impl Into<String>, msg_type: MsgType) -> Self {
        Self {
            begin_string: begin_string.into(),
            msg_type,
            fields: SmallVec::new(),
        }
    }

    /// Appends a field and returns the message.
    #[must_use]
    pub fn with_field(mut self, tag: u32, value: impl Into<String>) -> Self {
        self.push(tag, value);
        self
    }

    /// Appends a field.
    pub fn push(&mut self, tag: u32, value: impl Into<String>) {
        self.fields.push((tag, value.into()));
    }

    /// Replaces the first occurrence of `tag`, or appends it.
    pub fn set(&mut self, tag: u32, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((tag, value)),
        }
    }

    /// Returns the BeginString.
    #[must_use]
    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }

    /// Returns the message type.
    #[must_use]
    pub const fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Returns the first value of `tag`.
    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first value of `tag` parsed as an unsigned integer.
    #[must_use]
    pub fn get_u64(&self, tag: u32) -> Option<u64> {
        self.get(tag).and_then(|v| v.parse().ok())
    }

    /// Returns the MsgSeqNum (tag 34), if present and numeric.
    #[must_use]
    pub fn seq_num(&self) -> Option<u64> {
        self.get_u64(tags::MSG_SEQ_NUM)
    }

    /// Iterates over the body fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (u32, &str)> {
        self.fields.iter().map(|(t, v)| (*t, v.as_str()))
    }

    /// Returns the number of body fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the message carries no body fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
