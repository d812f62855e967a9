/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Sequence number bookkeeping.
//!
//! A session keeps its sequence numbers across reconnects, so they live in
//! the session handle rather than in the connection. The counters are atomic
//! so the application can read them through a shared reference while the
//! supervisor drives the session.

use fixlink_core::types::SeqNum;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of checking an inbound MsgSeqNum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqCheck {
    /// The expected number.
    InOrder,
    /// Higher than expected; messages were missed.
    Gap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// Lower than expected.
    TooLow {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
}

/// Outbound and inbound sequence counters for one session.
#[derive(Debug)]
pub struct SequenceNumbers {
    next_sender: AtomicU64,
    next_target: AtomicU64,
}

impl SequenceNumbers {
    /// Creates counters starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_initial(1, 1)
    }

    /// Creates counters starting at the given values.
    #[must_use]
    pub const fn with_initial(sender: u64, target: u64) -> Self {
        Self {
            next_sender: AtomicU64::new(sender),
            next_target: AtomicU64::new(target),
        }
    }

    /// Returns the next outbound number without consuming it.
    #[must_use]
    pub fn next_sender(&self) -> SeqNum {
        SeqNum::new(self.next_sender.load(Ordering::SeqCst))
    }

    /// Returns the next expected inbound number.
    #[must_use]
    pub fn next_target(&self) -> SeqNum {
        SeqNum::new(self.next_target.load(Ordering::SeqCst))
    }

    /// Consumes and returns the next outbound number.
    pub fn allocate_sender(&self) -> SeqNum {
        SeqNum::new(self.next_sender.fetch_add(1, Ordering::SeqCst))
    }

    /// Compares an inbound number with the expected one.
    #[must_use]
    pub fn check_incoming(&self, received: u64) -> SeqCheck {
        let expected = self.next_target.load(Ordering::SeqCst);
        match received.cmp(&expected) {
            std::cmp::Ordering::Equal => SeqCheck::InOrder,
            std::cmp::Ordering::Greater => SeqCheck::Gap { expected, received },
            std::cmp::Ordering::Less => SeqCheck::TooLow { expected, received },
        }
    }

    /// Records `received` as processed; the next expected number follows it.
    pub fn accept_incoming(&self, received: u64) {
        self.next_target.store(received + 1, Ordering::SeqCst);
    }

    /// Resets both counters to 1.
    pub fn reset(&self) {
        self.next_sender.store(1, Ordering::SeqCst);
        self.next_target.store(1, Ordering::SeqCst);
    }
}

impl Default for SequenceNumbers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sender() {
        let seqs = SequenceNumbers::new();
        assert_eq!(seqs.allocate_sender().value(), 1);
        assert_eq!(seqs.allocate_sender().value(), 2);
        assert_eq!(seqs.next_sender().value(), 3);
    }

    #[test]
    fn test_check_incoming() {
        let seqs = SequenceNumbers::with_initial(1, 5);
        assert_eq!(seqs.check_incoming(5), SeqCheck::InOrder);
        assert_eq!(
            seqs.check_incoming(8),
            SeqCheck::Gap {
                expected: 5,
                received: 8
            }
        );
        assert_eq!(
            seqs.check_incoming(2),
            SeqCheck::TooLow {
                expected: 5,
                received: 2
            }
        );

        seqs.accept_incoming(8);
        assert_eq!(seqs.next_target().value(), 9);
    }

    #[test]
    fn test_reset() {
        let seqs = SequenceNumbers::with_initial(40, 17);
        seqs.reset();
        assert_eq!(seqs.next_sender().value(), 1);
        assert_eq!(seqs.next_target().value(), 1);
    }
}
