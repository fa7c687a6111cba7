use std::collections::VecDeque;
use tutor_protocol::PendingMessage;

/// Insertion-ordered store of captured messages.
///
/// Single owner: the dispatcher loop. Mutation happens only through
/// [`enqueue`](Self::enqueue), [`drain_all`](Self::drain_all) and
/// [`clear`](Self::clear), so a message enqueued while a drain is running
/// lands in the live queue, never in the batch already taken: every message
/// is drained exactly once, in the cycle active at or after its enqueue
/// time.
#[derive(Debug, Default)]
pub struct MessageQueue {
    pending: VecDeque<PendingMessage>,
}

impl MessageQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message; returns the new queue length.
    pub fn enqueue(&mut self, message: PendingMessage) -> usize {
        self.pending.push_back(message);
        self.pending.len()
    }

    /// Atomically take every pending message and reset the queue to empty.
    pub fn drain_all(&mut self) -> Vec<PendingMessage> {
        self.pending.drain(..).collect()
    }

    /// Drop all pending messages; returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
