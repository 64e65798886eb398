//! Bounded command queue with send and acknowledgment cursors
//!
//! A fixed ring of slots with three cursors:
//! - `head`: next free slot to write
//! - `send_cursor`: next command to transmit
//! - `ack_cursor`: oldest transmitted command awaiting acknowledgment
//!
//! `ack_cursor` never passes `send_cursor`, which never passes `head`
//! (modulo wraparound). One slot is always kept free so that a full ring can
//! be told apart from an empty one, so a ring of N slots holds N - 1
//! commands. Pushing into a full queue fails; there is no growth.

use printlink_core::LinkError;

/// Default number of ring slots (15 usable)
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Who put a command in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    /// Enqueued by an external caller
    External,
    /// Generated by the engine itself (temperature polls, progress reports)
    Service,
    /// A line of the active print job
    Job {
        /// Bytes of the job file this line accounts for, including skipped
        /// comment and blank lines that preceded it.
        source_bytes: u64,
    },
}

/// One outbound command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    seq: u64,
    line: String,
    origin: CommandOrigin,
}

impl Command {
    /// Sequence number assigned at enqueue time
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The command text, without terminator
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Who enqueued the command
    pub fn origin(&self) -> CommandOrigin {
        self.origin
    }

    /// Bytes this command occupies on the wire, terminator included
    pub fn wire_len(&self) -> usize {
        self.line.len() + super::LINE_TERMINATOR.len()
    }
}

/// Fixed-capacity ring of commands
#[derive(Debug)]
pub struct CommandQueue {
    slots: Box<[Option<Command>]>,
    head: usize,
    send_cursor: usize,
    ack_cursor: usize,
    next_seq: u64,
}

impl CommandQueue {
    /// Create a queue with `capacity` ring slots (`capacity - 1` usable)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            send_cursor: 0,
            ack_cursor: 0,
            next_seq: 0,
        }
    }

    #[inline]
    fn next_slot(&self, index: usize) -> usize {
        let next = index + 1;
        if next >= self.slots.len() {
            0
        } else {
            next
        }
    }

    #[inline]
    fn distance(&self, from: usize, to: usize) -> usize {
        (to + self.slots.len() - from) % self.slots.len()
    }

    /// Number of ring slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Enqueue an external command. Returns false for empty lines or when full.
    pub fn push(&mut self, line: impl Into<String>) -> bool {
        self.push_with_origin(line, CommandOrigin::External).is_ok()
    }

    /// Enqueue a command tagged with its origin
    ///
    /// A trailing line terminator is stripped. Lines that are empty or still
    /// contain a line break are rejected, as is any push into a full queue;
    /// a rejected push leaves the queue untouched.
    pub fn push_with_origin(
        &mut self,
        line: impl Into<String>,
        origin: CommandOrigin,
    ) -> Result<u64, LinkError> {
        let mut line = line.into();
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        if line.is_empty() || line.contains(['\r', '\n']) {
            return Err(LinkError::EmptyCommand);
        }

        let next = self.next_slot(self.head);
        if next == self.ack_cursor {
            return Err(LinkError::QueueFull {
                capacity: self.capacity(),
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots[self.head] = Some(Command { seq, line, origin });
        self.head = next;
        Ok(seq)
    }

    /// The next command to transmit, without consuming it
    pub fn peek_next_to_send(&self) -> Option<&Command> {
        if self.send_cursor == self.head {
            return None;
        }
        self.slots[self.send_cursor].as_ref()
    }

    /// Mark the next command as transmitted and return it
    ///
    /// The command stays in its slot until acknowledged.
    pub fn pop_sent(&mut self) -> Option<&Command> {
        if self.send_cursor == self.head {
            return None;
        }
        let index = self.send_cursor;
        self.send_cursor = self.next_slot(index);
        self.slots[index].as_ref()
    }

    /// Release the oldest transmitted command
    ///
    /// Returns None when nothing is awaiting acknowledgment.
    pub fn pop_acknowledged(&mut self) -> Option<Command> {
        if self.is_ack_empty() {
            return None;
        }
        let index = self.ack_cursor;
        self.ack_cursor = self.next_slot(index);
        self.slots[index].take()
    }

    /// Usable slots left, counted by walking from the ack cursor to head
    pub fn free_slots(&self) -> usize {
        let mut free = self.slots.len() - 1;
        let mut next = self.ack_cursor;
        while next != self.head {
            free -= 1;
            next = self.next_slot(next);
        }
        free
    }

    /// Nothing enqueued and nothing awaiting acknowledgment
    pub fn is_empty(&self) -> bool {
        self.head == self.ack_cursor
    }

    /// Nothing transmitted is awaiting acknowledgment
    pub fn is_ack_empty(&self) -> bool {
        self.ack_cursor == self.send_cursor
    }

    /// Commands enqueued but not yet transmitted
    pub fn pending_send(&self) -> usize {
        self.distance(self.send_cursor, self.head)
    }

    /// Commands transmitted but not yet acknowledged
    pub fn awaiting_ack(&self) -> usize {
        self.distance(self.ack_cursor, self.send_cursor)
    }

    /// Drop every command and collapse all cursors onto the ack cursor
    pub fn clear(&mut self) {
        let mut next = self.ack_cursor;
        while next != self.head {
            self.slots[next] = None;
            next = self.next_slot(next);
        }
        self.head = self.ack_cursor;
        self.send_cursor = self.ack_cursor;
    }

    /// Drop commands not yet transmitted; outstanding ones stay in place
    ///
    /// Returns how many commands were dropped.
    pub fn drop_pending(&mut self) -> usize {
        let dropped = self.pending_send();
        let mut next = self.send_cursor;
        while next != self.head {
            self.slots[next] = None;
            next = self.next_slot(next);
        }
        self.head = self.send_cursor;
        dropped
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_rejects_empty() {
        let mut queue = CommandQueue::default();
        assert!(!queue.push(""));
        assert!(!queue.push("\r\n"));
        assert!(!queue.push("G28\nG29"));
        assert!(queue.is_empty());
        assert_eq!(queue.free_slots(), DEFAULT_QUEUE_CAPACITY - 1);
    }

    #[test]
    fn test_push_strips_terminator() {
        let mut queue = CommandQueue::default();
        assert!(queue.push("M105\r\n"));
        assert_eq!(queue.peek_next_to_send().unwrap().line(), "M105");
        assert_eq!(queue.peek_next_to_send().unwrap().wire_len(), 5);
    }

    #[test]
    fn test_full_queue() {
        let mut queue = CommandQueue::new(4);
        assert!(queue.push("G1 X1"));
        assert!(queue.push("G1 X2"));
        assert!(queue.push("G1 X3"));
        assert_eq!(queue.free_slots(), 0);
        assert_eq!(
            queue.push_with_origin("G1 X4", CommandOrigin::External),
            Err(LinkError::QueueFull { capacity: 4 })
        );

        // Transmitting does not free a slot, acknowledging does
        assert!(queue.pop_sent().is_some());
        assert!(!queue.push("G1 X4"));
        assert!(queue.pop_acknowledged().is_some());
        assert!(queue.push("G1 X4"));
    }

    #[test]
    fn test_cursor_order() {
        let mut queue = CommandQueue::default();
        queue.push("A");
        queue.push("B");

        assert!(queue.pop_acknowledged().is_none());
        assert_eq!(queue.peek_next_to_send().unwrap().line(), "A");
        assert_eq!(queue.pop_sent().unwrap().line(), "A");
        assert_eq!(queue.pending_send(), 1);
        assert_eq!(queue.awaiting_ack(), 1);

        let acked = queue.pop_acknowledged().unwrap();
        assert_eq!(acked.line(), "A");
        assert_eq!(acked.seq(), 0);
        assert!(queue.pop_acknowledged().is_none());

        assert_eq!(queue.pop_sent().unwrap().seq(), 1);
        assert!(queue.pop_sent().is_none());
        assert!(queue.peek_next_to_send().is_none());
    }

    #[test]
    fn test_clear() {
        let mut queue = CommandQueue::new(4);
        queue.push("A");
        queue.push("B");
        queue.pop_sent();
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.is_ack_empty());
        assert_eq!(queue.free_slots(), 3);
        assert!(queue.peek_next_to_send().is_none());
        assert!(queue.pop_acknowledged().is_none());
    }

    #[test]
    fn test_drop_pending_keeps_outstanding() {
        let mut queue = CommandQueue::new(4);
        queue.push("A");
        queue.push("B");
        queue.push("C");
        queue.pop_sent();

        assert_eq!(queue.drop_pending(), 2);
        assert_eq!(queue.pending_send(), 0);
        assert_eq!(queue.awaiting_ack(), 1);
        assert!(queue.peek_next_to_send().is_none());
        assert_eq!(queue.free_slots(), 2);

        assert!(queue.push("D"));
        assert_eq!(queue.pop_acknowledged().unwrap().line(), "A");
        assert_eq!(queue.pop_sent().unwrap().line(), "D");
        assert_eq!(queue.drop_pending(), 0);
    }

    #[test]
    fn test_wraparound() {
        let mut queue = CommandQueue::new(3);
        for i in 0..10 {
            assert!(queue.push(format!("G1 X{}", i)));
            assert_eq!(queue.pop_sent().unwrap().line(), format!("G1 X{}", i));
            assert_eq!(
                queue.pop_acknowledged().unwrap().line(),
                format!("G1 X{}", i)
            );
        }
        assert_eq!(queue.free_slots(), 2);
    }
}
