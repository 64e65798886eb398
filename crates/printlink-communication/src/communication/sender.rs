//! Flow-controlled sender
//!
//! Drains the command queue onto the transport without overrunning the
//! controller's receive buffer. Every transmitted command debits its wire
//! length from a [`SendBudget`]; the matching acknowledgment restores it.
//! When the controller's buffer size is unknown the sender falls back to
//! stop-and-wait: one command in flight at a time.
//!
//! The sender also owns the link timers:
//! - acknowledgment timeout (link loss detection)
//! - temperature poll interval
//! - keep-alive idle tracking

use super::command_queue::{Command, CommandOrigin, CommandQueue};
use super::{write_line, Transport};
use printlink_core::{LinkError, Result};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Credit counter of bytes the controller can still absorb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendBudget {
    max: usize,
    credit: usize,
}

impl SendBudget {
    /// Create a full budget. A maximum of 0 means stop-and-wait.
    pub fn new(max: usize) -> Self {
        Self { max, credit: max }
    }

    /// Budget derived from the controller buffer size and the usable share of it
    pub fn from_buffer(rx_buffer_size: usize, usage_percent: u8) -> Self {
        let usage = usage_percent.min(100) as usize;
        Self::new(rx_buffer_size * usage / 100)
    }

    /// Configured maximum
    pub fn max(&self) -> usize {
        self.max
    }

    /// Remaining credit
    pub fn credit(&self) -> usize {
        self.credit
    }

    /// Whether a command of `wire_len` bytes may go out now
    ///
    /// Sending is always allowed when nothing is awaiting acknowledgment, so
    /// a command longer than the whole budget cannot stall the link.
    pub fn can_send(&self, wire_len: usize, awaiting_ack: usize) -> bool {
        if awaiting_ack == 0 {
            return true;
        }
        if self.max == 0 {
            return false;
        }
        self.credit >= wire_len
    }

    /// Account for a transmitted command
    pub fn debit(&mut self, wire_len: usize) {
        self.credit = self.credit.saturating_sub(wire_len);
    }

    /// Account for an acknowledged command; credit never exceeds the maximum
    pub fn restore(&mut self, wire_len: usize) {
        self.credit = (self.credit + wire_len).min(self.max);
    }

    /// Refill to the maximum
    pub fn reset(&mut self) {
        self.credit = self.max;
    }
}

/// Configuration for the flow-controlled sender
#[derive(Debug, Clone, PartialEq)]
pub struct SenderConfig {
    /// Controller receive buffer size in bytes (0 = unknown)
    pub rx_buffer_size: usize,
    /// Share of the receive buffer the sender may fill
    pub rx_buffer_usage_percent: u8,
    /// How long to wait for an acknowledgment before declaring the link lost
    pub ack_timeout: Duration,
    /// Silence after which the link is marked idle
    pub keepalive_interval: Duration,
    /// Interval between temperature polls
    pub temperature_interval: Duration,
    /// Temperature query command
    pub temperature_command: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            rx_buffer_size: 0,
            rx_buffer_usage_percent: 75,
            ack_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_millis(2500),
            temperature_interval: Duration::from_secs(2),
            temperature_command: "M105".to_string(),
        }
    }
}

/// Pipelines queued commands under credit control
#[derive(Debug)]
pub struct FlowControlledSender {
    config: SenderConfig,
    queue: CommandQueue,
    budget: SendBudget,
    ack_deadline: Option<Instant>,
    last_traffic: Option<Instant>,
    next_temperature_poll: Option<Instant>,
    autoreport_enabled: bool,
    idle: bool,
}

impl FlowControlledSender {
    /// Create a sender draining a queue of `queue_capacity` slots
    pub fn new(config: SenderConfig, queue_capacity: usize) -> Self {
        let budget =
            SendBudget::from_buffer(config.rx_buffer_size, config.rx_buffer_usage_percent);
        Self {
            config,
            queue: CommandQueue::new(queue_capacity),
            budget,
            ack_deadline: None,
            last_traffic: None,
            next_temperature_poll: None,
            autoreport_enabled: false,
            idle: false,
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn budget(&self) -> &SendBudget {
        &self.budget
    }

    /// Enqueue a command
    pub fn enqueue(
        &mut self,
        line: impl Into<String>,
        origin: CommandOrigin,
    ) -> std::result::Result<u64, LinkError> {
        self.queue.push_with_origin(line, origin)
    }

    /// Transmit every pending command the budget allows
    ///
    /// Returns the transmitted commands in order.
    pub fn transmit_ready(
        &mut self,
        transport: &mut dyn Transport,
        now: Instant,
    ) -> Result<Vec<Command>> {
        let mut sent = Vec::new();
        while let Some(next) = self.queue.peek_next_to_send() {
            let wire_len = next.wire_len();
            let awaiting = self.queue.awaiting_ack();
            if !self.budget.can_send(wire_len, awaiting) {
                trace!(
                    "Holding {:?}: {} bytes, credit {}",
                    next.line(),
                    wire_len,
                    self.budget.credit()
                );
                break;
            }

            write_line(transport, next.line())?;
            debug!(">{}", next.line());

            if awaiting == 0 {
                self.ack_deadline = Some(now + self.config.ack_timeout);
            }
            self.budget.debit(wire_len);
            self.mark_traffic(now);

            if let Some(command) = self.queue.pop_sent() {
                sent.push(command.clone());
            }
        }
        Ok(sent)
    }

    /// Queue a temperature poll when one is due
    ///
    /// A poll is due when nothing is waiting to be transmitted, the poll
    /// interval has elapsed, and the controller is not reporting
    /// temperatures on its own.
    pub fn poll_temperature_if_due(&mut self, now: Instant) -> bool {
        if self.autoreport_enabled || self.queue.pending_send() > 0 {
            return false;
        }
        let due = self.next_temperature_poll.is_none_or(|at| now >= at);
        if !due {
            return false;
        }
        self.next_temperature_poll = Some(now + self.config.temperature_interval);
        let command = self.config.temperature_command.clone();
        self.queue
            .push_with_origin(command, CommandOrigin::Service)
            .is_ok()
    }

    /// Queue a liveness query after a full ack timeout of silence
    ///
    /// With auto-reported temperatures the host may send nothing for a long
    /// time, so a controller that stops talking would never miss an
    /// acknowledgment. The query puts the ack timer back in charge.
    pub fn query_if_silent(&mut self, now: Instant) -> bool {
        if !self.queue.is_empty() {
            return false;
        }
        let silent = self
            .last_traffic
            .is_some_and(|at| now.saturating_duration_since(at) >= self.config.ack_timeout);
        if !silent {
            return false;
        }
        debug!("No traffic for {:?}, querying controller", self.config.ack_timeout);
        let command = self.config.temperature_command.clone();
        self.queue
            .push_with_origin(command, CommandOrigin::Service)
            .is_ok()
    }

    /// A reply line arrived; it counts as traffic and restarts the ack timer
    pub fn on_line_received(&mut self, now: Instant) {
        self.mark_traffic(now);
        if !self.queue.is_ack_empty() {
            self.ack_deadline = Some(now + self.config.ack_timeout);
        }
    }

    /// The controller acknowledged the oldest outstanding command
    ///
    /// Restores that command's credit and returns it. Acknowledgments with
    /// nothing outstanding are ignored.
    pub fn on_ack(&mut self) -> Option<Command> {
        let command = self.queue.pop_acknowledged()?;
        self.budget.restore(command.wire_len());
        if self.queue.is_ack_empty() {
            self.ack_deadline = None;
        }
        Some(command)
    }

    /// Whether an acknowledgment is overdue
    pub fn ack_timed_out(&self, now: Instant) -> bool {
        self.ack_deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Track liveness: with an empty queue and no traffic for longer than
    /// the keep-alive interval the link is marked idle.
    pub fn check_keepalive(&mut self, now: Instant) -> bool {
        if !self.idle && self.queue.is_empty() {
            let silent = self
                .last_traffic
                .is_none_or(|at| now.duration_since(at) > self.config.keepalive_interval);
            if silent {
                debug!("No traffic for {:?}, link idle", self.config.keepalive_interval);
                self.idle = true;
            }
        }
        self.idle
    }

    /// Whether the link is marked idle
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn autoreport_enabled(&self) -> bool {
        self.autoreport_enabled
    }

    /// Record whether the controller pushes temperatures on its own
    pub fn set_autoreport(&mut self, enabled: bool) {
        self.autoreport_enabled = enabled;
    }

    /// Drop commands not yet transmitted
    ///
    /// Outstanding commands keep their credit and ack deadline; their
    /// acknowledgments still arrive and are matched in order.
    pub fn drop_pending(&mut self) -> usize {
        let dropped = self.queue.drop_pending();
        if dropped > 0 {
            debug!("Dropped {} unsent commands", dropped);
        }
        dropped
    }

    /// Drop queued and outstanding commands and refill the budget
    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.budget.reset();
        self.ack_deadline = None;
    }

    /// Reset everything for a fresh link
    pub fn reset(&mut self, now: Instant) {
        self.clear_queue();
        self.autoreport_enabled = false;
        self.idle = false;
        self.last_traffic = Some(now);
        self.next_temperature_poll = Some(now + self.config.temperature_interval);
    }

    fn mark_traffic(&mut self, now: Instant) {
        self.last_traffic = Some(now);
        self.idle = false;
    }
}
