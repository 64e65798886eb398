//! Serial link engine
//!
//! One [`LinkEngine`] owns one transport and everything derived from the
//! controller's reply stream: link state, capabilities, heater temperatures
//! and the print session. It is driven by [`LinkEngine::tick`], which never
//! blocks; every wait is measured against the `now` passed in.
//!
//! Per tick while connected:
//! 1. read and classify waiting reply lines
//! 2. check the acknowledgment deadline
//! 3. queue service commands, job lines and temperature polls
//! 4. transmit under credit control
//! 5. finish cancels and completed jobs, track keep-alive

use crate::communication::{
    CommandOrigin, FlowControlledSender, SenderConfig, Transport, DEFAULT_QUEUE_CAPACITY,
};
use crate::firmware::handshake::{Handshake, HandshakeConfig, HandshakeStep, DEFAULT_BAUD_RATES};
use crate::firmware::marlin::commands;
use crate::firmware::marlin::{Reply, ResponseClassifier};
use crate::session::{PrintJob, PrintSession};
use printlink_core::{
    Capabilities, EventDispatcher, LinkError, LinkEvent, LinkState, PrintSessionSnapshot,
    PrintState, SessionError, Temperatures, MAX_SUPPORTED_EXTRUDERS,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Reply lines processed per tick before yielding
pub const MAX_LINES_PER_TICK: usize = 64;

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Baud rates tried during the handshake, in order
    pub baud_rates: Vec<u32>,
    /// Capability queries per baud rate
    pub handshake_retries: u32,
    /// Wait per capability query
    pub handshake_timeout: Duration,
    /// Wait for an acknowledgment before the link counts as lost
    pub ack_timeout: Duration,
    /// Silence after which the link is marked idle
    pub keepalive_interval: Duration,
    /// Temperature poll / auto-report interval
    pub temperature_interval: Duration,
    /// Controller receive buffer in bytes, 0 when unknown
    pub rx_buffer_size: usize,
    /// Usable share of the receive buffer
    pub rx_buffer_usage_percent: u8,
    /// Command queue ring slots
    pub queue_capacity: usize,
    /// Upper bound for the reported extruder count
    pub max_extruders: usize,
    /// Free queue slots kept out of reach of job lines
    pub job_slot_reserve: usize,
    /// Controller reset sequence sent on cancel
    pub cancel_commands: Vec<String>,
    /// Telemetry broadcast buffer
    pub event_buffer: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rates: DEFAULT_BAUD_RATES.to_vec(),
            handshake_retries: 1,
            handshake_timeout: Duration::from_secs(3),
            ack_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_millis(2500),
            temperature_interval: Duration::from_secs(2),
            rx_buffer_size: 0,
            rx_buffer_usage_percent: 75,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_extruders: MAX_SUPPORTED_EXTRUDERS,
            job_slot_reserve: 4,
            cancel_commands: commands::default_cancel_sequence(),
            event_buffer: 256,
        }
    }
}

impl LinkConfig {
    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            rx_buffer_size: self.rx_buffer_size,
            rx_buffer_usage_percent: self.rx_buffer_usage_percent,
            ack_timeout: self.ack_timeout,
            keepalive_interval: self.keepalive_interval,
            temperature_interval: self.temperature_interval,
            temperature_command: commands::TEMPERATURE_QUERY.to_string(),
        }
    }

    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig {
            baud_rates: self.baud_rates.clone(),
            retries_per_baud: self.handshake_retries,
            attempt_timeout: self.handshake_timeout,
            max_extruders: self.max_extruders,
        }
    }
}

/// Serial link engine
pub struct LinkEngine<T: Transport> {
    transport: T,
    config: LinkConfig,
    state: LinkState,
    handshake: Handshake,
    sender: FlowControlledSender,
    classifier: ResponseClassifier,
    capabilities: Capabilities,
    temperatures: Temperatures,
    session: PrintSession,
    service_backlog: VecDeque<String>,
    events: EventDispatcher,
}

impl<T: Transport> LinkEngine<T> {
    /// Create an unconnected engine
    pub fn new(transport: T, config: LinkConfig) -> Self {
        Self {
            handshake: Handshake::new(config.handshake_config()),
            sender: FlowControlledSender::new(config.sender_config(), config.queue_capacity),
            session: PrintSession::new(config.cancel_commands.clone()),
            events: EventDispatcher::new(config.event_buffer),
            classifier: ResponseClassifier::default(),
            capabilities: Capabilities::default(),
            temperatures: Temperatures::new(),
            state: LinkState::Unconnected,
            service_backlog: VecDeque::new(),
            transport,
            config,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Subscribe to link telemetry
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    pub fn link_state(&self) -> LinkState {
        self.state
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn temperatures(&self) -> &Temperatures {
        &self.temperatures
    }

    pub fn print_session(&self) -> PrintSessionSnapshot {
        self.session.snapshot()
    }

    /// Commands waiting for transmission or acknowledgment
    pub fn queued_commands(&self) -> usize {
        self.sender.queue().pending_send() + self.sender.queue().awaiting_ack()
    }

    /// Nothing queued, in flight, or waiting to be queued
    pub fn is_drained(&self) -> bool {
        self.sender.queue().is_empty() && self.service_backlog.is_empty()
    }

    /// Whether the link has been silent for longer than the keep-alive interval
    pub fn is_idle(&self) -> bool {
        self.sender.is_idle()
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            debug!("Link state {} -> {}", self.state, state);
            self.state = state;
            self.events.publish(LinkEvent::LinkStateChanged(state));
        }
    }

    fn set_print_state(&mut self, before: PrintState) {
        let after = self.session.state();
        if before != after {
            self.events.publish(LinkEvent::PrintStateChanged(after));
        }
    }

    /// Start a handshake sweep when no link is up
    pub fn connect(&mut self) {
        if matches!(self.state, LinkState::Unconnected | LinkState::Lost) {
            info!("Connecting to {}", self.transport.name());
            self.handshake.start();
            let state = self.handshake.state();
            self.set_state(state);
        }
    }

    /// Drop the current link and start a new handshake sweep
    pub fn reconnect(&mut self) {
        self.disconnect();
        self.connect();
    }

    /// Close the transport and forget everything learned from the controller
    pub fn disconnect(&mut self) {
        if let Err(e) = self.transport.close() {
            warn!("Closing {} failed: {}", self.transport.name(), e);
        }
        self.sender.clear_queue();
        self.service_backlog.clear();
        self.capabilities = Capabilities::default();
        self.classifier.set_extruder_count(1);
        let before = self.session.state();
        self.session.abort();
        self.set_print_state(before);
        self.set_state(LinkState::Unconnected);
    }

    /// Enqueue an external command; false when not connected, empty or full
    pub fn enqueue_command(&mut self, text: &str) -> bool {
        self.try_enqueue(text).is_ok()
    }

    /// Enqueue an external command, returning its sequence number
    pub fn try_enqueue(&mut self, text: &str) -> Result<u64, LinkError> {
        if !self.state.is_connected() {
            return Err(LinkError::NotConnected);
        }
        self.sender.enqueue(text, CommandOrigin::External)
    }

    /// Accept a print job (Idle/Finished -> Uploading)
    pub fn start_print(&mut self, job: PrintJob) -> Result<(), SessionError> {
        let before = self.session.state();
        info!("Starting job {} ({} bytes)", job.name(), job.total_bytes());
        self.session.start(job)?;
        self.set_print_state(before);
        Ok(())
    }

    /// Upload finished; start streaming (Uploading -> Printing)
    pub fn upload_complete(&mut self) -> Result<(), SessionError> {
        let before = self.session.state();
        let announce = self.session.upload_complete(&self.capabilities)?;
        self.service_backlog.extend(announce);
        self.set_print_state(before);
        Ok(())
    }

    pub fn pause_print(&mut self) -> Result<(), SessionError> {
        let before = self.session.state();
        self.session.pause()?;
        self.set_print_state(before);
        Ok(())
    }

    pub fn resume_print(&mut self) -> Result<(), SessionError> {
        let before = self.session.state();
        self.session.resume()?;
        self.set_print_state(before);
        Ok(())
    }

    /// Cancel the job: drop unsent commands and send the reset sequence
    ///
    /// Commands already on the wire keep their credit until the controller
    /// acknowledges them, so the reset sequence waits behind them.
    ///
    /// The session returns to Idle once the reset sequence has been
    /// transmitted, or right away when no link is up.
    pub fn cancel_print(&mut self) -> Result<(), SessionError> {
        let before = self.session.state();
        let reset = self.session.cancel()?;
        info!("Cancelling print");
        self.sender.drop_pending();
        self.service_backlog.clear();
        if self.state.is_connected() {
            self.service_backlog.extend(reset);
        } else {
            self.session.finish_cancel();
        }
        self.set_print_state(before);
        Ok(())
    }

    /// Advance the engine
    ///
    /// Returns `HandshakeFailed` when a sweep ends without an answer and
    /// `LinkLost` or `Transport` when a connected link goes down. A
    /// `ControllerError` reports an `Error:` reply; the link stays up and any
    /// running print has already been cancelled. None of these are fatal;
    /// after a link failure the caller decides whether to
    /// [`connect`](Self::connect) again.
    pub fn tick(&mut self, now: Instant) -> Result<(), LinkError> {
        match self.state {
            LinkState::Unconnected => Ok(()),
            LinkState::Probing { .. } => self.tick_handshake(now),
            LinkState::Connected { .. } => self.tick_connected(now),
            LinkState::Lost => {
                if let Err(e) = self.transport.close() {
                    warn!("Closing {} failed: {}", self.transport.name(), e);
                }
                self.set_state(LinkState::Unconnected);
                Ok(())
            }
        }
    }

    fn tick_handshake(&mut self, now: Instant) -> Result<(), LinkError> {
        let events = &self.events;
        let step = self.handshake.poll(&mut self.transport, now, |line| {
            debug!("<{}", line);
            events.publish(LinkEvent::LineReceived(line.to_string()));
        });

        match step {
            HandshakeStep::Pending => {
                let state = self.handshake.state();
                self.set_state(state);
                Ok(())
            }
            HandshakeStep::Connected {
                baud_rate,
                capabilities,
            } => {
                self.on_connected(baud_rate, capabilities, now);
                Ok(())
            }
            HandshakeStep::Failed { attempts } => {
                if let Err(e) = self.transport.close() {
                    warn!("Closing {} failed: {}", self.transport.name(), e);
                }
                self.set_state(LinkState::Unconnected);
                self.events.publish(LinkEvent::HandshakeFailed);
                Err(LinkError::HandshakeFailed {
                    attempts,
                    bauds: self.config.baud_rates.len(),
                })
            }
        }
    }

    fn on_connected(&mut self, baud_rate: u32, capabilities: Capabilities, now: Instant) {
        info!(
            "Connected to {} at {} baud",
            capabilities.machine_type, baud_rate
        );
        self.classifier.set_extruder_count(capabilities.extruder_count);
        self.sender.reset(now);
        self.service_backlog.clear();
        if capabilities.autoreport_temp {
            let interval = self.config.temperature_interval.as_secs().max(1);
            self.service_backlog
                .push_back(commands::autoreport_temperature(interval));
        }
        self.capabilities = capabilities.clone();
        self.set_state(LinkState::Connected { baud_rate });
        self.events.publish(LinkEvent::Connected {
            baud_rate,
            capabilities,
        });
    }

    fn tick_connected(&mut self, now: Instant) -> Result<(), LinkError> {
        let mut controller_error = None;
        for _ in 0..MAX_LINES_PER_TICK {
            match self.transport.read_line() {
                Ok(Some(line)) => {
                    if let Some(e) = self.handle_line(&line, now) {
                        controller_error.get_or_insert(e);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Reading from {} failed: {}", self.transport.name(), e);
                    self.lose_link();
                    return Err(LinkError::Transport {
                        reason: e.to_string(),
                    });
                }
            }
        }

        if self.sender.ack_timed_out(now) {
            warn!(
                "No acknowledgment from {} within {:?}",
                self.transport.name(),
                self.config.ack_timeout
            );
            self.lose_link();
            return Err(LinkError::LinkLost {
                timeout_ms: self.config.ack_timeout.as_millis() as u64,
            });
        }

        self.flush_service_backlog();
        self.feed_job();
        self.sender.poll_temperature_if_due(now);
        self.sender.query_if_silent(now);

        let sent = match self.sender.transmit_ready(&mut self.transport, now) {
            Ok(sent) => sent,
            Err(e) => {
                error!("Writing to {} failed: {}", self.transport.name(), e);
                self.lose_link();
                return Err(LinkError::Transport {
                    reason: e.to_string(),
                });
            }
        };
        for command in sent {
            if let CommandOrigin::Job { source_bytes } = command.origin() {
                if let Some(report) = self.session.on_line_sent(source_bytes) {
                    self.service_backlog.push_back(report);
                }
            }
            self.events.publish(LinkEvent::LineSent(command.line().to_string()));
        }

        self.settle_session();
        self.sender.check_keepalive(now);
        controller_error.map_or(Ok(()), Err)
    }

    fn handle_line(&mut self, line: &str, now: Instant) -> Option<LinkError> {
        debug!("<{}", line);
        self.sender.on_line_received(now);
        self.events.publish(LinkEvent::LineReceived(line.to_string()));

        let reply = self.classifier.classify(line);
        if let Reply::Temperature { readings, .. } = &reply {
            for reading in readings {
                if !self
                    .temperatures
                    .update(reading.heater, reading.actual, reading.target)
                {
                    debug!("Ignoring reading for unknown heater {}", reading.heater);
                }
            }
        }
        if reply.is_ack() {
            self.on_ack();
        }

        match reply {
            Reply::Error(message) => return Some(self.on_controller_error(message)),
            Reply::Resend(request) => {
                warn!("Controller requested resend: {}", request);
                self.events.publish(LinkEvent::ResendRequested(request));
            }
            Reply::Unclassified(text) => {
                self.events.publish(LinkEvent::Unclassified(text));
            }
            _ => {}
        }
        None
    }

    fn on_ack(&mut self) {
        let Some(command) = self.sender.on_ack() else {
            debug!("Acknowledgment with nothing outstanding");
            return;
        };
        if let Some(interval) = commands::parse_autoreport_interval(command.line()) {
            info!("Temperature auto-report every {}s", interval);
            self.sender.set_autoreport(interval != 0);
        }
    }

    fn on_controller_error(&mut self, message: String) -> LinkError {
        warn!("Controller error: {}", message);
        self.events.publish(LinkEvent::ControllerError(message.clone()));
        if matches!(
            self.session.state(),
            PrintState::Printing | PrintState::Paused
        ) {
            error!("Aborting print after controller error: {}", message);
            if let Err(e) = self.cancel_print() {
                warn!("Could not abort print: {}", e);
            }
        }
        LinkError::ControllerError { message }
    }

    fn lose_link(&mut self) {
        self.sender.clear_queue();
        self.service_backlog.clear();
        let before = self.session.state();
        self.session.abort();
        self.set_print_state(before);
        self.set_state(LinkState::Lost);
        self.events.publish(LinkEvent::LinkLost);
    }

    fn flush_service_backlog(&mut self) {
        while let Some(line) = self.service_backlog.front() {
            match self.sender.enqueue(line.clone(), CommandOrigin::Service) {
                Ok(_) => {
                    self.service_backlog.pop_front();
                }
                Err(LinkError::QueueFull { .. }) => break,
                Err(e) => {
                    warn!("Dropping service command {:?}: {}", line, e);
                    self.service_backlog.pop_front();
                }
            }
        }
    }

    fn feed_job(&mut self) {
        while self.session.state() == PrintState::Printing
            && self.sender.queue().free_slots() > self.config.job_slot_reserve
        {
            let line = match self.session.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Job source failed: {}", e);
                    self.events.publish(LinkEvent::ControllerError(e.to_string()));
                    if let Err(e) = self.cancel_print() {
                        warn!("Could not abort print: {}", e);
                    }
                    break;
                }
            };
            let origin = CommandOrigin::Job {
                source_bytes: line.source_bytes,
            };
            if let Err(e) = self.sender.enqueue(line.command.clone(), origin) {
                warn!("Skipping job line {:?}: {}", line.command, e);
                self.session.skip_line(&line);
            }
        }
    }

    fn settle_session(&mut self) {
        let before = self.session.state();
        match before {
            PrintState::Cancelling => {
                if self.service_backlog.is_empty() && self.sender.queue().pending_send() == 0 {
                    self.session.finish_cancel();
                }
            }
            PrintState::Printing => {
                if self.session.is_end_of_job()
                    && self.sender.queue().is_empty()
                    && self.service_backlog.is_empty()
                {
                    let closing = self.session.finish();
                    self.service_backlog.extend(closing);
                }
            }
            _ => {}
        }
        self.set_print_state(before);
    }
}
