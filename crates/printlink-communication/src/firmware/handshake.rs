//! Link handshake
//!
//! Discovers the controller's baud rate and capabilities. Each candidate
//! baud rate is tried in order, re-opening the transport at that rate and
//! sending the capability query up to `retries_per_baud` times. An attempt
//! succeeds when the controller answers with:
//! - a capability report followed by `ok`
//! - any temperature or position report
//! - a capability report, when the attempt times out before the `ok`
//!
//! Every line received at one baud rate is accumulated so that multi-line
//! capability reports can be parsed as a whole.

use super::marlin::commands::CAPABILITY_QUERY;
use super::marlin::{parse_capabilities, Reply, ResponseClassifier};
use crate::communication::{write_line, Transport};
use printlink_core::{Capabilities, LinkState, Result, MAX_SUPPORTED_EXTRUDERS};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Reply lines read per poll before yielding
const MAX_LINES_PER_POLL: usize = 64;

/// Candidate baud rates, most common first
pub const DEFAULT_BAUD_RATES: [u32; 3] = [115200, 250000, 57600];

/// Handshake configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeConfig {
    /// Baud rates to try, in order
    pub baud_rates: Vec<u32>,
    /// Capability queries sent per baud rate
    pub retries_per_baud: u32,
    /// How long one attempt waits for an answer
    pub attempt_timeout: Duration,
    /// Upper bound for the reported extruder count
    pub max_extruders: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            baud_rates: DEFAULT_BAUD_RATES.to_vec(),
            retries_per_baud: 1,
            attempt_timeout: Duration::from_secs(3),
            max_extruders: MAX_SUPPORTED_EXTRUDERS,
        }
    }
}

/// Outcome of one handshake poll
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeStep {
    /// Still waiting for an answer
    Pending,
    /// The controller answered
    Connected {
        /// Baud rate the controller answered at
        baud_rate: u32,
        /// Parsed capability report
        capabilities: Capabilities,
    },
    /// Every baud/attempt combination failed
    Failed {
        /// Number of attempts made
        attempts: u32,
    },
}

/// Baud discovery and capability query state machine
#[derive(Debug)]
pub struct Handshake {
    config: HandshakeConfig,
    classifier: ResponseClassifier,
    baud_index: usize,
    attempt: u32,
    attempts_made: u32,
    open_baud: Option<u32>,
    deadline: Option<Instant>,
    transcript: String,
    saw_capabilities: bool,
}

impl Handshake {
    pub fn new(config: HandshakeConfig) -> Self {
        Self {
            config,
            classifier: ResponseClassifier::default(),
            baud_index: 0,
            attempt: 0,
            attempts_made: 0,
            open_baud: None,
            deadline: None,
            transcript: String::new(),
            saw_capabilities: false,
        }
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Restart the sweep from the first baud rate
    pub fn start(&mut self) {
        self.baud_index = 0;
        self.attempt = 0;
        self.attempts_made = 0;
        self.open_baud = None;
        self.deadline = None;
        self.transcript.clear();
        self.saw_capabilities = false;
    }

    /// Where the sweep currently stands
    pub fn state(&self) -> LinkState {
        LinkState::Probing {
            baud_index: self.baud_index,
            attempt: self.attempt,
        }
    }

    /// Attempts made since the last [`start`](Self::start)
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    fn retries(&self) -> u32 {
        self.config.retries_per_baud.max(1)
    }

    /// Advance the handshake
    ///
    /// Starts an attempt when none is running, reads whatever replies are
    /// waiting and checks the attempt deadline. `on_line` sees every line
    /// received.
    pub fn poll(
        &mut self,
        transport: &mut dyn Transport,
        now: Instant,
        mut on_line: impl FnMut(&str),
    ) -> HandshakeStep {
        'attempts: loop {
            let Some(&baud_rate) = self.config.baud_rates.get(self.baud_index) else {
                warn!(
                    "Handshake failed after {} attempts on {}",
                    self.attempts_made,
                    transport.name()
                );
                return HandshakeStep::Failed {
                    attempts: self.attempts_made,
                };
            };

            let Some(deadline) = self.deadline else {
                if let Err(e) = self.begin_attempt(transport, baud_rate, now) {
                    warn!("Probe at {} baud failed: {}", baud_rate, e);
                    self.advance();
                    continue;
                }
                return HandshakeStep::Pending;
            };

            for _ in 0..MAX_LINES_PER_POLL {
                match transport.read_line() {
                    Ok(Some(line)) => {
                        on_line(&line);
                        if self.on_line(&line) {
                            return self.connected(baud_rate);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Read at {} baud failed: {}", baud_rate, e);
                        self.open_baud = None;
                        self.advance();
                        continue 'attempts;
                    }
                }
            }

            if now >= deadline {
                if self.saw_capabilities {
                    return self.connected(baud_rate);
                }
                debug!("No answer at {} baud (attempt {})", baud_rate, self.attempt + 1);
                self.advance();
                continue;
            }

            return HandshakeStep::Pending;
        }
    }

    fn begin_attempt(
        &mut self,
        transport: &mut dyn Transport,
        baud_rate: u32,
        now: Instant,
    ) -> Result<()> {
        self.attempts_made += 1;
        if self.open_baud != Some(baud_rate) || !transport.is_open() {
            self.open_baud = None;
            transport.open(baud_rate)?;
            self.open_baud = Some(baud_rate);
        }
        info!(
            "Probing {} at {} baud (attempt {}/{})",
            transport.name(),
            baud_rate,
            self.attempt + 1,
            self.retries()
        );
        write_line(transport, CAPABILITY_QUERY)?;
        self.deadline = Some(now + self.config.attempt_timeout);
        Ok(())
    }

    /// Record one reply; true when it completes the handshake
    fn on_line(&mut self, line: &str) -> bool {
        self.transcript.push_str(line);
        self.transcript.push('\n');

        match self.classifier.classify(line) {
            Reply::Capability { ack } => {
                self.saw_capabilities = true;
                ack
            }
            Reply::Temperature { .. } | Reply::Position { .. } => true,
            Reply::Ack => self.saw_capabilities,
            _ => false,
        }
    }

    fn advance(&mut self) {
        self.deadline = None;
        self.attempt += 1;
        if self.attempt >= self.retries() {
            self.attempt = 0;
            self.baud_index += 1;
            self.transcript.clear();
            self.saw_capabilities = false;
        }
    }

    fn connected(&mut self, baud_rate: u32) -> HandshakeStep {
        let capabilities = parse_capabilities(&self.transcript, self.config.max_extruders);
        info!(
            "Controller answered at {} baud: {} ({} extruder(s))",
            baud_rate, capabilities.machine_type, capabilities.extruder_count
        );
        self.deadline = None;
        self.transcript.clear();
        self.saw_capabilities = false;
        HandshakeStep::Connected {
            baud_rate,
            capabilities,
        }
    }
}
