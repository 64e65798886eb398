//! Print session
//!
//! Tracks the lifecycle of one print job and its progress:
//!
//! ```text
//! Idle/Finished --start--> Uploading --upload_complete--> Printing
//! Printing --pause--> Paused --resume--> Printing
//! any but Idle --cancel--> Cancelling --reset sent--> Idle
//! Printing --last line acknowledged--> Finished
//! ```
//!
//! Progress counts job bytes handed to the sender, not bytes acknowledged.
//! The session only decides *what* to send; queueing and transmission
//! belong to the engine.

use crate::firmware::marlin::commands;
use chrono::{DateTime, Utc};
use printlink_core::{Capabilities, PrintSessionSnapshot, PrintState, SessionError};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;
use tracing::{debug, info};

/// A G-code job to stream
pub struct PrintJob {
    name: String,
    total_bytes: u64,
    reader: Box<dyn BufRead + Send>,
}

impl PrintJob {
    /// Wrap any buffered reader; `total_bytes` drives the progress figure
    pub fn from_reader(
        name: impl Into<String>,
        total_bytes: u64,
        reader: impl BufRead + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            total_bytes,
            reader: Box::new(reader),
        }
    }

    /// Open a G-code file; the job is named after the file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let source_error = |e: std::io::Error| SessionError::JobSource {
            reason: format!("{}: {}", path.display(), e),
        };
        let file = File::open(path).map_err(source_error)?;
        let total_bytes = file.metadata().map_err(source_error)?.len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_reader(name, total_bytes, BufReader::new(file)))
    }

    /// In-memory job
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let total_bytes = bytes.len() as u64;
        Self::from_reader(name, total_bytes, Cursor::new(bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

impl fmt::Debug for PrintJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrintJob")
            .field("name", &self.name)
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// One executable job line and the source bytes it accounts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLine {
    /// Command text with comments and surrounding whitespace removed
    pub command: String,
    /// Bytes of the job this line covers, including skipped lines before it
    pub source_bytes: u64,
}

/// Strip a `;` comment and surrounding whitespace
pub fn strip_comment(line: &str) -> &str {
    line.split(';').next().unwrap_or_default().trim()
}

/// Print job lifecycle and progress
#[derive(Debug)]
pub struct PrintSession {
    state: PrintState,
    job: Option<PrintJob>,
    job_name: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    bytes_sent: u64,
    total_bytes: u64,
    lines_sent: u64,
    skipped_bytes: u64,
    end_of_job: bool,
    announce_progress: bool,
    report_percent: bool,
    last_percent: Option<u8>,
    cancel_sequence: Vec<String>,
}

impl PrintSession {
    /// Create an idle session; `cancel_sequence` is sent when a job is cancelled
    pub fn new(cancel_sequence: Vec<String>) -> Self {
        Self {
            state: PrintState::Idle,
            job: None,
            job_name: None,
            started_at: None,
            ended_at: None,
            bytes_sent: 0,
            total_bytes: 0,
            lines_sent: 0,
            skipped_bytes: 0,
            end_of_job: false,
            announce_progress: false,
            report_percent: false,
            last_percent: None,
            cancel_sequence,
        }
    }

    pub fn state(&self) -> PrintState {
        self.state
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            current: self.state.to_string(),
        }
    }

    fn set_state(&mut self, state: PrintState) {
        if self.state != state {
            info!("Print state {} -> {}", self.state, state);
            self.state = state;
        }
    }

    /// Accept a job: Idle/Finished -> Uploading
    pub fn start(&mut self, job: PrintJob) -> Result<(), SessionError> {
        if !matches!(self.state, PrintState::Idle | PrintState::Finished) {
            return Err(self.invalid("start"));
        }
        self.job_name = Some(job.name.clone());
        self.total_bytes = job.total_bytes;
        self.job = Some(job);
        self.started_at = None;
        self.ended_at = None;
        self.bytes_sent = 0;
        self.lines_sent = 0;
        self.skipped_bytes = 0;
        self.end_of_job = false;
        self.announce_progress = false;
        self.report_percent = false;
        self.last_percent = None;
        self.set_state(PrintState::Uploading);
        Ok(())
    }

    /// The upload collaborator finished: Uploading -> Printing
    ///
    /// Returns the commands that announce the print to the controller.
    pub fn upload_complete(&mut self, caps: &Capabilities) -> Result<Vec<String>, SessionError> {
        if self.state != PrintState::Uploading {
            return Err(self.invalid("begin printing"));
        }
        self.announce_progress = caps.progress;
        self.report_percent = caps.build_percent;
        self.started_at = Some(Utc::now());
        self.set_state(PrintState::Printing);

        let mut out = Vec::new();
        if self.announce_progress {
            out.push(commands::progress_start());
            if let Some(name) = &self.job_name {
                out.push(commands::progress_filename(name));
            }
        }
        out.push(commands::PRINT_START_MESSAGE.to_string());
        Ok(out)
    }

    /// Printing -> Paused
    pub fn pause(&mut self) -> Result<(), SessionError> {
        if self.state != PrintState::Printing {
            return Err(self.invalid("pause"));
        }
        self.set_state(PrintState::Paused);
        Ok(())
    }

    /// Paused -> Printing
    pub fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != PrintState::Paused {
            return Err(self.invalid("resume"));
        }
        self.set_state(PrintState::Printing);
        Ok(())
    }

    /// Any state but Idle -> Cancelling
    ///
    /// Drops the job and returns the controller reset sequence. The session
    /// stays in Cancelling until [`finish_cancel`](Self::finish_cancel).
    pub fn cancel(&mut self) -> Result<Vec<String>, SessionError> {
        if self.state == PrintState::Idle {
            return Err(self.invalid("cancel"));
        }
        self.job = None;
        self.ended_at = Some(Utc::now());
        self.set_state(PrintState::Cancelling);

        let mut out = self.cancel_sequence.clone();
        if self.announce_progress {
            out.push(commands::progress_stop());
        }
        Ok(out)
    }

    /// The reset sequence went out: Cancelling -> Idle
    pub fn finish_cancel(&mut self) {
        if self.state == PrintState::Cancelling {
            self.set_state(PrintState::Idle);
        }
    }

    /// Drop the job without sending anything, e.g. after link loss
    pub fn abort(&mut self) {
        if self.state != PrintState::Idle {
            self.job = None;
            self.ended_at.get_or_insert_with(Utc::now);
            self.set_state(PrintState::Idle);
        }
    }

    /// Read the next executable job line
    ///
    /// Comment-only and blank lines are skipped; their bytes are carried
    /// into the next returned line. Returns `None` at end of job, at which
    /// point any trailing skipped bytes count as sent.
    pub fn next_line(&mut self) -> Result<Option<JobLine>, SessionError> {
        if self.state != PrintState::Printing || self.end_of_job {
            return Ok(None);
        }
        let Some(job) = self.job.as_mut() else {
            return Ok(None);
        };

        let mut buf = String::new();
        loop {
            buf.clear();
            let n = job
                .reader
                .read_line(&mut buf)
                .map_err(|e| SessionError::JobSource {
                    reason: e.to_string(),
                })? as u64;

            if n == 0 {
                debug!("End of job after {} lines", self.lines_sent);
                self.end_of_job = true;
                self.bytes_sent += std::mem::take(&mut self.skipped_bytes);
                return Ok(None);
            }

            let command = strip_comment(&buf);
            if command.is_empty() {
                self.skipped_bytes += n;
                continue;
            }
            return Ok(Some(JobLine {
                command: command.to_string(),
                source_bytes: n + std::mem::take(&mut self.skipped_bytes),
            }));
        }
    }

    /// A job line could not be queued; its bytes still count as progress
    pub fn skip_line(&mut self, line: &JobLine) {
        self.skipped_bytes += line.source_bytes;
    }

    /// A job line was transmitted
    ///
    /// Returns a build-percent report when the integer percentage changed
    /// and the controller accepts them.
    pub fn on_line_sent(&mut self, source_bytes: u64) -> Option<String> {
        self.bytes_sent += source_bytes;
        self.lines_sent += 1;
        if !self.report_percent || self.state != PrintState::Printing {
            return None;
        }
        let percent = self.snapshot().progress_percent() as u8;
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(commands::build_percent(percent))
    }

    /// Whether every job line has been read
    pub fn is_end_of_job(&self) -> bool {
        self.end_of_job
    }

    /// Printing -> Finished, once the engine has drained every acknowledgment
    ///
    /// Returns the commands that close the print on the controller.
    pub fn finish(&mut self) -> Vec<String> {
        if self.state != PrintState::Printing || !self.end_of_job {
            return Vec::new();
        }
        self.job = None;
        self.ended_at = Some(Utc::now());
        self.set_state(PrintState::Finished);
        info!(
            "Job {} finished: {} lines, {} bytes",
            self.job_name.as_deref().unwrap_or("?"),
            self.lines_sent,
            self.bytes_sent
        );

        let mut out = Vec::new();
        if self.announce_progress {
            out.push(commands::progress_stop());
        }
        if self.report_percent && self.last_percent != Some(100) {
            out.push(commands::build_percent(100));
        }
        out
    }

    /// Read-only view of the session
    pub fn snapshot(&self) -> PrintSessionSnapshot {
        let elapsed_secs = self.started_at.map(|start| {
            let end = self.ended_at.unwrap_or_else(Utc::now);
            (end - start).num_seconds().max(0) as u64
        });
        PrintSessionSnapshot {
            state: self.state,
            job_name: self.job_name.clone(),
            started_at: self.started_at,
            elapsed_secs,
            bytes_sent: self.bytes_sent,
            total_bytes: self.total_bytes,
            lines_sent: self.lines_sent,
        }
    }
}

impl Default for PrintSession {
    fn default() -> Self {
        Self::new(commands::default_cancel_sequence())
    }
}
