//! Shared test helpers: a scripted in-memory transport

#![allow(dead_code)]

use printlink_communication::{LinkConfig, LinkEngine, Transport};
use printlink_core::{ConnectionError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub const MARLIN_M115: [&str; 5] = [
    "FIRMWARE_NAME:Marlin 2.1.2 (Github) SOURCE_CODE_URL:github.com/MarlinFirmware/Marlin PROTOCOL_VERSION:1.0 MACHINE_TYPE:Ender-3 EXTRUDER_COUNT:1 UUID:cede2a2f-41a2-4748-9b12-c55c62f367ff",
    "Cap:AUTOREPORT_TEMP:0",
    "Cap:PROGRESS:0",
    "Cap:BUILD_PERCENT:0",
    "ok",
];

type Responder = Box<dyn FnMut(&str, u32) -> Vec<String> + Send>;

#[derive(Default)]
struct MockState {
    open_at: Option<u32>,
    opens: Vec<u32>,
    written: Vec<String>,
    replies: VecDeque<String>,
    responder: Option<Responder>,
    fail_reads: bool,
    fail_open: bool,
}

/// In-memory transport; clones share state so tests can inspect it after
/// handing one to the engine.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every written line with whatever `responder` returns
    pub fn with_responder(
        responder: impl FnMut(&str, u32) -> Vec<String> + Send + 'static,
    ) -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().responder = Some(Box::new(responder));
        mock
    }

    /// A controller that answers the capability query at `baud` with `report`
    /// and stays silent otherwise
    pub fn marlin_at(baud: u32, report: &'static [&'static str]) -> Self {
        Self::with_responder(move |line, at| {
            if line == "M115" && at == baud {
                report.iter().map(|s| s.to_string()).collect()
            } else {
                Vec::new()
            }
        })
    }

    pub fn push_reply(&self, line: &str) {
        self.state.lock().unwrap().replies.push_back(line.to_string());
    }

    pub fn written(&self) -> Vec<String> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn take_written(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().unwrap().written)
    }

    pub fn opens(&self) -> Vec<u32> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }
}

impl Transport for MockTransport {
    fn open(&mut self, baud_rate: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.opens.push(baud_rate);
        if state.fail_open {
            return Err(ConnectionError::FailedToOpen {
                port: "mock".to_string(),
                baud: baud_rate,
                reason: "busy".to_string(),
            }
            .into());
        }
        state.open_at = Some(baud_rate);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().open_at = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open_at.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let Some(baud) = state.open_at else {
            return Err(ConnectionError::NotOpen.into());
        };
        let text = String::from_utf8_lossy(data).to_string();
        for line in text.lines() {
            state.written.push(line.to_string());
            if let Some(responder) = state.responder.as_mut() {
                let replies = responder(line, baud);
                state.replies.extend(replies);
            }
        }
        Ok(data.len())
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(ConnectionError::ReaderDisconnected.into());
        }
        Ok(state.replies.pop_front())
    }

    fn name(&self) -> String {
        "mock".to_string()
    }
}

/// Engine connected to a Marlin mock at 115200 baud; the handshake traffic
/// is cleared from the written log.
pub fn connected_engine(
    config: LinkConfig,
    now: Instant,
) -> (LinkEngine<MockTransport>, MockTransport) {
    let mock = MockTransport::marlin_at(115200, &MARLIN_M115);
    let mut engine = LinkEngine::new(mock.clone(), config);
    engine.connect();
    engine.tick(now).unwrap();
    engine.tick(now).unwrap();
    assert!(engine.link_state().is_connected());
    mock.take_written();
    (engine, mock)
}
