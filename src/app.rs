//! Command-line front end: port listing and the interactive link loop

use crate::cli::{PortsOpts, RunOpts};
use anyhow::{anyhow, bail, Context};
use printlink_communication::communication::serial::is_candidate_port;
use printlink_communication::{
    list_ports, LinkEngine, PrintJob, SerialTransport, Transport,
};
use printlink_core::{LinkError, LinkEvent, LinkState, PrintState};
use printlink_settings::Config;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Resolve the config file location and load it
///
/// An explicit path must exist; the platform default may be absent.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<(Config, PathBuf)> {
    match path {
        Some(path) => {
            let config = Config::load_from_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            Ok((config, path.to_path_buf()))
        }
        None => {
            let path = Config::default_path()?;
            let config = Config::load_or_default(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            Ok((config, path))
        }
    }
}

/// Apply command-line overrides on top of the loaded configuration
pub fn apply_overrides(config: &mut Config, opts: &RunOpts) -> anyhow::Result<()> {
    if let Some(port) = &opts.port {
        config.link.port = Some(port.clone());
    }
    if let Some(baud) = opts.baud {
        config.link.baud_rates = vec![baud];
    }
    if let Some(rx_buffer) = opts.rx_buffer {
        config.link.rx_buffer_size = rx_buffer;
    }
    config.validate()?;
    Ok(())
}

/// Print the serial ports on stdout
pub fn list(opts: &PortsOpts) -> anyhow::Result<()> {
    let ports = list_ports()?;
    let mut shown = 0;
    for port in ports
        .iter()
        .filter(|p| opts.all || is_candidate_port(&p.port_name))
    {
        println!("{}", port);
        shown += 1;
    }
    if shown == 0 {
        info!("No serial ports found");
    }
    Ok(())
}

/// Write the effective configuration so it can be edited
pub fn init_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    config.save_to_file(path)?;
    println!("{}", path.display());
    Ok(())
}

/// A line typed on the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    /// Forward the line to the controller
    Send(String),
    Pause,
    Resume,
    Cancel,
    Status,
    Quit,
    Ignore,
}

impl ConsoleAction {
    /// Lines starting with `!` control the link; everything else is G-code
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Ignore;
        }
        match line.strip_prefix('!') {
            Some(control) => match control.trim().to_ascii_lowercase().as_str() {
                "pause" => Self::Pause,
                "resume" => Self::Resume,
                "cancel" => Self::Cancel,
                "status" => Self::Status,
                "quit" | "exit" => Self::Quit,
                other => {
                    warn!("Unknown console command !{}", other);
                    Self::Ignore
                }
            },
            None => Self::Send(line.to_string()),
        }
    }
}

/// Connect to the configured port and run until the job ends or Ctrl-C
pub async fn run(config: Config, opts: RunOpts) -> anyhow::Result<()> {
    let port = config
        .link
        .port
        .clone()
        .ok_or_else(|| anyhow!("No serial port given; pass --port or set link.port"))?;

    let job = opts
        .job
        .as_ref()
        .map(PrintJob::from_file)
        .transpose()?;

    let transport = SerialTransport::new(port);
    let mut engine = LinkEngine::new(transport, config.link_config());
    let result = drive(&mut engine, job, &opts).await;
    engine.disconnect();
    result
}

async fn drive<T: Transport>(
    engine: &mut LinkEngine<T>,
    mut job: Option<PrintJob>,
    opts: &RunOpts,
) -> anyhow::Result<()> {
    let mut events = engine.subscribe();
    let mut console = spawn_console_reader();
    let mut console_open = true;
    let mut interrupts = spawn_interrupt_listener();

    let mut ticker = tokio::time::interval(Duration::from_millis(opts.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status = tokio::time::interval(Duration::from_secs(opts.status_secs.max(1)));
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let report_status = opts.status_secs > 0;

    let mut job_started = false;
    engine.connect();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = engine.tick(Instant::now()) {
                    match e {
                        LinkError::HandshakeFailed { .. } => return Err(e.into()),
                        LinkError::ControllerError { .. } => warn!("{}", e),
                        _ if job_started => return Err(e.into()),
                        _ => {
                            warn!("{}; reconnecting", e);
                            engine.connect();
                        }
                    }
                }
                drain_events(&mut events);

                if engine.link_state().is_connected() {
                    if let Some(job) = job.take() {
                        engine.start_print(job)?;
                        engine.upload_complete()?;
                        job_started = true;
                    }
                }

                if job_started {
                    match engine.print_session().state {
                        PrintState::Finished if engine.is_drained() => {
                            info!("Job finished");
                            return Ok(());
                        }
                        PrintState::Idle => bail!("Job cancelled or aborted before completion"),
                        _ => {}
                    }
                }
            }
            _ = status.tick(), if report_status => log_status(engine),
            line = console.recv(), if console_open => match line {
                Some(line) => {
                    if !apply_console(engine, ConsoleAction::parse(&line)) {
                        return Ok(());
                    }
                }
                None => {
                    debug!("Console closed");
                    console_open = false;
                }
            },
            Some(()) = interrupts.recv() => {
                let state = engine.print_session().state;
                if matches!(
                    state,
                    PrintState::Printing | PrintState::Paused | PrintState::Uploading
                ) {
                    info!("Interrupted, cancelling print (press Ctrl-C again to quit)");
                    engine.cancel_print()?;
                } else {
                    info!("Interrupted");
                    return Ok(());
                }
            }
        }
    }
}

/// Returns false when the console asked to quit
fn apply_console<T: Transport>(engine: &mut LinkEngine<T>, action: ConsoleAction) -> bool {
    let outcome = match action {
        ConsoleAction::Send(line) => engine
            .try_enqueue(&line)
            .map(|_| ())
            .map_err(|e| e.to_string()),
        ConsoleAction::Pause => engine.pause_print().map_err(|e| e.to_string()),
        ConsoleAction::Resume => engine.resume_print().map_err(|e| e.to_string()),
        ConsoleAction::Cancel => engine.cancel_print().map_err(|e| e.to_string()),
        ConsoleAction::Status => {
            log_status(engine);
            Ok(())
        }
        ConsoleAction::Quit => return false,
        ConsoleAction::Ignore => Ok(()),
    };
    if let Err(e) = outcome {
        warn!("{}", e);
    }
    true
}

fn drain_events(events: &mut tokio::sync::broadcast::Receiver<LinkEvent>) {
    loop {
        match events.try_recv() {
            Ok(event) => log_event(&event),
            Err(TryRecvError::Lagged(missed)) => debug!("Skipped {} link events", missed),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

fn log_event(event: &LinkEvent) {
    match event {
        LinkEvent::LineSent(_) | LinkEvent::LineReceived(_) => debug!("{}", event),
        LinkEvent::Unclassified(_) | LinkEvent::LinkStateChanged(_) => debug!("{}", event),
        LinkEvent::ControllerError(_) | LinkEvent::HandshakeFailed | LinkEvent::LinkLost => {
            error!("{}", event)
        }
        LinkEvent::ResendRequested(_) => warn!("{}", event),
        LinkEvent::Connected { .. } | LinkEvent::PrintStateChanged(_) => info!("{}", event),
    }
}

fn log_status<T: Transport>(engine: &LinkEngine<T>) {
    if !matches!(engine.link_state(), LinkState::Connected { .. }) {
        info!("Link: {}", engine.link_state());
        return;
    }
    let temperatures = engine.temperatures();
    let tools = temperatures.tools(engine.capabilities().extruder_count as usize);
    let mut summary = String::new();
    for (index, reading) in tools.iter().enumerate() {
        summary.push_str(&format!("T{}:{} ", index, reading));
    }
    summary.push_str(&format!("B:{}", temperatures.bed()));

    let session = engine.print_session();
    match session.state {
        PrintState::Idle => info!("{}", summary),
        state => info!(
            "{} | {} {} {:.1}%",
            summary,
            state,
            session.job_name.as_deref().unwrap_or("-"),
            session.progress_percent()
        ),
    }
}

fn spawn_console_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Reading console failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn spawn_interrupt_listener() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}
