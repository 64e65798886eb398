//! Serial port transport
//!
//! Provides the hardware side of the link to a printer controller attached
//! over USB or RS-232.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Re-opening the same port at a different baud rate
//! - A background reader thread that frames replies into lines

use super::line_channel::{line_channel, LineConsumer};
use super::Transport;
use printlink_core::{ConnectionError, Result};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

impl std::fmt::Display for SerialPortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.port_name, self.description)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " [{:04x}:{:04x}]", vid, pid)?;
        }
        Ok(())
    }
}

/// List serial ports a printer controller is likely attached to
///
/// Filters to the usual USB-serial device names:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => Ok(ports
            .iter()
            .filter(|port| is_candidate_port(&port.port_name))
            .map(|port| {
                let info = SerialPortInfo::new(&port.port_name, port_description(port));

                match &port.port_type {
                    serialport::SerialPortType::UsbPort(usb_info) => {
                        let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                        if let Some(ref mfg) = usb_info.manufacturer {
                            info = info.with_manufacturer(mfg);
                        }
                        if let Some(ref serial) = usb_info.serial_number {
                            info = info.with_serial_number(serial);
                        }
                        info
                    }
                    _ => info,
                }
            })
            .collect()),
        Err(e) => {
            error!("Failed to enumerate serial ports: {}", e);
            Err(ConnectionError::Enumeration {
                reason: e.to_string(),
            }
            .into())
        }
    }
}

/// Check if a port name looks like a USB-serial controller
pub fn is_candidate_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Serial transport backed by the `serialport` crate
///
/// Writes go straight to the port. Reads happen on a dedicated thread that
/// frames incoming bytes into lines and hands them over through a
/// [`line_channel`]; [`Transport::read_line`] never blocks.
pub struct SerialTransport {
    port_name: String,
    read_timeout: Duration,
    writer: Option<Box<dyn serialport::SerialPort>>,
    lines: Option<LineConsumer>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Create a closed transport for the named port
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            read_timeout: Duration::from_millis(10),
            writer: None,
            lines: None,
            stop: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Set how long the reader thread blocks per read call
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn stop_reader(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("Reader thread for {} panicked", self.port_name);
            }
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, baud_rate: u32) -> Result<()> {
        self.close()?;

        let failed = |reason: String| ConnectionError::FailedToOpen {
            port: self.port_name.clone(),
            baud: baud_rate,
            reason,
        };

        let port = serialport::new(&self.port_name, baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| {
                warn!("Failed to open serial port {}: {}", self.port_name, e);
                failed(e.to_string())
            })?;
        let mut reader_port = port.try_clone().map_err(|e| failed(e.to_string()))?;

        let (mut producer, consumer) = line_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let name = self.port_name.clone();

        let handle = std::thread::Builder::new()
            .name(format!("printlink-reader:{}", self.port_name))
            .spawn(move || {
                let mut buf = [0u8; 256];
                while !thread_stop.load(Ordering::SeqCst) {
                    match reader_port.read(&mut buf) {
                        Ok(0) => {}
                        Ok(n) => {
                            if !producer.push_bytes(&buf[..n]) {
                                break;
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::TimedOut => {}
                        Err(e) if e.kind() == ErrorKind::Interrupted => {}
                        Err(e) => {
                            error!("Read from {} failed: {}", name, e);
                            break;
                        }
                    }
                }
                debug!("Reader thread for {} stopped", name);
            })
            .map_err(|e| failed(e.to_string()))?;

        info!("Opened {} at {} baud", self.port_name, baud_rate);
        self.writer = Some(port);
        self.lines = Some(consumer);
        self.stop = stop;
        self.reader = Some(handle);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stop_reader();
        self.lines = None;
        if self.writer.take().is_some() {
            info!("Closed {}", self.port_name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let writer = self.writer.as_mut().ok_or(ConnectionError::NotOpen)?;
        let n = writer.write(data).map_err(|e| {
            error!("Write to {} failed: {}", self.port_name, e);
            ConnectionError::WriteFailed {
                reason: e.to_string(),
            }
        })?;
        writer.flush().map_err(|e| ConnectionError::WriteFailed {
            reason: e.to_string(),
        })?;
        Ok(n)
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        match self.lines.as_mut() {
            Some(lines) => lines.try_next_line(),
            None => Err(ConnectionError::NotOpen.into()),
        }
    }

    fn name(&self) -> String {
        self.port_name.clone()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_ports() {
        assert!(is_candidate_port("COM3"));
        assert!(is_candidate_port("/dev/ttyUSB0"));
        assert!(is_candidate_port("/dev/ttyACM1"));
        assert!(is_candidate_port("/dev/cu.usbmodem14101"));
        assert!(!is_candidate_port("COM"));
        assert!(!is_candidate_port("COMX"));
        assert!(!is_candidate_port("/dev/ttyS0"));
    }

    #[test]
    fn test_closed_transport() {
        let mut transport = SerialTransport::new("/dev/ttyUSB9");
        assert!(!transport.is_open());
        assert!(transport.write(b"M105\n").is_err());
        assert!(transport.read_line().is_err());
        assert!(transport.close().is_ok());
        assert_eq!(transport.name(), "/dev/ttyUSB9");
    }

    #[test]
    fn test_port_info_display() {
        let info = SerialPortInfo::new("/dev/ttyUSB0", "USB Serial").with_usb_ids(0x1a86, 0x7523);
        assert_eq!(info.to_string(), "/dev/ttyUSB0 (USB Serial) [1a86:7523]");
    }
}
