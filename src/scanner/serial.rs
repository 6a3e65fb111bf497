use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use crate::scanner::{DeviceLink, RawFrame, ScanError};
/// Line protocol spoken by the scanner firmware.
///
/// The host writes `command` followed by a newline; the device answers with one
/// line of `delimiter`-separated counts, optionally framed by `prompt` characters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireFormat {
    pub command: String,
    /// Field separator; an empty string splits on any whitespace.
    pub delimiter: String,
    /// Characters trimmed from both ends of a reply.
    pub prompt: String,
}
impl Default for WireFormat {
    fn default() -> Self {
        Self {
            command: "scan".into(),
            delimiter: "\t".into(),
            prompt: "> ".into(),
        }
    }
}
impl WireFormat {
    pub fn parse_line(&self, line: &str, channels: usize) -> Result<Vec<f64>, ScanError> {
        let body = line
            .trim_end_matches(&['\r', '\n'][..])
            .trim_matches(|c: char| self.prompt.contains(c));
        let fields: Vec<&str> = if self.delimiter.is_empty() {
            body.split_whitespace().collect()
        } else {
            body.split(self.delimiter.as_str())
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .collect()
        };
        if fields.len() != channels {
            return Err(ScanError::FrameParse {
                reason: format!("expected {channels} fields, got {} in {line:?}", fields.len()),
            });
        }
        fields
            .iter()
            .enumerate()
            .map(|(channel, field)| {
                field.parse::<f64>().map_err(|_| ScanError::FrameParse {
                    reason: format!("channel {channel}: {field:?} is not a number"),
                })
            })
            .collect()
    }
}
/// Everything needed to open the scanner's serial port.
#[derive(Clone, Debug)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub timeout: Duration,
    /// Pause after opening before the start-up banner is discarded.
    pub settle: Duration,
    pub wire: WireFormat,
}
/// Device link backed by a byte transport, normally an open serial port.
pub struct SerialDeviceLink<T = Box<dyn SerialPort>> {
    port_name: String,
    transport: Option<T>,
    wire: WireFormat,
    channels: usize,
    timeout: Duration,
    pending: Vec<u8>,
    /// Requests that timed out and whose reply may still arrive.
    unanswered: u32,
}
impl SerialDeviceLink<Box<dyn SerialPort>> {
    pub fn open(settings: &SerialSettings, channels: usize) -> Result<Self, ScanError> {
        let port = serialport::new(settings.port.as_str(), settings.baud_rate)
            .timeout(settings.timeout)
            .open()
            .map_err(|source| ScanError::PortOpen {
                port: settings.port.clone(),
                source,
            })?;
        info!(
            "opened serial port {} at {} baud",
            settings.port, settings.baud_rate
        );
        let mut link = Self::from_transport(
            settings.port.clone(),
            port,
            settings.wire.clone(),
            channels,
            settings.timeout,
        );
        if !settings.settle.is_zero() {
            thread::sleep(settings.settle);
        }
        link.discard_banner()?;
        Ok(link)
    }
}
impl<T: Read + Write + Send> SerialDeviceLink<T> {
    pub fn from_transport(
        port_name: impl Into<String>,
        transport: T,
        wire: WireFormat,
        channels: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            port_name: port_name.into(),
            transport: Some(transport),
            wire,
            channels,
            timeout,
            pending: Vec::new(),
            unanswered: 0,
        }
    }
    pub fn get_ref(&self) -> Option<&T> {
        self.transport.as_ref()
    }
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }
    /// Consumes the firmware's start-up line; a silent device is fine.
    pub fn discard_banner(&mut self) -> Result<(), ScanError> {
        match self.read_line() {
            Ok(line) => {
                debug!("discarded banner {:?}", line.trim_end());
                Ok(())
            }
            Err(ScanError::LinkTimeout { .. }) | Err(ScanError::FrameParse { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
    fn disconnect(&mut self, reason: String) -> ScanError {
        warn!("serial link {} closed: {reason}", self.port_name);
        self.transport = None;
        self.pending.clear();
        self.unanswered = 0;
        ScanError::LinkDisconnected { reason }
    }
    fn send_command(&mut self) -> Result<(), ScanError> {
        let request = format!("{}\n", self.wire.command);
        let Some(transport) = self.transport.as_mut() else {
            return Err(ScanError::LinkDisconnected {
                reason: format!("{} is not connected", self.port_name),
            });
        };
        let written = transport
            .write_all(request.as_bytes())
            .and_then(|_| transport.flush());
        written.map_err(|e| self.disconnect(e.to_string()))
    }
    /// Drops the late replies of timed-out requests so the next reply
    /// belongs to the next command. A reply that does not show up within
    /// twice the timeout is taken as lost.
    fn resync(&mut self) -> Result<(), ScanError> {
        while self.unanswered > 0 {
            match self.read_line_within(self.timeout * 2) {
                Ok(line) => debug!("dropped late reply {:?}", line.trim_end()),
                Err(ScanError::FrameParse { .. }) => {}
                Err(ScanError::LinkTimeout { .. }) => {
                    debug!("{} late replies never arrived", self.unanswered);
                    self.pending.clear();
                    self.unanswered = 0;
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
            self.unanswered -= 1;
        }
        Ok(())
    }
    fn read_line(&mut self) -> Result<String, ScanError> {
        self.read_line_within(self.timeout)
    }
    fn read_line_within(&mut self, wait: Duration) -> Result<String, ScanError> {
        let deadline = Instant::now() + wait;
        let mut chunk = [0u8; 64];
        loop {
            if let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=end).collect();
                return String::from_utf8(line).map_err(|_| ScanError::FrameParse {
                    reason: "reply is not valid UTF-8".into(),
                });
            }
            if Instant::now() >= deadline {
                return Err(ScanError::LinkTimeout { waited: wait });
            }
            let Some(transport) = self.transport.as_mut() else {
                return Err(ScanError::LinkDisconnected {
                    reason: format!("{} is not connected", self.port_name),
                });
            };
            match transport.read(&mut chunk) {
                Ok(0) => return Err(self.disconnect("end of stream".into())),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(self.disconnect(e.to_string())),
            }
        }
    }
}
impl<T: Read + Write + Send> DeviceLink for SerialDeviceLink<T> {
    fn acquire(&mut self) -> Result<RawFrame, ScanError> {
        self.resync()?;
        self.send_command()?;
        let line = match self.read_line() {
            Err(err @ ScanError::LinkTimeout { .. }) => {
                self.unanswered += 1;
                return Err(err);
            }
            other => other?,
        };
        let values = self.wire.parse_line(&line, self.channels)?;
        RawFrame::new(values).map_err(|e| ScanError::FrameParse {
            reason: e.to_string(),
        })
    }
    fn channel_count(&self) -> usize {
        self.channels
    }
    fn describe(&self) -> String {
        format!("serial:{}", self.port_name)
    }
}
