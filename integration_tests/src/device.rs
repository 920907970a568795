//! Device communication client.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serial_frame_protocol::protocol::{encode, Frame, FrameParser, Step};
use serialport::SerialPort;

/// Payload used to probe whether a port talks the protocol.
const PROBE_PAYLOAD: &[u8] = b"PING";

/// Find available data ports by scanning USB serial devices and testing with an echo.
/// Returns a list of port names that echo the probe frame back.
pub fn find_data_ports(baud_rate: u32) -> Result<Vec<String>> {
    let ports = serialport::available_ports()?;
    let mut data_ports = Vec::new();

    for port_info in ports {
        // Filter to USB serial adapters and CDC-ACM devices
        if !port_info.port_name.contains("ttyACM") && !port_info.port_name.contains("ttyUSB") {
            continue;
        }

        if let Ok(mut client) = DeviceClient::new(&port_info.port_name, baud_rate) {
            // Set short timeout for probing
            client.set_timeout(Duration::from_millis(500));
            if let Ok(echoed) = client.echo(PROBE_PAYLOAD) {
                if echoed == PROBE_PAYLOAD {
                    data_ports.push(port_info.port_name.clone());
                }
            }
        }
    }

    Ok(data_ports)
}

/// Find a single data port. Returns error if none found.
pub fn find_data_port(baud_rate: u32) -> Result<String> {
    let ports = find_data_ports(baud_rate)?;
    match ports.into_iter().next() {
        Some(port) => Ok(port),
        None => anyhow::bail!("No data port found - ensure device is connected"),
    }
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str, baud_rate: u32) -> Result<String> {
    if port_arg == "auto" {
        find_data_port(baud_rate)
    } else {
        Ok(port_arg.to_string())
    }
}

/// Client for exchanging frames with a device.
pub struct DeviceClient {
    port: Box<dyn SerialPort>,
    timeout: Duration,
    parser: FrameParser,
}

impl DeviceClient {
    /// Create a new device client.
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(50))
            .open()?;

        Ok(Self {
            port,
            timeout: Duration::from_secs(2),
            parser: FrameParser::new(),
        })
    }

    /// Set the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Clear any pending data in the serial buffer and any partial frame.
    pub fn clear_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        self.parser.reset();
        Ok(())
    }

    /// Frame a payload and send it.
    pub fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        let frame = encode(payload)
            .map_err(|e| anyhow::anyhow!("Cannot encode payload: {:?}", e))?;
        self.send_raw(&frame)
    }

    /// Send bytes exactly as given (for noise and corruption tests).
    pub fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    /// Send a payload and wait for the echoed payload.
    pub fn echo(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.send_payload(payload)?;
        let frame = self.read_frame()?;
        Ok(frame.payload().to_vec())
    }

    /// Wait up to the configured timeout for a frame.
    pub fn read_frame(&mut self) -> Result<Frame> {
        match self.try_read_frame(self.timeout)? {
            Some(frame) => Ok(frame),
            None => anyhow::bail!(
                "Timeout waiting for frame (parser state {:?})",
                self.parser.state()
            ),
        }
    }

    /// Read bytes through the parser until a frame completes or `timeout` expires.
    /// Returns None on timeout.
    pub fn try_read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let mut buf = [0u8; 1];
        let start = Instant::now();

        while start.elapsed() < timeout {
            match self.port.read(&mut buf) {
                Ok(1) => {
                    if let Step::Complete(frame) = self.parser.feed(buf[0]) {
                        self.parser.reset();
                        return Ok(Some(frame));
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }

    /// Number of partial frames the host-side parser has dropped.
    pub fn resyncs(&self) -> u32 {
        self.parser.stats().resyncs()
    }
}
