//! # Serial Transport Layer
//!
//! Byte-level access to the probe's RS-485 link behind the
//! [`MeterTransport`] trait, so the protocol loop can be exercised
//! against fakes that fragment, corrupt, or delay data without real
//! hardware.
//!
//! The trait is deliberately thinner than a full Modbus transport: the
//! probe speaks fixed-length frames, so framing lives with the caller
//! and the transport only moves bytes, discards stale input, and
//! enforces the per-read timeout.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use aquamon::transport::{MeterTransport, SerialTransport};
//!
//! # async fn example() -> aquamon::MeterResult<()> {
//! let mut transport = SerialTransport::new("/dev/ttyUSB0")?;
//!
//! transport.discard_input().await?;
//! transport.write_frame(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x04, 0x44, 0x09]).await?;
//!
//! let mut response = [0u8; 16];
//! transport.read_exact(&mut response).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, SerialStream, StopBits};

use crate::error::{MeterError, MeterResult};

/// Default baud rate of the probe's RS-485 port
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default per-read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Transport layer statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub timeouts: u64,
    pub errors: u64,
}

/// Byte channel to the probe
///
/// Implementations must deliver `write_frame` completely before
/// returning and bound every `read` by their configured timeout,
/// surfacing expiry as [`MeterError::Timeout`] rather than blocking
/// forever.
#[async_trait]
pub trait MeterTransport: Send + Sync {
    /// Write a complete frame, flushing before returning
    async fn write_frame(&mut self, frame: &[u8]) -> MeterResult<()>;

    /// Read whatever is available into `buf`, up to the read timeout
    ///
    /// May return fewer bytes than `buf` can hold; returns the number
    /// actually read.
    async fn read(&mut self, buf: &mut [u8]) -> MeterResult<usize>;

    /// Drop any unread buffered input
    ///
    /// Called before each request so a stale response to a previous
    /// command (including the unconsumed write-register echo) can
    /// never be mistaken for the current one.
    async fn discard_input(&mut self) -> MeterResult<()>;

    /// Release the underlying channel
    async fn close(&mut self) -> MeterResult<()>;

    /// Check whether the channel is currently usable
    fn is_connected(&self) -> bool;

    /// Get communication statistics
    fn stats(&self) -> TransportStats;

    /// Read until `buf` is completely filled
    ///
    /// Accumulates across partial reads of any size; the only bound is
    /// the per-read timeout of the underlying [`read`](Self::read),
    /// whose error this propagates unchanged.
    async fn read_exact(&mut self, buf: &mut [u8]) -> MeterResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let count = self.read(&mut buf[filled..]).await?;
            filled += count;
        }
        Ok(())
    }
}

/// Serial port configuration
///
/// Defaults match the probe: 9600 baud, 8 data bits, no parity, one
/// stop bit, 1 second read timeout.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }
}

/// [`MeterTransport`] over a real serial port
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
    config: SerialConfig,
    stats: TransportStats,
}

impl SerialTransport {
    /// Open a serial port with the probe's default settings
    pub fn new(port: &str) -> MeterResult<Self> {
        Self::new_with_config(port, SerialConfig::default())
    }

    /// Open a serial port with full configuration
    pub fn new_with_config(port: &str, config: SerialConfig) -> MeterResult<Self> {
        let mut transport = Self {
            port: None,
            port_name: port.to_string(),
            config,
            stats: TransportStats::default(),
        };

        transport.connect()?;

        Ok(transport)
    }

    fn connect(&mut self) -> MeterResult<()> {
        let builder = tokio_serial::new(&self.port_name, self.config.baud_rate)
            .data_bits(self.config.data_bits)
            .stop_bits(self.config.stop_bits)
            .parity(self.config.parity)
            .timeout(self.config.read_timeout);

        let port = SerialStream::open(&builder).map_err(|e| {
            MeterError::connection(format!(
                "failed to open serial port {}: {}",
                self.port_name, e
            ))
        })?;

        self.port = Some(port);

        Ok(())
    }

    fn timeout_ms(&self) -> u64 {
        self.config.read_timeout.as_millis() as u64
    }
}

#[async_trait]
impl MeterTransport for SerialTransport {
    async fn write_frame(&mut self, frame: &[u8]) -> MeterResult<()> {
        let deadline = self.config.read_timeout;
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| MeterError::connection("serial port not open"))?;

        log_packet("send", frame);

        match timeout(deadline, port.write_all(frame)).await {
            Ok(Ok(())) => {
                let _ = timeout(deadline, port.flush()).await;
            }
            Ok(Err(e)) => {
                self.stats.errors += 1;
                return Err(MeterError::io(format!("failed to write frame: {}", e)));
            }
            Err(_) => {
                self.stats.timeouts += 1;
                return Err(MeterError::timeout("write frame", self.timeout_ms()));
            }
        }

        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;

        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> MeterResult<usize> {
        let deadline = self.config.read_timeout;
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| MeterError::connection("serial port not open"))?;

        match timeout(deadline, port.read(buf)).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    log_packet("receive", &buf[..count]);
                }
                self.stats.bytes_received += count as u64;
                Ok(count)
            }
            Ok(Err(e)) => {
                self.stats.errors += 1;
                Err(MeterError::io(format!("serial read error: {}", e)))
            }
            Err(_) => {
                self.stats.timeouts += 1;
                Err(MeterError::timeout("read response", self.timeout_ms()))
            }
        }
    }

    async fn discard_input(&mut self) -> MeterResult<()> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| MeterError::connection("serial port not open"))?;

        port.clear(ClearBuffer::Input)
            .map_err(|e| MeterError::io(format!("failed to discard input buffer: {}", e)))
    }

    async fn close(&mut self) -> MeterResult<()> {
        // SerialStream closes on drop.
        self.port.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

/// Log a frame as an uppercase hex dump at debug level
fn log_packet(direction: &str, data: &[u8]) {
    debug!(
        "[RTU] {} {} bytes: {}",
        direction,
        data.len(),
        hex::encode_upper(data)
    );
}
