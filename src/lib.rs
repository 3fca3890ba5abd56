//! # Aquamon - Water Quality Probe Poller
//!
//! A Modbus RTU master for Yieryi-style multi-parameter water quality
//! probes. Polls a single slave device over a serial link, decodes its
//! fixed-layout register block into physical measurements
//! (conductivity, pH or ORP, "re", temperature), and alternates the
//! device's response-format register so both pH and ORP are observed
//! over time.
//!
//! ## Protocol Support
//!
//! | Code | Function                | Used for                        |
//! |------|-------------------------|---------------------------------|
//! | 0x03 | Read Holding Registers  | The 4-register measurement block |
//! | 0x06 | Write Single Register   | Selecting the response format    |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aquamon::{ConsoleSink, MeterResult, PollConfig, Poller, SerialTransport};
//!
//! #[tokio::main]
//! async fn main() -> MeterResult<()> {
//!     let transport = SerialTransport::new("/dev/ttyUSB0")?;
//!     let mut poller = Poller::new(transport, PollConfig::default());
//!
//!     let mut sink = ConsoleSink;
//!     let stats = poller.run(&mut sink).await?;
//!     println!("readings: {}", stats.readings);
//!
//!     poller.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │   Poller / Alternation   │  session state, error isolation
//! └──────────────────────────┘
//!              │
//! ┌──────────────────────────┐
//! │   Frame Builder / CRC    │  requests, integrity checks
//! └──────────────────────────┘
//!              │
//! ┌──────────────────────────┐
//! │     MeterTransport       │  serial bytes, timeouts, discard
//! └──────────────────────────┘
//! ```
//!
//! The device answers in one of two mutually exclusive formats; a
//! format selected over RTU is volatile (the panel-set format returns
//! after a power cycle), so the poller can flip it every cycle without
//! wearing the device's persistent storage.

/// Error types and result handling
pub mod error;

/// Modbus RTU framing and CRC-16 integrity
pub mod frame;

/// Poll loop and format alternation state machine
pub mod poller;

/// Response formats and measurement decoding
pub mod reading;

/// Serial transport layer
pub mod transport;

// Re-export main types for convenience
pub use error::{MeterError, MeterResult};
pub use frame::{append_crc, compute_crc, read_command, set_format_command, verify_crc};
pub use poller::{ConsoleSink, PollConfig, PollStats, Poller, ReadingSink};
pub use reading::{FormatValue, Reading, ResponseFormat, RESPONSE_FRAME_LEN};
pub use transport::{
    MeterTransport, SerialConfig, SerialTransport, TransportStats, DEFAULT_BAUD_RATE,
    DEFAULT_READ_TIMEOUT_MS,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
