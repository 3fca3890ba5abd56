//! # Aquamon Error Handling
//!
//! Error types for every failure mode of the probe session: serial
//! transport problems, Modbus RTU framing violations, CRC integrity
//! failures, and configuration mistakes.
//!
//! The taxonomy distinguishes errors that are recovered at the poll
//! iteration boundary (a corrupt response, a read timeout) from errors
//! that are fatal to the session (the serial port cannot be opened at
//! all). Use [`MeterError::is_recoverable`] to tell them apart:
//!
//! ```rust
//! use aquamon::MeterError;
//!
//! let err = MeterError::timeout("read response", 1000);
//! assert!(err.is_recoverable());
//!
//! let err = MeterError::connection("no such port: /dev/ttyUSB7");
//! assert!(!err.is_recoverable());
//! ```

use thiserror::Error;

/// Result type alias for probe operations
pub type MeterResult<T> = Result<T, MeterError>;

/// Errors arising from probe communication
///
/// Each variant carries enough context to diagnose the failure from a
/// log line alone; transport errors additionally record the operation
/// that was in flight when they occurred.
#[derive(Error, Debug, Clone)]
pub enum MeterError {
    /// I/O related errors (serial read/write failures)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serial port acquisition or lifecycle errors
    ///
    /// Raised when the port cannot be opened at startup or disappears
    /// mid-session. Fatal when it occurs outside the poll loop.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// An operation exceeded its configured timeout
    ///
    /// The probe answers well within the 1 second read timeout when
    /// healthy; a timeout usually means a wiring problem, a wrong
    /// slave address, or a request issued before the device recovered
    /// from the previous one.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// CRC validation failure
    ///
    /// `expected` is the checksum recomputed over the frame body,
    /// `actual` the value carried in the frame's trailing two bytes.
    #[error("CRC validation failed: expected={expected:04X}, actual={actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Frame structure violations
    ///
    /// A frame too short to carry a CRC, or a response whose length
    /// does not match the fixed 16-byte layout.
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Configuration errors (bad slave address, zero-length timeouts)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal errors that indicate a bug rather than a runtime fault
    ///
    /// The only producer is the builders' post-construction
    /// self-check; a frame we built ourselves failing its own CRC
    /// means the CRC engine is broken, not the wire.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MeterError {
    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a CRC mismatch error
    pub fn crc_mismatch(expected: u16, actual: u16) -> Self {
        Self::CrcMismatch { expected, actual }
    }

    /// Create a frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame { message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if the error is recoverable at the iteration boundary
    ///
    /// Recoverable errors are reported and the poll loop moves on to
    /// the next iteration; unrecoverable ones terminate the session.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { .. } => true,
            Self::Timeout { .. } => true,
            Self::CrcMismatch { .. } => true,
            Self::Frame { .. } => true,
            _ => false,
        }
    }

    /// Check if the error originates in the serial transport
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Connection { .. } | Self::Timeout { .. }
        )
    }

    /// Check if the error is an integrity/framing violation
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::CrcMismatch { .. } | Self::Frame { .. })
    }
}

impl From<std::io::Error> for MeterError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Convert from tokio timeout errors
///
/// Specific operation context and timeout duration should be attached
/// at the call site; this conversion is the generic fallback.
impl From<tokio::time::error::Elapsed> for MeterError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("operation timeout", 0)
    }
}
