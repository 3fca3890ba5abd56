//! # Poll Loop and Format Alternation
//!
//! [`Poller`] drives the session against any [`MeterTransport`]:
//! select the initial response format, then repeatedly read the
//! measurement block, decode it, hand the [`Reading`] to the output
//! sink, and (when enabled) flip the device to the other format so
//! both pH and ORP get observed over time.
//!
//! Alternating over the wire is safe because an RTU-issued format
//! change is volatile: power-cycling the device restores the format
//! set from the front panel, so per-cycle rewrites never wear the
//! device's write-limited persistent memory.
//!
//! Every failure inside one iteration (CRC mismatch, read timeout,
//! short frame) is reported to the sink and the loop continues; a
//! single bad read never ends the session. Only errors before the
//! loop starts (the initial format write) propagate to the caller.

use std::time::Duration;

use log::{info, warn};
use serde::Serialize;
use tokio::time::sleep;

use crate::error::{MeterError, MeterResult};
use crate::frame::{read_command, set_format_command, verify_crc};
use crate::reading::{Reading, ResponseFormat, RESPONSE_FRAME_LEN};
use crate::transport::MeterTransport;

/// Default slave address of a factory-configured probe
pub const DEFAULT_SLAVE_ADDRESS: u8 = 0x01;

/// Delay after a format change before reads are trustworthy
///
/// Shorter waits produce responses with pH and ORP values mixed up.
pub const SETTLE_DELAY_MS: u64 = 1000;

/// Recovery delay between consecutive requests
pub const REQUEST_DELAY_MS: u64 = 200;

/// Default iteration bound; large enough to stand in for "forever"
pub const DEFAULT_ITERATIONS: u32 = 10_000;

/// Poll session configuration
#[derive(Debug, Clone, Serialize)]
pub struct PollConfig {
    /// Slave address of the probe on the bus
    pub address: u8,
    /// Format selected before the first read
    pub initial_format: ResponseFormat,
    /// Flip the response format after every reading
    pub alternate_formats: bool,
    /// Iteration bound; `None` polls indefinitely
    pub iterations: Option<u32>,
    /// Wait after each format change
    pub settle_delay: Duration,
    /// Wait between consecutive read requests
    pub request_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SLAVE_ADDRESS,
            initial_format: ResponseFormat::Ph,
            alternate_formats: true,
            iterations: Some(DEFAULT_ITERATIONS),
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
            request_delay: Duration::from_millis(REQUEST_DELAY_MS),
        }
    }
}

/// Counters for one poll session
#[derive(Debug, Clone, Default)]
pub struct PollStats {
    /// Iterations attempted
    pub iterations: u64,
    /// Readings successfully decoded and emitted
    pub readings: u64,
    /// Errors recovered at the iteration boundary
    pub recovered_errors: u64,
}

impl PollStats {
    /// Fraction of iterations that produced a reading, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        (self.readings as f64 / self.iterations as f64) * 100.0
    }
}

/// Output collaborator for the poll loop
///
/// Receives every decoded reading and every recovered error, one call
/// per iteration.
pub trait ReadingSink {
    /// A measurement was decoded
    fn reading(&mut self, reading: &Reading);

    /// An iteration failed and was recovered
    fn error(&mut self, error: &MeterError);
}

/// Sink that renders to standard output
///
/// One comma-separated `label: value` line per reading, one `Error:`
/// line per recovered failure.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ReadingSink for ConsoleSink {
    fn reading(&mut self, reading: &Reading) {
        println!("{}", reading);
    }

    fn error(&mut self, error: &MeterError) {
        println!("Error: {}", error);
    }
}

/// The poll session state machine
///
/// Owns the transport, the configuration, and the one piece of
/// session state the protocol requires: which response format the
/// device is currently in. Only the alternation step mutates it.
pub struct Poller<T: MeterTransport> {
    transport: T,
    config: PollConfig,
    format: ResponseFormat,
    stats: PollStats,
}

impl<T: MeterTransport> Poller<T> {
    /// Create a poller over an open transport
    pub fn new(transport: T, config: PollConfig) -> Self {
        let format = config.initial_format;
        Self {
            transport,
            config,
            format,
            stats: PollStats::default(),
        }
    }

    /// The response format the device is currently in
    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    /// Session counters so far
    pub fn stats(&self) -> PollStats {
        self.stats.clone()
    }

    /// Access the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run the session to its iteration bound
    ///
    /// Initializes the device to the configured format, then iterates.
    /// Iteration failures go to the sink; only initialization errors
    /// propagate. Returns the session counters.
    pub async fn run<S: ReadingSink>(&mut self, sink: &mut S) -> MeterResult<PollStats> {
        info!(
            "starting poll session: address={:#04x}, initial format={}, alternating={}",
            self.config.address, self.config.initial_format, self.config.alternate_formats
        );

        // Bring the device to a known format before the first read.
        self.set_format(self.config.initial_format).await?;
        sleep(self.config.settle_delay).await;

        let mut iteration: u64 = 0;
        loop {
            if let Some(bound) = self.config.iterations {
                if iteration >= u64::from(bound) {
                    break;
                }
            }
            iteration += 1;
            self.stats.iterations += 1;

            match self.poll_once().await {
                Ok(reading) => {
                    self.stats.readings += 1;
                    sink.reading(&reading);

                    // Pacing and alternation sit inside the same
                    // error-isolated scope, but after the emit: a
                    // failed format write must not swallow a reading
                    // that already decoded cleanly.
                    if let Err(e) = self.pace_and_alternate().await {
                        self.stats.recovered_errors += 1;
                        warn!("iteration {} recovered: {}", iteration, e);
                        sink.error(&e);
                    }
                }
                Err(e) => {
                    self.stats.recovered_errors += 1;
                    warn!("iteration {} recovered: {}", iteration, e);
                    sink.error(&e);
                }
            }
        }

        info!(
            "poll session finished: {} iterations, {} readings, {} recovered errors",
            self.stats.iterations, self.stats.readings, self.stats.recovered_errors
        );

        Ok(self.stats.clone())
    }

    /// Release the transport
    pub async fn shutdown(&mut self) -> MeterResult<()> {
        self.transport.close().await
    }

    /// Read and decode one measurement with the current format
    async fn poll_once(&mut self) -> MeterResult<Reading> {
        let response = self.issue_read().await?;
        Reading::decode(&response, self.format)
    }

    /// Post-emit pacing, and the format flip when alternation is on
    async fn pace_and_alternate(&mut self) -> MeterResult<()> {
        // Device recovery time; polling faster yields stale or
        // malformed responses.
        sleep(self.config.request_delay).await;

        if self.config.alternate_formats {
            self.format = self.format.toggled();
            self.set_format(self.format).await?;
            sleep(self.config.settle_delay).await;
        }

        Ok(())
    }

    /// Issue a measurement read and collect the fixed-length response
    async fn issue_read(&mut self) -> MeterResult<Vec<u8>> {
        let request = read_command(self.config.address)?;

        self.transport.discard_input().await?;
        self.transport.write_frame(&request).await?;

        let mut response = vec![0u8; RESPONSE_FRAME_LEN];
        self.transport.read_exact(&mut response).await?;
        verify_crc(&response)?;

        Ok(response)
    }

    /// Write the response-format register
    ///
    /// Fire-and-forget: the device's echo, if any, is never read here;
    /// the discard before the next request disposes of it.
    async fn set_format(&mut self, format: ResponseFormat) -> MeterResult<()> {
        let request = set_format_command(self.config.address, format)?;

        self.transport.discard_input().await?;
        self.transport.write_frame(&request).await
    }
}
