//! Integration Tests for Aquamon
//!
//! Exercises the poll loop, framing, and transport accumulate-read
//! against a scripted mock transport, without real hardware.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::assert_ok;

use aquamon::{
    append_crc, read_command, verify_crc, FormatValue, MeterError, MeterResult, MeterTransport,
    PollConfig, Poller, Reading, ReadingSink, TransportStats, RESPONSE_FRAME_LEN,
};

/// One scripted transport read
#[derive(Debug, Clone)]
enum ReadEvent {
    /// Deliver these bytes (possibly fewer than the caller asked for)
    Data(Vec<u8>),
    /// Simulate the read timeout expiring
    Timeout,
}

/// Mock transport with scripted reads and captured writes
#[derive(Debug, Default)]
struct MockTransport {
    reads: VecDeque<ReadEvent>,
    written: Vec<Vec<u8>>,
    discards: u64,
    closed: bool,
    stats: TransportStats,
}

impl MockTransport {
    fn new() -> Self {
        Self::default()
    }

    /// Queue a response, split into fragments of `fragment` bytes
    fn push_response_fragmented(&mut self, response: &[u8], fragment: usize) {
        for chunk in response.chunks(fragment) {
            self.reads.push_back(ReadEvent::Data(chunk.to_vec()));
        }
    }

    fn push_response(&mut self, response: &[u8]) {
        self.push_response_fragmented(response, response.len());
    }

    fn push_timeout(&mut self) {
        self.reads.push_back(ReadEvent::Timeout);
    }
}

#[async_trait]
impl MeterTransport for MockTransport {
    async fn write_frame(&mut self, frame: &[u8]) -> MeterResult<()> {
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        self.written.push(frame.to_vec());
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> MeterResult<usize> {
        match self.reads.pop_front() {
            Some(ReadEvent::Data(mut data)) => {
                let count = data.len().min(buf.len());
                buf[..count].copy_from_slice(&data[..count]);
                // Anything the caller's buffer could not hold stays
                // queued for the next read.
                if count < data.len() {
                    let rest = data.split_off(count);
                    self.reads.push_front(ReadEvent::Data(rest));
                }
                self.stats.bytes_received += count as u64;
                Ok(count)
            }
            Some(ReadEvent::Timeout) | None => {
                self.stats.timeouts += 1;
                Err(MeterError::timeout("read response", 1000))
            }
        }
    }

    async fn discard_input(&mut self) -> MeterResult<()> {
        self.discards += 1;
        Ok(())
    }

    async fn close(&mut self) -> MeterResult<()> {
        self.closed = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

/// Sink that records everything it receives
#[derive(Debug, Default)]
struct RecordingSink {
    readings: Vec<Reading>,
    errors: Vec<MeterError>,
}

impl ReadingSink for RecordingSink {
    fn reading(&mut self, reading: &Reading) {
        self.readings.push(reading.clone());
    }

    fn error(&mut self, error: &MeterError) {
        self.errors.push(error.clone());
    }
}

/// Build a valid 16-byte measurement response around 4 register values
fn measurement_response(address: u8, registers: [u16; 4]) -> Vec<u8> {
    let mut body = vec![address, 0x03, 0x08, 0x00];
    for register in registers {
        body.extend_from_slice(&register.to_be_bytes());
    }
    body.extend_from_slice(&[0x00, 0x00]);

    let frame = append_crc(body);
    assert_eq!(frame.len(), RESPONSE_FRAME_LEN);
    frame
}

/// Poll configuration with no real-time delays, for fast tests
fn test_config(alternate: bool, iterations: u32) -> PollConfig {
    PollConfig {
        alternate_formats: alternate,
        iterations: Some(iterations),
        settle_delay: Duration::ZERO,
        request_delay: Duration::ZERO,
        ..PollConfig::default()
    }
}

#[test]
fn test_read_command_frame() {
    // The exact request the probe expects, CRC low byte first.
    let frame = read_command(0x01).unwrap();
    assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x04, 0x44, 0x09]);
    assert!(verify_crc(&frame).is_ok());
}

#[tokio::test]
async fn test_read_exact_assembles_fragments() {
    // Every fragment size from 1 to 15 must still deliver exactly 16
    // bytes to the caller.
    for fragment in 1..RESPONSE_FRAME_LEN {
        let response = measurement_response(0x01, [100, 680, 10, 300]);

        let mut transport = MockTransport::new();
        transport.push_response_fragmented(&response, fragment);

        let mut buf = [0u8; RESPONSE_FRAME_LEN];
        assert_ok!(transport.read_exact(&mut buf).await);
        assert_eq!(buf.as_slice(), response.as_slice());
    }
}

#[tokio::test]
async fn test_read_exact_surfaces_timeout() {
    let mut transport = MockTransport::new();
    transport.push_response_fragmented(&[0xAA; 7], 7);
    transport.push_timeout();

    let mut buf = [0u8; RESPONSE_FRAME_LEN];
    let result = transport.read_exact(&mut buf).await;
    assert!(matches!(result, Err(MeterError::Timeout { .. })));
}

#[tokio::test]
async fn test_fixed_format_session() {
    let mut transport = MockTransport::new();
    // cf register 100 -> 0.1, ph register 680 -> 6.8, re 10 -> 0.1,
    // temp 300 -> 30.0
    transport.push_response(&measurement_response(0x01, [100, 680, 10, 300]));
    transport.push_response(&measurement_response(0x01, [120, 710, 12, 305]));

    let mut poller = Poller::new(transport, test_config(false, 2));
    let mut sink = RecordingSink::default();

    let stats = poller.run(&mut sink).await.unwrap();

    assert_eq!(stats.iterations, 2);
    assert_eq!(stats.readings, 2);
    assert_eq!(stats.recovered_errors, 0);
    assert_eq!(stats.success_rate(), 100.0);

    assert_eq!(sink.readings.len(), 2);
    assert_eq!(sink.readings[0].conductivity, 0.1);
    assert_eq!(sink.readings[0].value, FormatValue::Ph(6.8));
    assert_eq!(sink.readings[0].temperature, 30.0);
    assert_eq!(sink.readings[1].value, FormatValue::Ph(7.1));

    // Initial format write, then one read request per iteration.
    let written = &poller.transport().written;
    assert_eq!(written.len(), 3);
    assert_eq!(&written[0][..6], &[0x01, 0x06, 0x00, 0x05, 0x00, 0x00]);
    assert_eq!(&written[1][..6], &[0x01, 0x03, 0x00, 0x00, 0x00, 0x04]);
    assert_eq!(&written[2][..6], &[0x01, 0x03, 0x00, 0x00, 0x00, 0x04]);
    for frame in written {
        assert!(verify_crc(frame).is_ok());
    }

    // Stale input is discarded before every write.
    assert_eq!(poller.transport().discards, 3);
}

#[tokio::test]
async fn test_alternating_session_toggles_formats() {
    let mut transport = MockTransport::new();
    // Iteration 1 decodes as pH, 2 as ORP, 3 as pH again. The second
    // response carries the packed ORP encoding: bit 6 set, magnitude
    // 0x0190 = 400.
    transport.push_response(&measurement_response(0x01, [100, 680, 10, 300]));
    transport.push_response(&measurement_response(0x01, [100, 0x4190, 10, 300]));
    transport.push_response(&measurement_response(0x01, [100, 690, 10, 300]));

    let mut poller = Poller::new(transport, test_config(true, 3));
    let mut sink = RecordingSink::default();

    let stats = poller.run(&mut sink).await.unwrap();
    assert_eq!(stats.readings, 3);

    assert_eq!(sink.readings[0].value, FormatValue::Ph(6.8));
    assert_eq!(sink.readings[1].value, FormatValue::Orp(-400));
    assert_eq!(sink.readings[2].value, FormatValue::Ph(6.9));

    // Format writes alternate strictly between the two register
    // values, starting from the configured initial format.
    let format_values: Vec<u8> = poller
        .transport()
        .written
        .iter()
        .filter(|frame| frame[1] == 0x06)
        .map(|frame| frame[5])
        .collect();
    assert_eq!(format_values, vec![0x00, 0x01, 0x00, 0x01]);
}

#[tokio::test]
async fn test_crc_mismatch_is_isolated_to_its_iteration() {
    let mut transport = MockTransport::new();

    let mut corrupted = measurement_response(0x01, [100, 680, 10, 300]);
    corrupted[5] ^= 0x01; // single bit flip in a register byte
    transport.push_response(&corrupted);
    transport.push_response(&measurement_response(0x01, [100, 680, 10, 300]));

    let mut poller = Poller::new(transport, test_config(false, 2));
    let mut sink = RecordingSink::default();

    let stats = poller.run(&mut sink).await.unwrap();

    assert_eq!(stats.iterations, 2);
    assert_eq!(stats.readings, 1);
    assert_eq!(stats.recovered_errors, 1);
    assert_eq!(sink.errors.len(), 1);
    assert!(matches!(sink.errors[0], MeterError::CrcMismatch { .. }));
    assert_eq!(sink.readings.len(), 1);
}

#[tokio::test]
async fn test_timeout_is_isolated_to_its_iteration() {
    let mut transport = MockTransport::new();
    transport.push_timeout();
    transport.push_response(&measurement_response(0x01, [100, 680, 10, 300]));

    let mut poller = Poller::new(transport, test_config(false, 2));
    let mut sink = RecordingSink::default();

    let stats = poller.run(&mut sink).await.unwrap();

    assert_eq!(stats.readings, 1);
    assert_eq!(stats.recovered_errors, 1);
    assert!(matches!(sink.errors[0], MeterError::Timeout { .. }));
}

#[tokio::test]
async fn test_session_shutdown_releases_transport() {
    let mut transport = MockTransport::new();
    transport.push_response(&measurement_response(0x01, [100, 680, 10, 300]));

    let mut poller = Poller::new(transport, test_config(false, 1));
    let mut sink = RecordingSink::default();

    assert_ok!(poller.run(&mut sink).await);
    assert!(poller.transport().is_connected());

    poller.shutdown().await.unwrap();
    assert!(!poller.transport().is_connected());
}
