//! # Modbus RTU Framing
//!
//! Frame construction and integrity checking for the probe's RTU
//! dialect: CRC-16 computation, verification of inbound frames against
//! their trailing checksum, and the two request builders the session
//! needs (read holding registers, write the response-format register).
//!
//! ## Frame Layout
//!
//! ```text
//! [address:1][function:1][payload:N][crc_low:1][crc_high:1]
//! ```
//!
//! The CRC is computed over every byte preceding it and stored low
//! byte first. Verification reconstructs the trailing value with
//! `u16::from_le_bytes`, which matches the on-wire order exactly.

use crc::{Crc, CRC_16_MODBUS};

use crate::error::{MeterError, MeterResult};
use crate::reading::ResponseFormat;

/// CRC calculator (polynomial 0xA001 reflected, initial value 0xFFFF)
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Register the probe reports measurements from (always read in full)
pub const READ_START_REGISTER: u16 = 0x0000;

/// Number of holding registers in one measurement read
pub const READ_REGISTER_COUNT: u16 = 0x0004;

/// Holding register that selects the response format
pub const FORMAT_REGISTER: u16 = 0x0005;

/// Compute the Modbus CRC-16 over a byte slice
///
/// Returns the checksum in the algorithm's native value order. Callers
/// serializing it into a frame must write the low byte first; callers
/// comparing it against trailing frame bytes must reconstruct the
/// frame value as little-endian.
pub fn compute_crc(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Verify a frame against its trailing CRC
///
/// Recomputes the checksum over `frame[0 .. len-2)` and compares it to
/// the last two bytes interpreted low-byte-first. On mismatch, returns
/// [`MeterError::CrcMismatch`] carrying both values.
pub fn verify_crc(frame: &[u8]) -> MeterResult<()> {
    if frame.len() < 3 {
        return Err(MeterError::frame(format!(
            "frame too short to carry a CRC: {} bytes",
            frame.len()
        )));
    }

    let body_len = frame.len() - 2;
    let actual = u16::from_le_bytes([frame[body_len], frame[body_len + 1]]);
    let expected = compute_crc(&frame[..body_len]);

    if expected != actual {
        return Err(MeterError::crc_mismatch(expected, actual));
    }

    Ok(())
}

/// Append the CRC to a request payload, low byte first
pub fn append_crc(mut payload: Vec<u8>) -> Vec<u8> {
    let crc = compute_crc(&payload);
    payload.extend_from_slice(&crc.to_le_bytes());
    payload
}

/// Build the read-holding-registers request (function 0x03)
///
/// Always reads the probe's full measurement block: four registers
/// starting at register 0. The built frame is checked against its own
/// CRC before being returned; a failure there is a CRC engine bug and
/// surfaces as [`MeterError::Internal`].
pub fn read_command(address: u8) -> MeterResult<Vec<u8>> {
    let mut payload = vec![address, 0x03];
    payload.extend_from_slice(&READ_START_REGISTER.to_be_bytes());
    payload.extend_from_slice(&READ_REGISTER_COUNT.to_be_bytes());

    let frame = append_crc(payload);
    self_check(&frame)?;
    Ok(frame)
}

/// Build the write-single-register request selecting a response format
/// (function 0x06)
///
/// Writes 0x0001 to the format register for ORP mode, 0x0000 for pH
/// mode. Self-verified the same way as [`read_command`].
pub fn set_format_command(address: u8, format: ResponseFormat) -> MeterResult<Vec<u8>> {
    let mut payload = vec![address, 0x06];
    payload.extend_from_slice(&FORMAT_REGISTER.to_be_bytes());
    payload.extend_from_slice(&format.register_value().to_be_bytes());

    let frame = append_crc(payload);
    self_check(&frame)?;
    Ok(frame)
}

fn self_check(frame: &[u8]) -> MeterResult<()> {
    verify_crc(frame).map_err(|e| {
        MeterError::internal(format!("self-built frame failed CRC check: {}", e))
    })
}
