//! # Measurement Decoding
//!
//! The probe's response format register selects which of two mutually
//! exclusive quantities occupies the shared register pair: pH or ORP
//! (oxidation-reduction potential). [`ResponseFormat`] models that
//! two-state register; [`Reading`] is the decoded measurement record
//! produced once per poll iteration.
//!
//! All registers arrive big-endian at fixed byte offsets in the
//! 16-byte response. The ORP value does not use the plain
//! register-times-scale encoding of the other fields: the device packs
//! a sign bit and a 13-bit magnitude into the same two bytes pH uses.
//! That packing is reproduced here exactly as the device emits it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{MeterError, MeterResult};

/// Total length of a measurement response frame, CRC included
pub const RESPONSE_FRAME_LEN: usize = 16;

/// The probe's two response formats
///
/// Exactly one is active at any time. A format selected over the wire
/// is volatile: power-cycling the device restores the panel-set
/// format, which is what makes per-cycle alternation safe for the
/// device's write-limited persistent storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseFormat {
    /// The shared register pair carries pH (scaled /100)
    Ph,
    /// The shared register pair carries ORP (sign-and-magnitude packed)
    Orp,
}

impl ResponseFormat {
    /// The other format
    pub fn toggled(self) -> Self {
        match self {
            ResponseFormat::Ph => ResponseFormat::Orp,
            ResponseFormat::Orp => ResponseFormat::Ph,
        }
    }

    /// Value written to the format register to select this format
    pub fn register_value(self) -> u16 {
        match self {
            ResponseFormat::Ph => 0x0000,
            ResponseFormat::Orp => 0x0001,
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseFormat::Ph => write!(f, "pH"),
            ResponseFormat::Orp => write!(f, "ORP"),
        }
    }
}

/// The format-dependent measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum FormatValue {
    /// pH, scaled /100 from the register value
    Ph(f64),
    /// ORP in mV, sign-and-magnitude decoded
    Orp(i32),
}

/// One decoded measurement
///
/// Produced per poll iteration and handed straight to the output
/// sink; nothing retains it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// Conductivity factor, register /1000
    pub conductivity: f64,
    /// pH or ORP depending on the active response format
    pub value: FormatValue,
    /// Reduction potential adjacent value, register /100
    pub re: f64,
    /// Temperature in °C, register /10
    pub temperature: f64,
    /// When the response was decoded
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Decode a measurement response at the device's fixed byte offsets
    ///
    /// `format` must be the format the device was in when it produced
    /// the response; it selects the pH vs ORP interpretation of the
    /// shared register. Pure function of its inputs apart from the
    /// timestamp.
    pub fn decode(response: &[u8], format: ResponseFormat) -> MeterResult<Self> {
        if response.len() != RESPONSE_FRAME_LEN {
            return Err(MeterError::frame(format!(
                "measurement response must be {} bytes, got {}",
                RESPONSE_FRAME_LEN,
                response.len()
            )));
        }

        let conductivity = combine(response[4], response[5]) as f64 / 1000.0;

        let value = match format {
            ResponseFormat::Ph => {
                FormatValue::Ph(combine(response[6], response[7]) as f64 / 100.0)
            }
            ResponseFormat::Orp => {
                // Sign in bit 6 of the high byte, magnitude in the
                // remaining 13 bits. Unlike every other field this is
                // not a scaled register; keep it exactly as emitted.
                let sign = if response[6] & 0x40 != 0 { -1 } else { 1 };
                let magnitude = (((response[6] & 0x3F) as i32) << 8) | response[7] as i32;
                FormatValue::Orp(sign * magnitude)
            }
        };

        let re = combine(response[8], response[9]) as f64 / 100.0;
        let temperature = combine(response[10], response[11]) as f64 / 10.0;

        Ok(Reading {
            conductivity,
            value,
            re,
            temperature,
            timestamp: Utc::now(),
        })
    }
}

/// Combine a big-endian register byte pair into its 16-bit value
fn combine(hi: u8, lo: u8) -> u16 {
    u16::from_be_bytes([hi, lo])
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cf: {}, ", self.conductivity)?;
        match self.value {
            FormatValue::Ph(ph) => write!(f, "ph: {}, ", ph)?,
            FormatValue::Orp(orp) => write!(f, "orp: {}, ", orp)?,
        }
        write!(f, "re: {}, temp: {}", self.re, self.temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_registers(payload: [u8; 8]) -> Vec<u8> {
        let mut response = vec![0x01, 0x03, 0x08, 0x00];
        response.extend_from_slice(&payload);
        response.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(response.len(), RESPONSE_FRAME_LEN);
        response
    }

    #[test]
    fn test_format_toggle_is_an_involution() {
        assert_eq!(ResponseFormat::Ph.toggled(), ResponseFormat::Orp);
        assert_eq!(ResponseFormat::Orp.toggled(), ResponseFormat::Ph);
        assert_eq!(ResponseFormat::Ph.toggled().toggled(), ResponseFormat::Ph);
    }

    #[test]
    fn test_format_register_values() {
        assert_eq!(ResponseFormat::Ph.register_value(), 0x0000);
        assert_eq!(ResponseFormat::Orp.register_value(), 0x0001);
    }

    #[test]
    fn test_decode_ph_reading() {
        let response =
            response_with_registers([0x00, 0x64, 0x17, 0x70, 0x00, 0x0A, 0x01, 0x2C]);
        let reading = Reading::decode(&response, ResponseFormat::Ph).unwrap();

        assert_eq!(reading.conductivity, 0.100);
        assert_eq!(reading.value, FormatValue::Ph(60.0));
        assert_eq!(reading.re, 0.10);
        assert_eq!(reading.temperature, 30.0);
    }

    #[test]
    fn test_decode_orp_reading() {
        // Bit 6 of the high byte set: negative, magnitude 0x3FFF.
        let response =
            response_with_registers([0x00, 0x64, 0x7F, 0xFF, 0x00, 0x0A, 0x01, 0x2C]);
        let reading = Reading::decode(&response, ResponseFormat::Orp).unwrap();
        assert_eq!(reading.value, FormatValue::Orp(-16383));

        // Bit 6 clear: positive.
        let response =
            response_with_registers([0x00, 0x64, 0x01, 0x90, 0x00, 0x0A, 0x01, 0x2C]);
        let reading = Reading::decode(&response, ResponseFormat::Orp).unwrap();
        assert_eq!(reading.value, FormatValue::Orp(400));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = Reading::decode(&[0x01, 0x03, 0x08], ResponseFormat::Ph);
        assert!(matches!(err, Err(MeterError::Frame { .. })));
    }

    #[test]
    fn test_reading_display_line() {
        let response =
            response_with_registers([0x00, 0x64, 0x17, 0x70, 0x00, 0x0A, 0x01, 0x2C]);
        let reading = Reading::decode(&response, ResponseFormat::Ph).unwrap();
        assert_eq!(reading.to_string(), "cf: 0.1, ph: 60, re: 0.1, temp: 30");
    }
}
