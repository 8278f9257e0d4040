// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conversion between raw ERD payloads and typed values.
//!
//! Payloads travel as hex strings. Decoding is pure and never touches the
//! network. Encoding of composite ERDs (the cook mode records) needs the
//! current payload so that bytes outside the edited field are preserved.
//!
//! # Examples
//!
//! ```
//! use smarthq_lib::codec::{self, DecodedValue};
//! use smarthq_lib::erd::Erd;
//! use smarthq_lib::types::Temperature;
//!
//! assert_eq!(codec::decode(Erd::DoorStatus, "01").unwrap(), DecodedValue::Flag(true));
//!
//! let raw = codec::encode(
//!     Erd::UpperOvenCookMode,
//!     &DecodedValue::Temperature(Temperature::from_celsius(200.0)),
//!     Some("aa0096ff"),
//! )
//! .unwrap();
//! assert_eq!(raw, "aa0188ff");
//! ```

use serde::{Deserialize, Serialize};

use crate::erd::{Erd, ErdKind};
use crate::error::{DecodeError, EncodeError};
use crate::types::Temperature;

/// Byte offset of the target temperature inside a cook mode record.
const COOK_MODE_TEMPERATURE_OFFSET: usize = 1;

/// Minimum length of a cook mode record.
const COOK_MODE_MIN_LEN: usize = COOK_MODE_TEMPERATURE_OFFSET + 2;

/// Largest integer payload, in bytes.
const MAX_INTEGER_LEN: usize = 8;

/// Largest Fahrenheit payload, in bytes.
const MAX_FAHRENHEIT_LEN: usize = 2;

/// A decoded ERD payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DecodedValue {
    /// A boolean flag.
    Flag(bool),
    /// An unsigned integer.
    Integer(u64),
    /// A temperature.
    Temperature(Temperature),
    /// A cook mode record.
    CookMode(CookMode),
    /// Text.
    Text(String),
    /// Opaque bytes.
    Raw(Vec<u8>),
}

impl DecodedValue {
    /// Returns the flag value, if this is a flag.
    #[must_use]
    pub const fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Returns the temperature carried by this value.
    ///
    /// Cook mode records yield their target temperature.
    #[must_use]
    pub const fn as_temperature(&self) -> Option<Temperature> {
        match self {
            Self::Temperature(t) => Some(*t),
            Self::CookMode(mode) => Some(mode.target),
            _ => None,
        }
    }
}

/// A decoded cook mode record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookMode {
    /// Cook mode identifier (byte 0).
    pub mode: u8,
    /// Target temperature (bytes 1-2).
    pub target: Temperature,
    /// The complete record, including bytes this library does not interpret.
    pub payload: Vec<u8>,
}

/// Decodes a raw hex payload according to the ERD's catalog entry.
///
/// # Errors
///
/// Returns [`DecodeError`] if the payload is empty, not hex, or does not
/// fit the ERD's value type.
pub fn decode(erd: Erd, raw: &str) -> Result<DecodedValue, DecodeError> {
    let bytes = parse_hex(erd, raw)?;

    match erd.kind() {
        ErdKind::Flag => Ok(DecodedValue::Flag(bytes.iter().any(|b| *b != 0))),
        ErdKind::Integer => {
            check_max_len(erd, &bytes, MAX_INTEGER_LEN)?;
            Ok(DecodedValue::Integer(be_integer(&bytes)))
        }
        ErdKind::Fahrenheit => {
            check_max_len(erd, &bytes, MAX_FAHRENHEIT_LEN)?;
            let fahrenheit = u16::try_from(be_integer(&bytes)).map_err(|_| {
                DecodeError::PayloadTooLong {
                    erd,
                    max: MAX_FAHRENHEIT_LEN,
                    actual: bytes.len(),
                }
            })?;
            Ok(DecodedValue::Temperature(Temperature::from_fahrenheit(
                fahrenheit,
            )))
        }
        ErdKind::CookMode => decode_cook_mode(erd, bytes).map(DecodedValue::CookMode),
        ErdKind::Ascii => {
            let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            let text = std::str::from_utf8(&bytes[..end])
                .map_err(|_| DecodeError::InvalidText { erd })?;
            Ok(DecodedValue::Text(text.to_string()))
        }
        ErdKind::Raw => Ok(DecodedValue::Raw(bytes)),
    }
}

/// Encodes a value for writing.
///
/// `current_raw` is the latest known payload. It is required for cook mode
/// records and sets the field width for integers and temperatures.
///
/// # Errors
///
/// Returns [`EncodeError`] if the value type does not match the ERD, the
/// value does not fit, or a composite ERD has no current payload.
pub fn encode(
    erd: Erd,
    value: &DecodedValue,
    current_raw: Option<&str>,
) -> Result<String, EncodeError> {
    let mismatch = || EncodeError::TypeMismatch {
        erd,
        expected: erd.kind().as_str(),
    };

    match (erd.kind(), value) {
        (ErdKind::Flag, DecodedValue::Flag(flag)) => {
            Ok(if *flag { "01" } else { "00" }.to_string())
        }
        (ErdKind::Integer, DecodedValue::Integer(n)) => {
            let width = current_width(erd, current_raw)?;
            encode_integer(erd, *n, width)
        }
        (ErdKind::Fahrenheit, DecodedValue::Temperature(t)) => {
            let fahrenheit = to_wire_fahrenheit(erd, *t)?;
            let width = current_width(erd, current_raw)?.or(Some(MAX_FAHRENHEIT_LEN));
            encode_integer(erd, u64::from(fahrenheit), width)
        }
        (ErdKind::CookMode, DecodedValue::Temperature(t)) => {
            let current = current_raw.ok_or(EncodeError::MissingPayload { erd })?;
            set_cook_mode_temperature(erd, current, *t)
        }
        (ErdKind::CookMode, DecodedValue::CookMode(mode)) => {
            let mut record = decode_cook_mode(erd, mode.payload.clone())?.payload;
            record[0] = mode.mode;
            write_fahrenheit(&mut record, to_wire_fahrenheit(erd, mode.target)?);
            Ok(hex::encode(record))
        }
        (ErdKind::Ascii, DecodedValue::Text(text)) => Ok(hex::encode(text.as_bytes())),
        (ErdKind::Raw, DecodedValue::Raw(bytes)) => Ok(hex::encode(bytes)),
        _ => Err(mismatch()),
    }
}

/// Rewrites the target temperature of a cook mode record.
///
/// Every byte other than the temperature field is preserved.
///
/// # Errors
///
/// Returns [`EncodeError`] if `current_raw` is not a cook mode record or the
/// temperature does not fit in the field.
pub fn set_cook_mode_temperature(
    erd: Erd,
    current_raw: &str,
    target: Temperature,
) -> Result<String, EncodeError> {
    let mut record = decode_cook_mode(erd, parse_hex(erd, current_raw)?)?.payload;
    write_fahrenheit(&mut record, to_wire_fahrenheit(erd, target)?);
    Ok(hex::encode(record))
}

fn parse_hex(erd: Erd, raw: &str) -> Result<Vec<u8>, DecodeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DecodeError::Empty { erd });
    }
    hex::decode(raw).map_err(|_| DecodeError::InvalidHex {
        erd,
        raw: raw.to_string(),
    })
}

fn check_max_len(erd: Erd, bytes: &[u8], max: usize) -> Result<(), DecodeError> {
    if bytes.len() > max {
        return Err(DecodeError::PayloadTooLong {
            erd,
            max,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn be_integer(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0_u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

fn decode_cook_mode(erd: Erd, bytes: Vec<u8>) -> Result<CookMode, DecodeError> {
    if bytes.len() < COOK_MODE_MIN_LEN {
        return Err(DecodeError::PayloadTooShort {
            erd,
            expected: COOK_MODE_MIN_LEN,
            actual: bytes.len(),
        });
    }
    let fahrenheit = u16::from_be_bytes([
        bytes[COOK_MODE_TEMPERATURE_OFFSET],
        bytes[COOK_MODE_TEMPERATURE_OFFSET + 1],
    ]);
    Ok(CookMode {
        mode: bytes[0],
        target: Temperature::from_fahrenheit(fahrenheit),
        payload: bytes,
    })
}

fn write_fahrenheit(record: &mut [u8], fahrenheit: u16) {
    record[COOK_MODE_TEMPERATURE_OFFSET..COOK_MODE_MIN_LEN]
        .copy_from_slice(&fahrenheit.to_be_bytes());
}

fn to_wire_fahrenheit(erd: Erd, t: Temperature) -> Result<u16, EncodeError> {
    t.to_fahrenheit().ok_or_else(|| EncodeError::OutOfRange {
        erd,
        value: t.to_string(),
    })
}

/// Width of the current payload in bytes, if one is known and valid.
fn current_width(erd: Erd, current_raw: Option<&str>) -> Result<Option<usize>, EncodeError> {
    current_raw
        .map(|raw| parse_hex(erd, raw).map(|bytes| bytes.len()))
        .transpose()
        .map_err(EncodeError::from)
}

fn encode_integer(erd: Erd, n: u64, width: Option<usize>) -> Result<String, EncodeError> {
    let full = n.to_be_bytes();
    let significant = full.iter().position(|b| *b != 0).unwrap_or(full.len() - 1);
    let minimal = &full[significant..];

    let width = width.unwrap_or(minimal.len());
    if minimal.len() > width {
        return Err(EncodeError::OutOfRange {
            erd,
            value: n.to_string(),
        });
    }

    let mut out = vec![0_u8; width - minimal.len()];
    out.extend_from_slice(minimal);
    Ok(hex::encode(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_decoding() {
        assert_eq!(decode(Erd::DoorStatus, "00"), Ok(DecodedValue::Flag(false)));
        assert_eq!(decode(Erd::DoorStatus, "01"), Ok(DecodedValue::Flag(true)));
        assert_eq!(decode(Erd::DoorStatus, "02"), Ok(DecodedValue::Flag(true)));
        assert_eq!(decode(Erd::DoorStatus, "0000"), Ok(DecodedValue::Flag(false)));
        assert_eq!(decode(Erd::DoorStatus, "0100"), Ok(DecodedValue::Flag(true)));
    }

    #[test]
    fn flag_encoding() {
        let on = DecodedValue::Flag(true);
        let off = DecodedValue::Flag(false);
        assert_eq!(encode(Erd::UpperOvenLight, &on, None).unwrap(), "01");
        assert_eq!(encode(Erd::UpperOvenLight, &off, Some("01")).unwrap(), "00");
    }

    #[test]
    fn every_flag_erd_round_trips() {
        let flags = Erd::all().iter().filter(|erd| erd.kind() == ErdKind::Flag);
        for erd in flags {
            for flag in [false, true] {
                let raw = encode(*erd, &DecodedValue::Flag(flag), None).unwrap();
                assert_eq!(decode(*erd, &raw), Ok(DecodedValue::Flag(flag)), "{erd}");
            }
        }
    }

    #[test]
    fn cook_mode_celsius_range_round_trips() {
        for celsius in 38..=288_i32 {
            let target = Temperature::from_celsius(f64::from(celsius));
            let raw = set_cook_mode_temperature(Erd::UpperOvenCookMode, "aa0096ff", target)
                .unwrap();
            assert!(raw.starts_with("aa") && raw.ends_with("ff"), "{raw}");

            let decoded = decode(Erd::UpperOvenCookMode, &raw)
                .unwrap()
                .as_temperature()
                .unwrap();
            let drift = (decoded.celsius() - f64::from(celsius)).abs();
            assert!(drift <= 1.0, "{celsius}°C came back as {decoded}");
        }
    }

    #[test]
    fn cook_mode_decoding() {
        let value = decode(Erd::UpperOvenCookMode, "0901590000").unwrap();
        let DecodedValue::CookMode(mode) = value else {
            panic!("expected cook mode, got {value:?}");
        };
        assert_eq!(mode.mode, 0x09);
        assert_eq!(mode.target.to_fahrenheit(), Some(0x0159));
        assert_eq!(mode.payload, vec![0x09, 0x01, 0x59, 0x00, 0x00]);
    }

    #[test]
    fn cook_mode_write_preserves_other_bytes() {
        let raw = set_cook_mode_temperature(
            Erd::UpperOvenCookMode,
            "AA0096FF",
            Temperature::from_celsius(200.0),
        )
        .unwrap();
        assert_eq!(raw, "aa0188ff");
    }

    #[test]
    fn cook_mode_write_requires_current_payload() {
        let err = encode(
            Erd::LowerOvenCookMode,
            &DecodedValue::Temperature(Temperature::from_celsius(180.0)),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            EncodeError::MissingPayload {
                erd: Erd::LowerOvenCookMode
            }
        );
    }

    #[test]
    fn cook_mode_record_is_re_encoded() {
        let DecodedValue::CookMode(mut mode) = decode(Erd::UpperOvenCookMode, "01015e00").unwrap()
        else {
            panic!("expected cook mode");
        };
        mode.mode = 0x02;
        mode.target = Temperature::from_fahrenheit(400);
        let raw = encode(Erd::UpperOvenCookMode, &DecodedValue::CookMode(mode), None).unwrap();
        assert_eq!(raw, "02019000");
    }

    #[test]
    fn short_cook_mode_is_rejected() {
        assert_eq!(
            decode(Erd::UpperOvenCookMode, "0901"),
            Err(DecodeError::PayloadTooShort {
                erd: Erd::UpperOvenCookMode,
                expected: 3,
                actual: 2,
            })
        );
    }

    #[test]
    fn integer_round_trip_keeps_width() {
        assert_eq!(
            decode(Erd::UpperOvenCookTimeRemaining, "003c"),
            Ok(DecodedValue::Integer(60))
        );
        assert_eq!(
            encode(
                Erd::UpperOvenCookTimeRemaining,
                &DecodedValue::Integer(90),
                Some("003c")
            )
            .unwrap(),
            "005a"
        );
        assert_eq!(
            encode(Erd::SoundLevel, &DecodedValue::Integer(0), None).unwrap(),
            "00"
        );
    }

    #[test]
    fn integer_overflowing_width_is_rejected() {
        let err = encode(Erd::SoundLevel, &DecodedValue::Integer(256), Some("03")).unwrap_err();
        assert!(matches!(err, EncodeError::OutOfRange { .. }));
    }

    #[test]
    fn integer_too_long_is_rejected() {
        assert!(matches!(
            decode(Erd::ElapsedOnTime, "000000000000000001"),
            Err(DecodeError::PayloadTooLong { max: 8, .. })
        ));
    }

    #[test]
    fn fahrenheit_values() {
        let value = decode(Erd::UpperOvenDisplayTemperature, "015e").unwrap();
        assert_eq!(
            value.as_temperature().and_then(Temperature::to_fahrenheit),
            Some(350)
        );
        assert_eq!(
            encode(
                Erd::HotWaterSetTemp,
                &DecodedValue::Temperature(Temperature::from_fahrenheit(190)),
                Some("be")
            )
            .unwrap(),
            "be"
        );
        assert_eq!(
            encode(
                Erd::UpperOvenProbeDisplayTemp,
                &DecodedValue::Temperature(Temperature::from_fahrenheit(140)),
                None
            )
            .unwrap(),
            "008c"
        );
    }

    #[test]
    fn ascii_trims_nul_padding() {
        assert_eq!(
            decode(Erd::ModelNumber, "4a5453353030000000"),
            Ok(DecodedValue::Text("JTS500".to_string()))
        );
        assert_eq!(
            encode(Erd::ModelNumber, &DecodedValue::Text("AB".into()), None).unwrap(),
            "4142"
        );
    }

    #[test]
    fn raw_passthrough() {
        assert_eq!(
            decode(Erd::ClockTime, "0c1e00"),
            Ok(DecodedValue::Raw(vec![0x0c, 0x1e, 0x00]))
        );
    }

    #[test]
    fn malformed_payloads() {
        assert_eq!(
            decode(Erd::DoorStatus, ""),
            Err(DecodeError::Empty {
                erd: Erd::DoorStatus
            })
        );
        assert!(matches!(
            decode(Erd::DoorStatus, "zz"),
            Err(DecodeError::InvalidHex { .. })
        ));
        assert!(matches!(
            decode(Erd::DoorStatus, "123"),
            Err(DecodeError::InvalidHex { .. })
        ));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let err = encode(Erd::DoorStatus, &DecodedValue::Integer(1), None).unwrap_err();
        assert_eq!(
            err,
            EncodeError::TypeMismatch {
                erd: Erd::DoorStatus,
                expected: "flag"
            }
        );
    }
}
