// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of AudION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Master-volume wire codec.
//!
//! The receiver speaks volume as two or three ASCII digits: `50` is 50 dB,
//! `505` is 50.5 dB. Writes are rounded to the nearest half step.

/// Maximum master volume assumed until the receiver reports its own
/// limit via `MVMAX`
pub const DEFAULT_MAX_VOLUME: f64 = 99.0;

/// Encode a master volume value for the wire, rounding to the nearest
/// half step: 50.0 -> `50`, 50.5 -> `505`
pub fn encode(value: f64) -> String {
    let rounded = (value * 2.0).round() / 2.0;
    let whole = rounded.trunc();
    if (rounded - whole).abs() < f64::EPSILON {
        format!("{}", whole as i64)
    } else {
        format!("{}5", whole as i64)
    }
}

/// Decode a master volume value received from the device: two digits are
/// whole steps, a trailing third digit marks a half step
pub fn decode(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw.len() {
        2 => raw.parse::<f64>().ok(),
        3 => raw.get(..2)?.parse::<f64>().ok().map(|v| v + 0.5),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_whole_steps() {
        assert_eq!(encode(50.0), "50");
        assert_eq!(encode(5.0), "5");
        assert_eq!(encode(99.0), "99");
    }

    #[test]
    fn test_encode_half_steps() {
        assert_eq!(encode(50.5), "505");
        assert_eq!(encode(32.5), "325");
    }

    #[test]
    fn test_encode_rounds_to_nearest_half() {
        assert_eq!(encode(50.2), "50");
        assert_eq!(encode(50.3), "505");
        assert_eq!(encode(50.7), "505");
        // 0.8 rounds up to the next whole step
        assert_eq!(encode(50.8), "51");
    }

    #[test]
    fn test_decode_two_and_three_digits() {
        assert_eq!(decode("50"), Some(50.0));
        assert_eq!(decode("505"), Some(50.5));
        assert_eq!(decode("99"), Some(99.0));
    }

    #[test]
    fn test_decode_garbage() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("5"), None);
        assert_eq!(decode("ON"), None);
        assert_eq!(decode("5055"), None);
    }

    #[test]
    fn test_round_trip() {
        for value in [18.0, 50.5, 80.0] {
            assert_eq!(decode(&encode(value)), Some(value));
        }
    }
}
