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

use crate::{sources, volume};
use anyhow::{Result, bail};
use audion_core::{AvrAttribute, AvrCommandSet, AvrStatus, ItemValue};
use tracing::debug;

/// Denon command set for the telnet line protocol
/// Maps generic AudION attributes to Denon wire commands and values
/// (protocol reference: Denon AVR control protocol V7.6.0)
pub struct DenonCommandSet;

impl DenonCommandSet {
    /// Create a new Denon command set
    pub fn new() -> Self {
        Self
    }

    /// Two-character wire command prefix for an attribute
    fn prefix(attribute: AvrAttribute) -> &'static str {
        match attribute {
            AvrAttribute::Power => "PW",
            AvrAttribute::Input => "SI",
            AvrAttribute::Volume => "MV",
            AvrAttribute::Mute => "MU",
        }
    }

    fn attribute_for(prefix: &str) -> Option<AvrAttribute> {
        match prefix {
            "PW" => Some(AvrAttribute::Power),
            "SI" => Some(AvrAttribute::Input),
            "MV" => Some(AvrAttribute::Volume),
            "MU" => Some(AvrAttribute::Mute),
            _ => None,
        }
    }
}

impl Default for DenonCommandSet {
    fn default() -> Self {
        Self::new()
    }
}

impl AvrCommandSet for DenonCommandSet {
    fn vendor_name(&self) -> &'static str {
        "Denon"
    }

    fn query(&self, attribute: AvrAttribute) -> String {
        format!("{}?", Self::prefix(attribute))
    }

    fn encode(&self, attribute: AvrAttribute, value: &ItemValue) -> Result<String> {
        let expected = attribute.item_type();
        if value.item_type() != expected {
            bail!(
                "Attribute '{}' takes {} values, got {}",
                attribute,
                expected,
                value.item_type()
            );
        }

        let line = match attribute {
            AvrAttribute::Power => {
                if value.as_bool().unwrap_or(false) {
                    "PWON".to_owned()
                } else {
                    "PWSTANDBY".to_owned()
                }
            }
            AvrAttribute::Mute => {
                if value.as_bool().unwrap_or(false) {
                    "MUON".to_owned()
                } else {
                    "MUOFF".to_owned()
                }
            }
            AvrAttribute::Input => {
                let name = value.as_str().unwrap_or_default();
                let Some(code) = sources::to_wire(name) else {
                    bail!(
                        "Unknown input source '{}'. Supported sources: {}",
                        name,
                        sources::display_names().collect::<Vec<_>>().join(", ")
                    );
                };
                format!("SI{code}")
            }
            AvrAttribute::Volume => {
                let level = value.as_num().unwrap_or(0.0);
                format!("MV{}", volume::encode(level))
            }
        };
        Ok(line)
    }

    fn decode(&self, event: &str) -> Option<AvrStatus> {
        // MVMAX reports the configured volume ceiling, not a volume change
        if let Some(rest) = event.strip_prefix("MVMAX") {
            let raw = rest.trim().rsplit(' ').next()?;
            let max = volume::decode(raw)?;
            debug!("Found new maximum master volume: {}", max);
            return Some(AvrStatus::MaxVolume(max));
        }

        // First two characters are the command, the rest is the value
        let prefix = event.get(..2)?;
        let rest = event.get(2..)?;
        let attribute = Self::attribute_for(prefix)?;

        let value = match attribute {
            AvrAttribute::Power | AvrAttribute::Mute => ItemValue::Bool(rest == "ON"),
            AvrAttribute::Volume => ItemValue::Num(volume::decode(rest)?),
            AvrAttribute::Input => ItemValue::Str(sources::from_wire(rest)?.to_owned()),
        };
        Some(AvrStatus::Update { attribute, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audion_core::ParsedBurst;

    #[test]
    fn test_queries() {
        let set = DenonCommandSet::new();
        assert_eq!(set.query(AvrAttribute::Power), "PW?");
        assert_eq!(set.query(AvrAttribute::Input), "SI?");
        assert_eq!(set.query(AvrAttribute::Volume), "MV?");
        assert_eq!(set.query(AvrAttribute::Mute), "MU?");
    }

    #[test]
    fn test_encode_power_and_mute() {
        let set = DenonCommandSet::new();
        assert_eq!(
            set.encode(AvrAttribute::Power, &ItemValue::Bool(true)).unwrap(),
            "PWON"
        );
        assert_eq!(
            set.encode(AvrAttribute::Power, &ItemValue::Bool(false)).unwrap(),
            "PWSTANDBY"
        );
        assert_eq!(
            set.encode(AvrAttribute::Mute, &ItemValue::Bool(false)).unwrap(),
            "MUOFF"
        );
    }

    #[test]
    fn test_encode_input() {
        let set = DenonCommandSet::new();
        assert_eq!(
            set.encode(
                AvrAttribute::Input,
                &ItemValue::Str("Media Player".to_owned())
            )
            .unwrap(),
            "SIMPLAY"
        );

        let err = set
            .encode(AvrAttribute::Input, &ItemValue::Str("Walkman".to_owned()))
            .unwrap_err();
        assert!(err.to_string().contains("Unknown input source"));
    }

    #[test]
    fn test_encode_volume_half_step() {
        let set = DenonCommandSet::new();
        assert_eq!(
            set.encode(AvrAttribute::Volume, &ItemValue::Num(50.5)).unwrap(),
            "MV505"
        );
        assert_eq!(
            set.encode(AvrAttribute::Volume, &ItemValue::Num(42.0)).unwrap(),
            "MV42"
        );
    }

    #[test]
    fn test_encode_rejects_wrong_type() {
        let set = DenonCommandSet::new();
        let err = set
            .encode(AvrAttribute::Power, &ItemValue::Num(1.0))
            .unwrap_err();
        assert!(err.to_string().contains("takes bool values"));
    }

    #[test]
    fn test_decode_events() {
        let set = DenonCommandSet::new();

        assert_eq!(
            set.decode("PWON"),
            Some(AvrStatus::Update {
                attribute: AvrAttribute::Power,
                value: ItemValue::Bool(true),
            })
        );
        assert_eq!(
            set.decode("PWSTANDBY"),
            Some(AvrStatus::Update {
                attribute: AvrAttribute::Power,
                value: ItemValue::Bool(false),
            })
        );
        assert_eq!(
            set.decode("MV505"),
            Some(AvrStatus::Update {
                attribute: AvrAttribute::Volume,
                value: ItemValue::Num(50.5),
            })
        );
        assert_eq!(
            set.decode("SIMPLAY"),
            Some(AvrStatus::Update {
                attribute: AvrAttribute::Input,
                value: ItemValue::Str("Media Player".to_owned()),
            })
        );
    }

    #[test]
    fn test_decode_mvmax() {
        let set = DenonCommandSet::new();
        assert_eq!(set.decode("MVMAX 80"), Some(AvrStatus::MaxVolume(80.0)));
        assert_eq!(set.decode("MVMAX 805"), Some(AvrStatus::MaxVolume(80.5)));
    }

    #[test]
    fn test_decode_unknown_events_dropped() {
        let set = DenonCommandSet::new();
        // Zone 2 and tuner events are not part of the command set
        assert_eq!(set.decode("Z2ON"), None);
        assert_eq!(set.decode("TFAN010250"), None);
        assert_eq!(set.decode("SIWEIRD"), None);
        assert_eq!(set.decode("X"), None);
    }

    #[test]
    fn test_parse_burst_mixed() {
        let set = DenonCommandSet::new();
        let burst = "PWON\rMV50\rMVMAX 80\rZ2ON\rMUOFF\r";

        let parsed = set.parse_burst(burst);
        assert_eq!(
            parsed,
            ParsedBurst {
                updates: vec![
                    (AvrAttribute::Power, ItemValue::Bool(true)),
                    (AvrAttribute::Volume, ItemValue::Num(50.0)),
                    (AvrAttribute::Mute, ItemValue::Bool(false)),
                ],
                max_volume: Some(80.0),
            }
        );
    }

    #[test]
    fn test_parse_burst_empty() {
        let set = DenonCommandSet::new();
        assert!(set.parse_burst("").is_empty());
        assert!(set.parse_burst("\r\r").is_empty());
    }
}
