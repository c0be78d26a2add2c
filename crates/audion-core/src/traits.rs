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

use crate::items::{ItemType, ItemValue};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Controllable attributes of an AV receiver
/// This enum defines everything AudION can read from or write to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvrAttribute {
    /// Power on / standby
    Power,
    /// Selected input source
    Input,
    /// Master volume in dB steps (half steps supported)
    Volume,
    /// Mute on / off
    Mute,
}

impl AvrAttribute {
    /// Item type an item must declare to bind to this attribute
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Power | Self::Mute => ItemType::Bool,
            Self::Input => ItemType::Str,
            Self::Volume => ItemType::Num,
        }
    }

    /// Get config string value, as used in items.conf bindings
    pub fn config_value(&self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Input => "input",
            Self::Volume => "volume",
            Self::Mute => "mute",
        }
    }

    /// List all controllable attributes
    pub fn all() -> &'static [AvrAttribute] {
        &[Self::Power, Self::Input, Self::Volume, Self::Mute]
    }
}

impl fmt::Display for AvrAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config_value())
    }
}

impl FromStr for AvrAttribute {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "power" => Ok(Self::Power),
            "input" => Ok(Self::Input),
            "volume" => Ok(Self::Volume),
            "mute" => Ok(Self::Mute),
            _ => Err(anyhow::anyhow!(
                "Unknown AVR attribute: '{}'. Supported attributes: {}",
                s,
                Self::all()
                    .iter()
                    .map(|a| a.config_value())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

/// One decoded event from a receiver status burst
#[derive(Debug, Clone, PartialEq)]
pub enum AvrStatus {
    /// An attribute reported a new value
    Update {
        attribute: AvrAttribute,
        value: ItemValue,
    },
    /// The receiver reported its configured maximum master volume
    MaxVolume(f64),
}

/// A fully parsed status burst: attribute updates plus any maximum-volume
/// report it carried
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBurst {
    pub updates: Vec<(AvrAttribute, ItemValue)>,
    pub max_volume: Option<f64>,
}

impl ParsedBurst {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.max_volume.is_none()
    }

    /// Value reported for one attribute, if the burst carried it
    pub fn value_of(&self, attribute: AvrAttribute) -> Option<&ItemValue> {
        self.updates
            .iter()
            .find(|(a, _)| *a == attribute)
            .map(|(_, v)| v)
    }
}

/// Vendor-specific command set
/// Maps generic attributes to the device's wire commands and back
pub trait AvrCommandSet: Send + Sync {
    /// Vendor name for logging
    fn vendor_name(&self) -> &'static str;

    /// Wire line querying the current value of an attribute (without the
    /// trailing `\r`), e.g. `PW?`
    fn query(&self, attribute: AvrAttribute) -> String;

    /// Encode an attribute write as a wire line (without the trailing `\r`).
    /// Fails when the value's type does not match the attribute or the value
    /// has no wire representation (e.g. an unknown input source name).
    fn encode(&self, attribute: AvrAttribute, value: &ItemValue) -> Result<String>;

    /// Decode a single status event. Events the command set does not know
    /// are dropped (`None`).
    fn decode(&self, event: &str) -> Option<AvrStatus>;

    /// Parse a raw `\r`-separated status burst
    fn parse_burst(&self, burst: &str) -> ParsedBurst {
        let mut parsed = ParsedBurst::default();
        for event in burst.split('\r') {
            let event = event.trim_matches(['\n', ' ']);
            if event.is_empty() {
                continue;
            }
            match self.decode(event) {
                Some(AvrStatus::Update { attribute, value }) => {
                    parsed.updates.push((attribute, value));
                }
                Some(AvrStatus::MaxVolume(max)) => parsed.max_volume = Some(max),
                None => {}
            }
        }
        parsed
    }
}

/// Generic data source for reading and writing device attributes
/// Business logic uses this trait, never knows about telnet details
#[async_trait]
pub trait AvrDataSource: Send + Sync {
    /// Read the current value of an attribute
    async fn read_attribute(&self, attribute: AvrAttribute) -> Result<ItemValue>;

    /// Write a value and return the rest of the acknowledgement burst
    /// (other status events the device piggybacked on the ack)
    async fn write_attribute(&self, attribute: AvrAttribute, value: &ItemValue)
    -> Result<ParsedBurst>;

    /// Check if the device is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Get data source name for logging
    fn name(&self) -> &str;
}
