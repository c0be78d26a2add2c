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

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resource: connection parameters for the AV receiver
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct AvrConfig {
    /// Receiver IP address (must be an IP, not a hostname)
    pub host: String,
    /// Telnet control port
    pub port: u16,
    /// Polling interval for refreshing bound attributes
    pub poll_interval: Duration,
    /// items.conf attribute key that binds an item to the receiver,
    /// e.g. `avr_attribute = volume`
    pub binding_attr: String,
}

impl Default for AvrConfig {
    fn default() -> Self {
        Self {
            host: "10.10.10.10".to_owned(),
            // Denon receivers listen for control connections on the
            // standard telnet port
            port: 23,
            poll_interval: Duration::from_secs(30),
            binding_attr: "avr_attribute".to_owned(),
        }
    }
}
