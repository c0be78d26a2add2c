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

use std::time::Duration;
use thiserror::Error;

pub type AvrResult<T> = Result<T, AvrError>;

/// Errors raised while talking to the receiver over telnet
#[derive(Debug, Error)]
pub enum AvrError {
    #[error("Failed to connect to receiver at {address}: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to receiver at {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("I/O error on receiver connection: {0}")]
    Io(#[from] std::io::Error),

    #[error("Receiver sent no response to '{query}' within {window:?}")]
    ResponseTimeout { query: String, window: Duration },

    #[error("Receiver did not acknowledge command '{command}'")]
    NotAcknowledged { command: String },

    #[error("Receiver closed the connection")]
    ConnectionClosed,
}
