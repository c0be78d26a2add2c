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

//! Telnet line client for AV receivers.
//!
//! The receiver speaks a plain TCP line protocol framed by carriage
//! returns. It answers queries with one or more status lines and also
//! pushes unsolicited status whenever the front panel or remote changes
//! something, so every read collects a whole burst within a fixed window
//! instead of waiting for a single line.

use crate::errors::{AvrError, AvrResult};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::Instant;
use tracing::{debug, trace};

/// How long to collect response lines after sending a query or command
pub const RESPONSE_WINDOW: Duration = Duration::from_millis(200);

/// Extra settle time after powering the receiver on, before it accepts
/// further commands
pub const POWER_SETTLE: Duration = Duration::from_secs(1);

/// Timeout for establishing the TCP connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected telnet session with the receiver
#[derive(Debug)]
pub struct AvrClient {
    address: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    // partial line left over after the last '\r' of the previous read
    carry: String,
}

impl AvrClient {
    /// Connect to the receiver at `address` (host:port)
    pub async fn connect(address: &str, timeout: Duration) -> AvrResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| AvrError::ConnectTimeout {
                address: address.to_owned(),
                timeout,
            })?
            .map_err(|source| AvrError::ConnectFailed {
                address: address.to_owned(),
                source,
            })?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        debug!("✅ Connected to receiver at {}", address);
        Ok(Self {
            address: address.to_owned(),
            reader: BufReader::new(read_half),
            writer: write_half,
            carry: String::new(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send one command line, '\r' framed
    pub async fn send(&mut self, line: &str) -> AvrResult<()> {
        trace!("-> {}", line);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Collect everything the receiver sends within `window`.
    ///
    /// Returns the complete lines received, still '\r' framed. A partial
    /// line after the last '\r' is carried over to the next read so that
    /// frames split across TCP segments are never lost.
    pub async fn read_burst(&mut self, window: Duration) -> AvrResult<String> {
        let deadline = Instant::now() + window;
        let mut collected = std::mem::take(&mut self.carry);
        let mut buf = [0_u8; 1024];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.reader.read(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    if collected.is_empty() {
                        return Err(AvrError::ConnectionClosed);
                    }
                    break;
                }
                Ok(Ok(n)) => collected.push_str(&String::from_utf8_lossy(&buf[..n])),
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        match collected.rfind('\r') {
            Some(last) => {
                self.carry = collected[last + 1..].to_owned();
                collected.truncate(last + 1);
                trace!("<- {:?}", collected);
                Ok(collected)
            }
            None => {
                self.carry = collected;
                Ok(String::new())
            }
        }
    }

    /// Send a query and collect its response burst. The receiver is
    /// expected to answer a query; an empty burst is a timeout.
    pub async fn request(&mut self, query: &str, window: Duration) -> AvrResult<String> {
        self.send(query).await?;
        let burst = self.read_burst(window).await?;
        if burst.trim_matches(['\r', '\n', ' ']).is_empty() {
            return Err(AvrError::ResponseTimeout {
                query: query.to_owned(),
                window,
            });
        }
        Ok(burst)
    }

    /// Send a command line and collect whatever status the receiver
    /// echoes back. `settle` delays the read, used after power-on while
    /// the receiver boots its control interface. The burst may be empty;
    /// acknowledgement is judged by the caller.
    pub async fn command(&mut self, line: &str, settle: Option<Duration>) -> AvrResult<String> {
        self.send(line).await?;
        if let Some(delay) = settle {
            tokio::time::sleep(delay).await;
        }
        self.read_burst(RESPONSE_WINDOW).await
    }
}
