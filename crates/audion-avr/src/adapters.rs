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

//! Adapter connecting the generic `AvrDataSource` trait to a real
//! receiver over the telnet client, using a vendor command set for the
//! wire dialect.

use crate::client::{AvrClient, CONNECT_TIMEOUT, POWER_SETTLE, RESPONSE_WINDOW};
use crate::errors::AvrError;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use audion_core::{AvrAttribute, AvrCommandSet, AvrDataSource, AvrStatus, ItemValue, ParsedBurst};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default maximum master volume until the receiver reports its own
/// limit via the vendor protocol
const DEFAULT_MAX_VOLUME: f64 = 99.0;

/// Telnet-backed data source for one receiver
pub struct TelnetAvrAdapter {
    address: String,
    name: String,
    commands: Arc<dyn AvrCommandSet>,
    // lazily connected, dropped on I/O failure so the next call reconnects
    connection: Mutex<Option<AvrClient>>,
    max_volume: RwLock<f64>,
}

impl TelnetAvrAdapter {
    pub fn new(address: impl Into<String>, commands: Arc<dyn AvrCommandSet>) -> Self {
        let address = address.into();
        let name = format!("{} AVR at {}", commands.vendor_name(), address);
        Self {
            address,
            name,
            commands,
            connection: Mutex::new(None),
            max_volume: RwLock::new(DEFAULT_MAX_VOLUME),
        }
    }

    /// Maximum master volume the receiver last reported
    pub fn max_volume(&self) -> f64 {
        *self.max_volume.read()
    }

    fn note_max_volume(&self, parsed: &ParsedBurst) {
        if let Some(max) = parsed.max_volume {
            let mut current = self.max_volume.write();
            if (*current - max).abs() > f64::EPSILON {
                info!("Receiver reports maximum master volume {}", max);
                *current = max;
            }
        }
    }

    /// Run a query and parse the response burst, reconnecting lazily and
    /// dropping the session on I/O failure
    async fn query(&self, attribute: AvrAttribute) -> Result<ParsedBurst> {
        let line = self.commands.query(attribute);
        let mut conn = self.connection.lock().await;
        let client = match conn.as_mut() {
            Some(client) => client,
            None => conn.insert(AvrClient::connect(&self.address, CONNECT_TIMEOUT).await?),
        };

        match client.request(&line, RESPONSE_WINDOW).await {
            Ok(burst) => {
                let parsed = self.commands.parse_burst(&burst);
                self.note_max_volume(&parsed);
                Ok(parsed)
            }
            Err(e) => {
                *conn = None;
                Err(e.into())
            }
        }
    }

    /// Send a command line and parse whatever the receiver echoed back
    async fn send_command(&self, line: &str, settle: Option<Duration>) -> Result<ParsedBurst> {
        let mut conn = self.connection.lock().await;
        let client = match conn.as_mut() {
            Some(client) => client,
            None => conn.insert(AvrClient::connect(&self.address, CONNECT_TIMEOUT).await?),
        };

        match client.command(line, settle).await {
            Ok(burst) => {
                let parsed = self.commands.parse_burst(&burst);
                self.note_max_volume(&parsed);
                Ok(parsed)
            }
            Err(e) => {
                *conn = None;
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl AvrDataSource for TelnetAvrAdapter {
    async fn read_attribute(&self, attribute: AvrAttribute) -> Result<ItemValue> {
        let parsed = self
            .query(attribute)
            .await
            .with_context(|| format!("Failed to query {} from {}", attribute, self.name))?;

        parsed
            .value_of(attribute)
            .cloned()
            .ok_or_else(|| anyhow!("Receiver answered the {} query without a value", attribute))
    }

    async fn write_attribute(
        &self,
        attribute: AvrAttribute,
        value: &ItemValue,
    ) -> Result<ParsedBurst> {
        // keep writes below the receiver's own volume ceiling
        let adjusted;
        let value = match (attribute, value) {
            (AvrAttribute::Volume, ItemValue::Num(level)) => {
                let max = self.max_volume();
                if *level > max {
                    warn!("⚠️ Requested volume {} above maximum {}, clamping", level, max);
                    adjusted = ItemValue::Num(max);
                    &adjusted
                } else {
                    value
                }
            }
            _ => value,
        };

        let line = self.commands.encode(attribute, value)?;

        // powering on takes the control interface a moment to come back
        let settle = matches!(
            (attribute, value),
            (AvrAttribute::Power, ItemValue::Bool(true))
        )
        .then_some(POWER_SETTLE);

        let parsed = self
            .send_command(&line, settle)
            .await
            .with_context(|| format!("Failed to send '{}' to {}", line, self.name))?;

        // the receiver echoes the new state back; compare against what the
        // command itself decodes to
        let expected = match self.commands.decode(&line) {
            Some(AvrStatus::Update { value, .. }) => value,
            _ => {
                debug!("Command '{}' has no decodable echo, skipping ack check", line);
                return Ok(parsed);
            }
        };

        match parsed.value_of(attribute) {
            Some(echoed) if *echoed == expected => Ok(parsed),
            _ => Err(AvrError::NotAcknowledged {
                command: line.clone(),
            }
            .into()),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self.query(AvrAttribute::Power).await {
            Ok(parsed) => Ok(parsed.value_of(AvrAttribute::Power).is_some()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audion_denon::DenonCommandSet;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn spawn_fake(script: Vec<(&'static str, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            let mut buf = [0_u8; 256];
            for (expect, reply) in script {
                loop {
                    if let Some(pos) = received.find('\r') {
                        let line: String = received.drain(..=pos).collect();
                        assert_eq!(line.trim_end_matches('\r'), expect);
                        break;
                    }
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        return;
                    }
                    received.push_str(&String::from_utf8_lossy(&buf[..n]));
                }
                if !reply.is_empty() {
                    socket.write_all(reply.as_bytes()).await.unwrap();
                }
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        });
        address
    }

    fn adapter(address: &str) -> TelnetAvrAdapter {
        TelnetAvrAdapter::new(address, Arc::new(DenonCommandSet::new()))
    }

    #[tokio::test]
    async fn test_read_attribute() {
        let address = spawn_fake(vec![("MV?", "MV505\rMVMAX 80\r")]).await;
        let source = adapter(&address);

        let value = source.read_attribute(AvrAttribute::Volume).await.unwrap();
        assert_eq!(value, ItemValue::Num(50.5));
        assert_eq!(source.max_volume(), 80.0);
    }

    #[tokio::test]
    async fn test_write_acknowledged() {
        let address = spawn_fake(vec![("MUON", "MUON\r")]).await;
        let source = adapter(&address);

        let parsed = source
            .write_attribute(AvrAttribute::Mute, &ItemValue::Bool(true))
            .await
            .unwrap();
        assert_eq!(
            parsed.value_of(AvrAttribute::Mute),
            Some(&ItemValue::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_write_not_acknowledged() {
        // receiver stays silent, the write must fail
        let address = spawn_fake(vec![("SIGAME", "")]).await;
        let source = adapter(&address);

        let err = source
            .write_attribute(AvrAttribute::Input, &ItemValue::Str("Game".to_owned()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not acknowledge"));
    }

    #[tokio::test]
    async fn test_volume_clamped_to_reported_maximum() {
        let address = spawn_fake(vec![("MV?", "MV50\rMVMAX 60\r"), ("MV60", "MV60\r")]).await;
        let source = adapter(&address);

        source.read_attribute(AvrAttribute::Volume).await.unwrap();
        let parsed = source
            .write_attribute(AvrAttribute::Volume, &ItemValue::Num(75.0))
            .await
            .unwrap();
        assert_eq!(
            parsed.value_of(AvrAttribute::Volume),
            Some(&ItemValue::Num(60.0))
        );
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let source = adapter("127.0.0.1:1");
        assert!(!source.health_check().await.unwrap());
    }
}
