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

use anyhow::{Context, Result};
use audion_core::{AvrConfig, ConfNode, ItemRegistry};
use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Main application configuration - AudION
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Receiver connection configuration
    #[serde(default)]
    pub avr: AvrSection,

    /// System configuration
    #[serde(default)]
    pub system: SystemSection,

    /// Paths to the conf files
    #[serde(default)]
    pub files: FilesSection,
}

/// Receiver connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvrSection {
    /// Receiver IP address (must be an IP, not a hostname)
    pub host: String,

    /// Telnet control port
    pub port: u16,

    /// Polling interval for refreshing bound attributes (seconds)
    pub poll_interval_secs: u64,

    /// items.conf attribute key binding an item to the receiver
    pub binding_attr: String,
}

impl Default for AvrSection {
    fn default() -> Self {
        let defaults = AvrConfig::default();
        Self {
            host: defaults.host,
            port: defaults.port,
            poll_interval_secs: defaults.poll_interval.as_secs(),
            binding_attr: defaults.binding_attr,
        }
    }
}

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSection {
    /// Log level (debug, info, warn, error)
    pub log_level: String,

    /// ECS tick interval (milliseconds)
    pub tick_interval_ms: u64,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            tick_interval_ms: 100,
        }
    }
}

/// Locations of the conf files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    /// Plugin configuration (may override host and port)
    pub plugin_conf: String,

    /// Item declarations
    pub items_conf: String,

    /// Logic declarations (optional, logics are skipped when absent)
    pub logic_conf: String,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            plugin_conf: "etc/plugin.conf".to_owned(),
            items_conf: "etc/items.conf".to_owned(),
            logic_conf: "etc/logic.conf".to_owned(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            avr: AvrSection::default(),
            system: SystemSection::default(),
            files: FilesSection::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config.toml, falling back to defaults with
    /// environment variable overrides
    pub fn load() -> Result<Self> {
        if let Ok(config_str) = std::fs::read_to_string("config.toml") {
            let config: AppConfig =
                toml::from_str(&config_str).context("Failed to parse config.toml")?;
            info!("✅ Loaded configuration from config.toml");
            config.validate()?;
            return Ok(config);
        }

        warn!("No configuration file found, using defaults with environment overrides");
        let config = Self::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables (development/testing)
    fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("AVR_HOST") {
            config.avr.host = host;
        }
        if let Ok(port) = std::env::var("AVR_PORT")
            && let Ok(n) = port.parse::<u16>()
        {
            config.avr.port = n;
        }
        if let Ok(secs) = std::env::var("AVR_POLL_INTERVAL_SECS")
            && let Ok(n) = secs.parse::<u64>()
        {
            config.avr.poll_interval_secs = n;
        }

        config
    }

    /// Apply host and port overrides from a parsed plugin.conf tree. The
    /// first section carrying a `host` or `port` attribute wins.
    pub fn apply_plugin_conf(&mut self, root: &ConfNode) -> Result<()> {
        for (path, node) in root.walk() {
            let mut touched = false;
            if let Some(host) = node.get("host") {
                self.avr.host = host.to_owned();
                touched = true;
            }
            if let Some(port) = node.get("port") {
                self.avr.port = port
                    .parse::<u16>()
                    .with_context(|| format!("Section [{}]: invalid port '{}'", path, port))?;
                touched = true;
            }
            if touched {
                info!(
                    "✅ plugin.conf [{}] sets receiver {}:{}",
                    path, self.avr.host, self.avr.port
                );
                return Ok(());
            }
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.avr
            .host
            .parse::<IpAddr>()
            .map_err(|_| anyhow::anyhow!("avr.host must be an IP address, got '{}'", self.avr.host))?;

        if self.avr.port == 0 {
            anyhow::bail!("avr.port must be non-zero");
        }

        if self.avr.poll_interval_secs == 0 {
            anyhow::bail!("avr.poll_interval_secs must be at least 1 second");
        }
        if self.avr.poll_interval_secs > 600 {
            warn!(
                "avr.poll_interval_secs is very high ({}s), consider reducing",
                self.avr.poll_interval_secs
            );
        }

        if self.avr.binding_attr.is_empty() {
            anyhow::bail!("avr.binding_attr cannot be empty");
        }

        if self.system.tick_interval_ms < 10 {
            anyhow::bail!("system.tick_interval_ms must be at least 10 milliseconds");
        }

        Ok(())
    }

    /// Receiver address as host:port
    pub fn avr_address(&self) -> String {
        format!("{}:{}", self.avr.host, self.avr.port)
    }

    /// Build the plugin's config resource
    pub fn avr_config(&self) -> AvrConfig {
        AvrConfig {
            host: self.avr.host.clone(),
            port: self.avr.port,
            poll_interval: Duration::from_secs(self.avr.poll_interval_secs),
            binding_attr: self.avr.binding_attr.clone(),
        }
    }

    /// ECS tick interval as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.system.tick_interval_ms)
    }
}

/// One logic declared in logic.conf: a name and the items it watches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicBinding {
    pub name: String,
    pub watch_items: Vec<String>,
}

/// Resource: all logics declared in logic.conf
#[derive(Resource, Debug, Clone, Default)]
pub struct LogicBindings(pub Vec<LogicBinding>);

impl LogicBindings {
    /// Build logic bindings from a parsed logic.conf tree. Each section is
    /// a logic; `watch_item` attributes name the items that trigger it,
    /// comma-separated lists allowed.
    pub fn from_conf(root: &ConfNode) -> Self {
        let mut logics = Vec::new();
        for (path, node) in root.walk() {
            let watch_items: Vec<String> = node
                .attributes
                .iter()
                .filter(|(key, _)| key == "watch_item")
                .flat_map(|(_, value)| value.split(','))
                .map(|id| id.trim().to_owned())
                .filter(|id| !id.is_empty())
                .collect();
            if watch_items.is_empty() {
                continue;
            }
            logics.push(LogicBinding {
                name: path,
                watch_items,
            });
        }
        Self(logics)
    }

    /// Logics watching the given item
    pub fn watchers(&self, item_id: &str) -> impl Iterator<Item = &LogicBinding> {
        self.0
            .iter()
            .filter(move |logic| logic.watch_items.iter().any(|id| id == item_id))
    }
}

/// Parse a conf file from disk
pub fn load_conf(path: &str) -> Result<ConfNode> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read conf file '{}'", path))?;
    ConfNode::parse(&raw).with_context(|| format!("Failed to parse conf file '{}'", path))
}

/// Load the item registry from items.conf
pub fn load_items(path: &str) -> Result<ItemRegistry> {
    let root = load_conf(path)?;
    let registry = ItemRegistry::from_conf(&root)
        .with_context(|| format!("Invalid item declaration in '{}'", path))?;
    info!("✅ Loaded {} item(s) from {}", registry.len(), path);
    Ok(registry)
}

/// Load logic bindings from logic.conf, empty when the file is absent
pub fn load_logics(path: &str) -> Result<LogicBindings> {
    if !Path::new(path).exists() {
        info!("No logic.conf at {}, running without logics", path);
        return Ok(LogicBindings::default());
    }
    let root = load_conf(path)?;
    let logics = LogicBindings::from_conf(&root);
    info!("✅ Loaded {} logic(s) from {}", logics.0.len(), path);
    Ok(logics)
}
