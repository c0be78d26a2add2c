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

use crate::conf::ConfNode;
use bevy_ecs::prelude::Resource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Errors raised by the item registry
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("unknown item: '{0}'")]
    UnknownItem(String),

    #[error("item '{id}' has type {expected}, rejected {got} value")]
    TypeMismatch {
        id: String,
        expected: ItemType,
        got: ItemType,
    },

    #[error("item '{id}' declares unsupported type '{declared}' (must be: bool, num, or str)")]
    UnsupportedType { id: String, declared: String },

    #[error("item '{id}': cannot parse '{raw}' as {expected}")]
    UnparsableValue {
        id: String,
        raw: String,
        expected: ItemType,
    },
}

/// Declared type of an item, as written in items.conf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Bool,
    Num,
    Str,
}

impl ItemType {
    pub fn config_value(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Num => "num",
            Self::Str => "str",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config_value())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bool" => Ok(Self::Bool),
            "num" => Ok(Self::Num),
            "str" => Ok(Self::Str),
            other => Err(other.to_owned()),
        }
    }
}

/// A typed item value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    Bool(bool),
    Num(f64),
    Str(String),
}

impl ItemValue {
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Bool(_) => ItemType::Bool,
            Self::Num(_) => ItemType::Num,
            Self::Str(_) => ItemType::Str,
        }
    }

    /// Parse a conf-file string according to the declared item type.
    /// Booleans accept the usual truthy/falsy spellings.
    pub fn parse(item_type: ItemType, raw: &str) -> Option<ItemValue> {
        let raw = raw.trim();
        match item_type {
            ItemType::Bool => match raw.to_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Some(Self::Bool(true)),
                "false" | "0" | "off" | "no" => Some(Self::Bool(false)),
                _ => None,
            },
            ItemType::Num => raw.parse::<f64>().ok().map(Self::Num),
            ItemType::Str => Some(Self::Str(raw.to_owned())),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Num(_) | Self::Str(_) => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Bool(_) | Self::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Bool(_) | Self::Num(_) => None,
        }
    }
}

impl fmt::Display for ItemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// A single configured item: typed value plus the raw conf attributes
/// it was declared with
#[derive(Debug, Clone)]
pub struct Item {
    pub id: String,
    pub item_type: ItemType,
    value: ItemValue,
    prev_value: ItemValue,
    pub last_updated: DateTime<Utc>,
    pub last_caller: String,
    conf: HashMap<String, String>,
}

impl Item {
    pub fn new(id: impl Into<String>, item_type: ItemType) -> Self {
        let initial = match item_type {
            ItemType::Bool => ItemValue::Bool(false),
            ItemType::Num => ItemValue::Num(0.0),
            ItemType::Str => ItemValue::Str(String::new()),
        };
        Self {
            id: id.into(),
            item_type,
            value: initial.clone(),
            prev_value: initial,
            last_updated: Utc::now(),
            last_caller: String::new(),
            conf: HashMap::new(),
        }
    }

    pub fn value(&self) -> &ItemValue {
        &self.value
    }

    pub fn prev_value(&self) -> &ItemValue {
        &self.prev_value
    }

    /// Look up a raw conf attribute (e.g. `avr_attribute`)
    pub fn conf_get(&self, key: &str) -> Option<&str> {
        self.conf.get(key).map(String::as_str)
    }
}

/// Registry of all items declared in items.conf, keyed by dotted path
#[derive(Resource, Debug, Clone, Default)]
pub struct ItemRegistry {
    items: HashMap<String, Item>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a parsed items.conf tree. Every section with a
    /// `type` attribute becomes an item; sections without one are containers.
    pub fn from_conf(root: &ConfNode) -> Result<Self, ItemError> {
        let mut registry = Self::new();
        for (path, node) in root.walk() {
            let Some(declared) = node.get("type") else {
                continue;
            };
            let item_type =
                declared
                    .parse::<ItemType>()
                    .map_err(|declared| ItemError::UnsupportedType {
                        id: path.clone(),
                        declared,
                    })?;

            let mut item = Item::new(path.clone(), item_type);
            for (key, value) in &node.attributes {
                if key != "type" {
                    item.conf.insert(key.clone(), value.clone());
                }
            }
            // Optional initial value from the conf file
            if let Some(raw) = node.get("value") {
                let value =
                    ItemValue::parse(item_type, raw).ok_or_else(|| ItemError::UnparsableValue {
                        id: path.clone(),
                        raw: raw.to_owned(),
                        expected: item_type,
                    })?;
                item.value = value.clone();
                item.prev_value = value;
            }
            debug!("Registered item '{}' ({})", item.id, item.item_type);
            registry.items.insert(path, item);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, item: Item) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Update an item value, recording the previous value, the caller and
    /// the update time. The item's declared type never changes.
    pub fn update(&mut self, id: &str, value: ItemValue, caller: &str) -> Result<(), ItemError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| ItemError::UnknownItem(id.to_owned()))?;
        if value.item_type() != item.item_type {
            return Err(ItemError::TypeMismatch {
                id: id.to_owned(),
                expected: item.item_type,
                got: value.item_type(),
            });
        }
        item.prev_value = std::mem::replace(&mut item.value, value);
        item.last_updated = Utc::now();
        item.last_caller = caller.to_owned();
        Ok(())
    }

    /// Restore an item to its previous value. Used when a device write is
    /// not acknowledged and the optimistic update has to be rolled back.
    pub fn revert(&mut self, id: &str, caller: &str) -> Result<(), ItemError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| ItemError::UnknownItem(id.to_owned()))?;
        item.value = item.prev_value.clone();
        item.last_updated = Utc::now();
        item.last_caller = caller.to_owned();
        Ok(())
    }
}
