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

//! Bevy plugin wiring the receiver into the item world.
//!
//! Items carrying the binding attribute in items.conf are bound to
//! receiver attributes at startup. Writes to bound items go to the
//! device; device status comes back over a channel and is applied to
//! the items, tagged with this plugin's caller name so the write system
//! can tell its own echoes from genuine user changes.

use crate::adapters::TelnetAvrAdapter;
use audion_core::{
    AvrAttribute, AvrCommandSet, AvrConfig, AvrDataSource, Item, ItemRegistry, ItemValue,
};
use bevy_app::prelude::*;
use bevy_ecs::prelude::*;
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Caller name the plugin stamps on item updates it applies itself
pub const PLUGIN_CALLER: &str = "avr";

/// Message: request to write a bound item's value to the receiver
#[derive(Message, Debug, Clone)]
pub struct AvrWrite {
    pub item_id: String,
    pub value: ItemValue,
    pub caller: String,
}

/// Message: an item value changed, emitted for every applied update
#[derive(Message, Debug, Clone)]
pub struct ItemUpdated {
    pub id: String,
    pub caller: String,
}

/// Resource: the vendor command set the data source is built with
#[derive(Resource, Clone)]
pub struct AvrCommandSetResource(pub Arc<dyn AvrCommandSet>);

/// Resource: the device behind the plugin
#[derive(Resource, Clone)]
pub struct AvrDataSourceResource(pub Arc<dyn AvrDataSource>);

/// Resource: which items are bound to which receiver attributes
#[derive(Resource, Debug, Default)]
pub struct AvrBindings {
    pub by_attribute: HashMap<AvrAttribute, Vec<String>>,
    pub by_item: HashMap<String, AvrAttribute>,
}

/// Resource: internal ticker for polling
#[derive(Resource, Default)]
struct AvrPollTicker(Option<std::time::Instant>);

/// Device status and write outcomes flowing back from async tasks
enum AvrFeedback {
    Status {
        attribute: AvrAttribute,
        value: ItemValue,
    },
    WriteFailed {
        item_id: String,
    },
}

/// Resource: channel bridging async device tasks into the ECS world
#[derive(Resource)]
struct AvrFeedbackChannel {
    sender: Sender<AvrFeedback>,
    receiver: Receiver<AvrFeedback>,
}

impl Default for AvrFeedbackChannel {
    fn default() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }
}

pub struct AvrPlugin;

impl Plugin for AvrPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(AvrConfig::default())
            .insert_resource(AvrBindings::default())
            .insert_resource(AvrPollTicker::default())
            .insert_resource(AvrFeedbackChannel::default())
            .add_message::<AvrWrite>()
            .add_message::<ItemUpdated>()
            .add_systems(Startup, (avr_init_config_system, avr_connect_system).chain())
            .add_systems(PostStartup, avr_bind_items_system)
            .add_systems(Update, avr_poll_system)
            .add_systems(Update, avr_write_system)
            .add_systems(Update, avr_drain_feedback_system);
    }
}

/// Initialize AVR config from environment variables if present
fn avr_init_config_system(mut cfg: ResMut<AvrConfig>) {
    if let Ok(host) = std::env::var("AVR_HOST") {
        cfg.host = host;
    }
    if let Ok(port) = std::env::var("AVR_PORT")
        && let Ok(n) = port.parse::<u16>()
    {
        cfg.port = n;
    }
    if let Ok(secs) = std::env::var("AVR_POLL_INTERVAL_SECS")
        && let Ok(n) = secs.parse::<u64>()
    {
        cfg.poll_interval = Duration::from_secs(n);
    }
}

/// System: build the data source from the final config, after env
/// overrides have been applied. The probe only logs reachability; the
/// adapter reconnects on its own during normal operation.
fn avr_connect_system(
    mut commands: Commands,
    cfg: Res<AvrConfig>,
    command_set: Res<AvrCommandSetResource>,
) {
    let address = format!("{}:{}", cfg.host, cfg.port);
    let source: Arc<dyn AvrDataSource> =
        Arc::new(TelnetAvrAdapter::new(address, command_set.0.clone()));
    info!("🔌 Receiver data source: {}", source.name());

    let probe = source.clone();
    tokio::spawn(async move {
        match probe.health_check().await {
            Ok(true) => info!("✅ Receiver is reachable"),
            _ => warn!("⚠️ Receiver not reachable yet, will keep retrying"),
        }
    });

    commands.insert_resource(AvrDataSourceResource(source));
}

/// System: bind items carrying the binding attribute to receiver
/// attributes. Misdeclared items are skipped with an error, never fatal.
fn avr_bind_items_system(
    cfg: Res<AvrConfig>,
    registry: Res<ItemRegistry>,
    mut bindings: ResMut<AvrBindings>,
) {
    for item in registry.iter() {
        let Some(raw) = item.conf_get(&cfg.binding_attr) else {
            continue;
        };
        let attribute = match raw.parse::<AvrAttribute>() {
            Ok(attribute) => attribute,
            Err(e) => {
                error!("❌ Item '{}': {}", item.id, e);
                continue;
            }
        };
        if item.item_type != attribute.item_type() {
            error!(
                "❌ Item '{}' is declared {} but the {} attribute needs {}, skipping",
                item.id,
                item.item_type,
                attribute,
                attribute.item_type()
            );
            continue;
        }
        debug!("Bound item '{}' to AVR attribute '{}'", item.id, attribute);
        bindings
            .by_attribute
            .entry(attribute)
            .or_default()
            .push(item.id.clone());
        bindings.by_item.insert(item.id.clone(), attribute);
    }

    if bindings.by_item.is_empty() {
        warn!("⚠️ No items bound to the receiver, nothing to control");
    } else {
        info!(
            "✅ Bound {} item(s) across {} receiver attribute(s)",
            bindings.by_item.len(),
            bindings.by_attribute.len()
        );
    }
}

/// System: periodically refresh every bound attribute from the device.
/// The first tick runs immediately, which doubles as the startup refresh.
fn avr_poll_system(
    mut ticker: ResMut<AvrPollTicker>,
    cfg: Res<AvrConfig>,
    bindings: Res<AvrBindings>,
    source: Res<AvrDataSourceResource>,
    channel: Res<AvrFeedbackChannel>,
) {
    let now = std::time::Instant::now();
    if let Some(last) = ticker.0
        && now.duration_since(last) < cfg.poll_interval
    {
        return;
    }
    ticker.0 = Some(now);

    for &attribute in bindings.by_attribute.keys() {
        let source = source.0.clone();
        let sender = channel.sender.clone();
        tokio::spawn(async move {
            match source.read_attribute(attribute).await {
                Ok(value) => {
                    let _ = sender.send(AvrFeedback::Status { attribute, value });
                }
                Err(e) => warn!("⚠️ Poll of {} failed: {}", attribute, e),
            }
        });
    }
}

/// System: push item writes to the device. The item is updated
/// optimistically; a failed or unacknowledged write is rolled back when
/// the feedback arrives.
fn avr_write_system(
    mut writes: MessageReader<AvrWrite>,
    bindings: Res<AvrBindings>,
    mut registry: ResMut<ItemRegistry>,
    mut updated: MessageWriter<ItemUpdated>,
    source: Res<AvrDataSourceResource>,
    channel: Res<AvrFeedbackChannel>,
) {
    for write in writes.read() {
        // updates the plugin applied itself must not bounce back to the device
        if write.caller == PLUGIN_CALLER {
            continue;
        }
        let Some(&attribute) = bindings.by_item.get(&write.item_id) else {
            warn!("⚠️ Write to unbound item '{}' ignored", write.item_id);
            continue;
        };

        if let Err(e) = registry.update(&write.item_id, write.value.clone(), &write.caller) {
            error!("❌ {}", e);
            continue;
        }
        updated.write(ItemUpdated {
            id: write.item_id.clone(),
            caller: write.caller.clone(),
        });

        let source = source.0.clone();
        let sender = channel.sender.clone();
        let item_id = write.item_id.clone();
        let value = write.value.clone();
        tokio::spawn(async move {
            match source.write_attribute(attribute, &value).await {
                Ok(parsed) => {
                    // the ack burst may carry other status changes, and a
                    // clamped volume write echoes the value actually set
                    for (attribute, value) in parsed.updates {
                        let _ = sender.send(AvrFeedback::Status { attribute, value });
                    }
                }
                Err(e) => {
                    error!("❌ Write of {} = {} failed: {}", attribute, value, e);
                    let _ = sender.send(AvrFeedback::WriteFailed { item_id });
                }
            }
        });
    }
}

/// System: apply device feedback to the item world
fn avr_drain_feedback_system(
    channel: Res<AvrFeedbackChannel>,
    bindings: Res<AvrBindings>,
    mut registry: ResMut<ItemRegistry>,
    mut updated: MessageWriter<ItemUpdated>,
) {
    while let Ok(feedback) = channel.receiver.try_recv() {
        match feedback {
            AvrFeedback::Status { attribute, value } => {
                let Some(item_ids) = bindings.by_attribute.get(&attribute) else {
                    continue;
                };
                for item_id in item_ids {
                    if registry.get(item_id).map(Item::value) == Some(&value) {
                        continue;
                    }
                    match registry.update(item_id, value.clone(), PLUGIN_CALLER) {
                        Ok(()) => {
                            debug!("Item '{}' <- {} (device)", item_id, value);
                            updated.write(ItemUpdated {
                                id: item_id.clone(),
                                caller: PLUGIN_CALLER.to_owned(),
                            });
                        }
                        Err(e) => error!("❌ {}", e),
                    }
                }
            }
            AvrFeedback::WriteFailed { item_id } => match registry.revert(&item_id, PLUGIN_CALLER)
            {
                Ok(()) => {
                    warn!("⚠️ Reverted item '{}' after failed write", item_id);
                    updated.write(ItemUpdated {
                        id: item_id.clone(),
                        caller: PLUGIN_CALLER.to_owned(),
                    });
                }
                Err(e) => error!("❌ {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use audion_core::ParsedBurst;
    use audion_core::conf::ConfNode;
    use audion_denon::DenonCommandSet;
    use bevy_ecs::message::Messages;
    use bevy_ecs::system::RunSystemOnce;
    use parking_lot::Mutex;

    /// In-memory data source that records writes and acks them back
    #[derive(Default)]
    struct RecordingSource {
        writes: Mutex<Vec<(AvrAttribute, ItemValue)>>,
    }

    #[async_trait]
    impl AvrDataSource for RecordingSource {
        async fn read_attribute(&self, _attribute: AvrAttribute) -> anyhow::Result<ItemValue> {
            anyhow::bail!("no reads expected")
        }

        async fn write_attribute(
            &self,
            attribute: AvrAttribute,
            value: &ItemValue,
        ) -> anyhow::Result<ParsedBurst> {
            self.writes.lock().push((attribute, value.clone()));
            Ok(ParsedBurst {
                updates: vec![(attribute, value.clone())],
                max_volume: None,
            })
        }

        async fn health_check(&self) -> anyhow::Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "recording receiver"
        }
    }

    fn world_with(items_conf: &str) -> World {
        let mut world = World::new();
        let root = ConfNode::parse(items_conf).unwrap();
        world.insert_resource(ItemRegistry::from_conf(&root).unwrap());
        world.insert_resource(AvrConfig::default());
        world.insert_resource(AvrBindings::default());
        world
    }

    fn run_bind(world: &mut World) {
        world
            .run_system_once(avr_bind_items_system)
            .expect("Failed to run bind system");
    }

    /// World with one bound bool power item plus everything the write and
    /// drain systems need
    fn bound_world(items_conf: &str) -> (World, Arc<RecordingSource>) {
        let mut world = world_with(items_conf);
        run_bind(&mut world);
        let source = Arc::new(RecordingSource::default());
        world.insert_resource(AvrDataSourceResource(source.clone()));
        world.insert_resource(AvrFeedbackChannel::default());
        world.init_resource::<Messages<AvrWrite>>();
        world.init_resource::<Messages<ItemUpdated>>();
        (world, source)
    }

    const POWER_ITEM: &str = "[a]\n    type = bool\n    avr_attribute = power\n";

    #[test]
    fn test_bind_items_by_attribute() {
        let mut world = world_with(
            r"
[living]
    [[avr]]
        [[[power]]]
            type = bool
            avr_attribute = power
        [[[volume]]]
            type = num
            avr_attribute = volume
        [[[label]]]
            type = str
",
        );
        run_bind(&mut world);

        let bindings = world.resource::<AvrBindings>();
        assert_eq!(bindings.by_item.len(), 2);
        assert_eq!(
            bindings.by_item.get("living.avr.power"),
            Some(&AvrAttribute::Power)
        );
        assert_eq!(
            bindings.by_attribute.get(&AvrAttribute::Volume),
            Some(&vec!["living.avr.volume".to_owned()])
        );
        // unbound item stays out
        assert!(!bindings.by_item.contains_key("living.avr.label"));
    }

    #[test]
    fn test_bind_skips_type_mismatch() {
        // a str item cannot carry the power attribute
        let mut world = world_with(
            r"
[a]
    type = str
    avr_attribute = power
[b]
    type = bool
    avr_attribute = mute
",
        );
        run_bind(&mut world);

        let bindings = world.resource::<AvrBindings>();
        assert!(!bindings.by_item.contains_key("a"));
        assert_eq!(bindings.by_item.get("b"), Some(&AvrAttribute::Mute));
    }

    #[test]
    fn test_bind_skips_unknown_attribute() {
        let mut world = world_with(
            r"
[a]
    type = num
    avr_attribute = bass
",
        );
        run_bind(&mut world);

        assert!(world.resource::<AvrBindings>().by_item.is_empty());
    }

    #[tokio::test]
    async fn test_connect_system_uses_configured_address() {
        let mut world = World::new();
        world.insert_resource(AvrConfig {
            host: "127.0.0.1".to_owned(),
            port: 4008,
            ..AvrConfig::default()
        });
        world.insert_resource(AvrCommandSetResource(Arc::new(DenonCommandSet::new())));

        world
            .run_system_once(avr_connect_system)
            .expect("Failed to run connect system");

        let source = world.resource::<AvrDataSourceResource>();
        assert_eq!(source.0.name(), "Denon AVR at 127.0.0.1:4008");
    }

    #[test]
    fn test_write_system_ignores_plugin_echo() {
        let (mut world, source) = bound_world(POWER_ITEM);
        world.resource_mut::<Messages<AvrWrite>>().write(AvrWrite {
            item_id: "a".to_owned(),
            value: ItemValue::Bool(true),
            caller: PLUGIN_CALLER.to_owned(),
        });

        world
            .run_system_once(avr_write_system)
            .expect("Failed to run write system");

        // the plugin's own update must not bounce back to the device
        assert!(source.writes.lock().is_empty());
        assert_eq!(
            world.resource::<ItemRegistry>().get("a").unwrap().value(),
            &ItemValue::Bool(false)
        );
        assert!(world.resource::<Messages<ItemUpdated>>().is_empty());
    }

    #[tokio::test]
    async fn test_write_system_sends_user_write_to_device() {
        let (mut world, source) = bound_world(POWER_ITEM);
        world.resource_mut::<Messages<AvrWrite>>().write(AvrWrite {
            item_id: "a".to_owned(),
            value: ItemValue::Bool(true),
            caller: "ui".to_owned(),
        });

        world
            .run_system_once(avr_write_system)
            .expect("Failed to run write system");

        // optimistic update, stamped with the requesting caller
        let registry = world.resource::<ItemRegistry>();
        let item = registry.get("a").unwrap();
        assert_eq!(item.value(), &ItemValue::Bool(true));
        assert_eq!(item.last_caller, "ui");
        assert_eq!(world.resource::<Messages<ItemUpdated>>().len(), 1);

        // let the spawned device task run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            *source.writes.lock(),
            vec![(AvrAttribute::Power, ItemValue::Bool(true))]
        );
    }

    #[test]
    fn test_drain_reverts_item_after_failed_write() {
        let (mut world, _source) = bound_world(POWER_ITEM);
        world
            .resource_mut::<ItemRegistry>()
            .update("a", ItemValue::Bool(true), "ui")
            .unwrap();

        let sender = world.resource::<AvrFeedbackChannel>().sender.clone();
        sender
            .send(AvrFeedback::WriteFailed {
                item_id: "a".to_owned(),
            })
            .unwrap();

        world
            .run_system_once(avr_drain_feedback_system)
            .expect("Failed to run drain system");

        let registry = world.resource::<ItemRegistry>();
        let item = registry.get("a").unwrap();
        assert_eq!(item.value(), &ItemValue::Bool(false));
        assert_eq!(item.last_caller, PLUGIN_CALLER);
        assert_eq!(world.resource::<Messages<ItemUpdated>>().len(), 1);
    }

    #[test]
    fn test_drain_applies_device_status() {
        let (mut world, _source) = bound_world(POWER_ITEM);
        let sender = world.resource::<AvrFeedbackChannel>().sender.clone();
        sender
            .send(AvrFeedback::Status {
                attribute: AvrAttribute::Power,
                value: ItemValue::Bool(true),
            })
            .unwrap();

        world
            .run_system_once(avr_drain_feedback_system)
            .expect("Failed to run drain system");

        let registry = world.resource::<ItemRegistry>();
        let item = registry.get("a").unwrap();
        assert_eq!(item.value(), &ItemValue::Bool(true));
        assert_eq!(item.last_caller, PLUGIN_CALLER);
        assert_eq!(world.resource::<Messages<ItemUpdated>>().len(), 1);

        // a repeated identical status is a no-op
        sender
            .send(AvrFeedback::Status {
                attribute: AvrAttribute::Power,
                value: ItemValue::Bool(true),
            })
            .unwrap();
        world
            .run_system_once(avr_drain_feedback_system)
            .expect("Failed to run drain system");
        assert_eq!(world.resource::<Messages<ItemUpdated>>().len(), 1);
    }
}
