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

mod config;
mod version;

use anyhow::Result;
use bevy_app::{ScheduleRunnerPlugin, TaskPoolPlugin, prelude::*};
use bevy_ecs::prelude::*;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use audion_avr::{AvrCommandSetResource, AvrPlugin, ItemUpdated};
use audion_core::AvrCommandSet;
use audion_denon::DenonCommandSet;
use config::{AppConfig, LogicBindings};

fn main() -> Result<()> {
    // Handle command line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" => {
                println!("AudION - AV Receiver Automation");
                println!("Version: {}", version::VERSION);
                println!();
                println!("Usage: audion [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help    Print this help message");
                println!("  -v, --version Print version");
                return Ok(());
            }
            "--version" | "-v" => {
                println!("{}", version::VERSION);
                return Ok(());
            }
            _ => {}
        }
    }

    // Create tokio runtime for the telnet session and background tasks
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    // Run Bevy app in a blocking task so tokio can keep running async tasks
    runtime.block_on(async {
        tokio::task::spawn_blocking(initialize_and_run)
            .await
            .expect("Bevy task panicked")
    })
}

fn initialize_and_run() -> Result<()> {
    // Initialize tracing with env filter support
    // Respects RUST_LOG environment variable
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = AppConfig::load()?;

    // plugin.conf may override the receiver address
    if std::path::Path::new(&config.files.plugin_conf).exists() {
        let root = config::load_conf(&config.files.plugin_conf)?;
        config.apply_plugin_conf(&root)?;
        config.validate()?;
    }

    info!("🚀 Starting AudION - AV Receiver Automation");
    info!("📋 Configuration Summary:");
    info!("   Receiver: {}", config.avr_address());
    info!("   Poll interval: {}s", config.avr.poll_interval_secs);
    info!("   Binding attribute: {}", config.avr.binding_attr);
    info!("   Items file: {}", config.files.items_conf);
    info!("   Logic file: {}", config.files.logic_conf);

    let registry = config::load_items(&config.files.items_conf)?;
    let logics = config::load_logics(&config.files.logic_conf)?;
    for logic in &logics.0 {
        info!(
            "   Logic '{}' watches {} item(s)",
            logic.name,
            logic.watch_items.len()
        );
    }

    // The plugin builds the data source at startup from AvrConfig, after
    // env overrides; main only picks the vendor command set
    let command_set: Arc<dyn AvrCommandSet> = Arc::new(DenonCommandSet::new());
    info!("🔌 Receiver command set: {}", command_set.vendor_name());

    // Create Bevy app
    info!("🎮 Starting ECS application...");

    let mut app = App::new();
    app
        // Add TaskPoolPlugin to initialize async task pools
        .add_plugins(TaskPoolPlugin::default())
        // Add ScheduleRunnerPlugin for headless operation
        .add_plugins(ScheduleRunnerPlugin::run_loop(config.tick_interval()))
        .add_plugins(AvrPlugin)
        .insert_resource(config.avr_config())
        .insert_resource(config)
        .insert_resource(registry)
        .insert_resource(logics)
        .insert_resource(AvrCommandSetResource(command_set))
        .add_systems(Update, logic_trigger_system);

    info!("✅ Starting main loop...");

    app.run();

    Ok(())
}

/// System: fire logics whose watched items changed
fn logic_trigger_system(mut updates: MessageReader<ItemUpdated>, logics: Res<LogicBindings>) {
    for update in updates.read() {
        for logic in logics.watchers(&update.id) {
            info!(
                "🧠 Logic '{}' triggered by item '{}' (caller: {})",
                logic.name, update.id, update.caller
            );
        }
    }
}
