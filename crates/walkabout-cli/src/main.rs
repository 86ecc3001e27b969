//! CLI utility for replaying scene lifecycle scripts through the dispatcher

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use web_time::Instant;

use walkabout_common::{Aabb, MeshId, ObjectId};
use walkabout_dynamic::{DynamicObstacleConfig, NavMeshUpdateDispatcher, RegenerationJob};

/// Upper bound on settle passes after the script ends
const MAX_SETTLE_PASSES: usize = 64;

/// A CLI utility for exercising dynamic obstacle navigation updates
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a lifecycle script and print every regeneration it causes
    Replay {
        /// Script file (JSON list of events)
        #[clap(long, value_parser)]
        script: PathBuf,

        /// Dispatcher configuration (JSON)
        #[clap(long, value_parser)]
        config: Option<PathBuf>,

        /// Override the batch window from the configuration
        #[clap(long)]
        batch_window_ms: Option<u64>,

        /// Bounds in the script use the engine's z-up frame
        #[clap(long)]
        z_up: bool,

        /// Print final statistics as JSON
        #[clap(long)]
        stats: bool,
    },
}

/// One step of a replay script
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ScriptEvent {
    RegisterMesh { mesh: MeshId, bounds: [f32; 6] },
    UnregisterMesh { mesh: MeshId },
    Add { object: ObjectId, bounds: [f32; 6] },
    Move { object: ObjectId, bounds: [f32; 6] },
    Remove { object: ObjectId },
    /// Moves the replay clock forward and pumps the dispatcher
    Advance { ms: u64 },
    Update,
    Flush,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Replay {
            script,
            config,
            batch_window_ms,
            z_up,
            stats,
        } => replay(&script, config.as_deref(), batch_window_ms, z_up, stats),
    }
}

fn load_config(path: Option<&Path>, batch_window_ms: Option<u64>) -> Result<DynamicObstacleConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str::<DynamicObstacleConfig>(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => DynamicObstacleConfig::default(),
    };

    if let Some(window) = batch_window_ms {
        config = config.with_batch_window_ms(window);
    }
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn load_script(path: &Path) -> Result<Vec<ScriptEvent>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse script {}", path.display()))
}

fn to_bounds(raw: [f32; 6], z_up: bool) -> Aabb {
    let bounds = Aabb::from_array(raw);
    if z_up {
        Aabb::from_z_up(&bounds)
    } else {
        bounds
    }
}

/// Replay a lifecycle script
fn replay(
    script: &Path,
    config: Option<&Path>,
    batch_window_ms: Option<u64>,
    z_up: bool,
    stats: bool,
) -> Result<()> {
    let config = load_config(config, batch_window_ms)?;
    let events = load_script(script)?;
    println!("Replaying {} events from {}...", events.len(), script.display());

    // Every job is rebuilt instantly and reported as a success
    let regenerator = |job: RegenerationJob| {
        println!("regenerate {} over {}", job.mesh(), job.region());
        job.complete(Ok(()));
    };
    let mut dispatcher = NavMeshUpdateDispatcher::with_regenerator(config, regenerator)
        .map_err(|e| anyhow!("Failed to create dispatcher: {}", e))?;

    let mut now = Instant::now();

    for (step, event) in events.into_iter().enumerate() {
        log::debug!("step {}: {:?}", step, event);
        match event {
            ScriptEvent::RegisterMesh { mesh, bounds } => dispatcher
                .register_mesh(mesh, to_bounds(bounds, z_up))
                .with_context(|| format!("Step {}: failed to register {}", step, mesh))?,
            ScriptEvent::UnregisterMesh { mesh } => {
                if let Err(e) = dispatcher.unregister_mesh(mesh) {
                    println!("step {}: {}", step, e);
                }
            }
            ScriptEvent::Add { object, bounds } => {
                dispatcher.object_added_at(object, to_bounds(bounds, z_up), now);
            }
            ScriptEvent::Move { object, bounds } => {
                dispatcher.object_moved_at(object, to_bounds(bounds, z_up), now);
            }
            ScriptEvent::Remove { object } => {
                dispatcher.object_will_be_removed_at(object, now);
            }
            ScriptEvent::Advance { ms } => {
                now += Duration::from_millis(ms);
                dispatcher.update_at(now);
            }
            ScriptEvent::Update => {
                dispatcher.update_at(now);
            }
            ScriptEvent::Flush => {
                dispatcher.flush_at(now);
                dispatcher.update_at(now);
            }
        }
    }

    // Drain whatever the script left queued
    for _ in 0..MAX_SETTLE_PASSES {
        if !dispatcher.has_pending_updates() {
            break;
        }
        dispatcher.flush_at(now);
        dispatcher.update_at(now);
    }

    let statistics = dispatcher.statistics();
    println!(
        "Replay complete: {} regenerations ({} failed), {} requests, {} cancelled, {} unknown objects",
        statistics.regenerations_started,
        statistics.regenerations_failed,
        statistics.requests,
        statistics.cancelled,
        statistics.not_registered
    );

    if stats {
        let json = serde_json::to_string_pretty(&statistics).context("Failed to encode statistics")?;
        println!("{}", json);
    }

    Ok(())
}
