/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use cadence::api::{JobKind, LogReporter, Policy, PolicyStep};
use cadence::compose::{compose, ComposeOptions};
use cadence::config::{FleetConfigManager, FleetNodeConfig};
use cadence::scheduler::{Clock, SystemClock};
use cadence::sim::{ManualClock, SimExecutor, StaticPolicyProvider};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Cadence batch timing scheduler.
///
/// Runs the full scheduling stack (engine, ledger, filler) against the
/// built-in simulated executor — a dry run showing exactly how batches
/// would be placed on the declared fleet.
///
/// Example:
///   cadence --fleet demos/fleet_configuration.yaml --run-for 30
#[derive(Debug, Parser)]
#[command(
    name = "cadence",
    about = "Cadence batch timing scheduler – dry-run driver",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML fleet configuration file.
    #[arg(short = 'c', long = "fleet")]
    fleet_config: Option<PathBuf>,

    /// How long to run, in seconds.
    #[arg(short = 'r', long = "run-for", default_value_t = 30)]
    run_for_secs: u64,

    /// Milliseconds between consecutive batch start times.
    #[arg(long = "spacing", default_value_t = 4_000)]
    spacing_ms: u64,

    /// Capacity units the filler leaves free on every node.
    #[arg(long = "headroom", default_value_t = 8.0)]
    filler_headroom: f64,

    /// Disable the spare-capacity filler.
    #[arg(long = "no-filler", default_value_t = false)]
    no_filler: bool,
}

/// The demo policy the dry run schedules: a standard four-slot sequence
/// against a single synthetic target.
fn demo_policy(target: &str, spacing_ms: u64) -> Policy {
    Policy {
        target: target.to_string(),
        spacing_ms,
        sequence: vec![
            PolicyStep { kind: JobKind::Extract, threads: 8 },
            PolicyStep { kind: JobKind::Stabilize, threads: 3 },
            PolicyStep { kind: JobKind::Amplify, threads: 6 },
            PolicyStep { kind: JobKind::Stabilize, threads: 3 },
        ],
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Cadence starting up...");

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    let cli = Cli::parse();

    info!(
        fleet_config = ?cli.fleet_config,
        run_for_secs = cli.run_for_secs,
        spacing_ms = cli.spacing_ms,
        filler_headroom = cli.filler_headroom,
        no_filler = cli.no_filler,
        "Configuration"
    );

    // ── Load fleet configuration ──────────────────────────────────────────────
    let mut fleet = FleetConfigManager::new();

    match &cli.fleet_config {
        Some(path) => {
            if let Err(e) = fleet.load_from_file(path) {
                error!("Failed to load fleet configuration: {:#}", e);
                process::exit(1);
            }
        }
        None => {
            warn!("No fleet configuration file provided, using a single default node");
        }
    }
    if !fleet.is_loaded() {
        // Same fallback the config manager applies to an empty file.
        fleet.insert_node(FleetNodeConfig::default_config("default_node"));
    }

    // ── Build the stack against the simulated executor ────────────────────────
    let wall = SystemClock;
    let start_ms = wall.now_ms();

    // The sim executor keeps its own manual clock; the driver advances it
    // in lockstep with wall time so job lifecycles play out in real time.
    let sim_clock = Rc::new(ManualClock::new(start_ms));
    let executor = Rc::new(
        SimExecutor::new(sim_clock.clone())
            .with_duration(JobKind::Extract, 2_000)
            .with_duration(JobKind::Amplify, 6_400)
            .with_duration(JobKind::Stabilize, 8_000),
    );
    let provider = Rc::new(StaticPolicyProvider::new(
        "demo-target",
        Some(demo_policy("demo-target", cli.spacing_ms)),
        1_024.0,
    ));
    let reporter = Rc::new(LogReporter);

    let options = ComposeOptions {
        filler_headroom: cli.filler_headroom,
        enable_filler: !cli.no_filler,
    };
    let mut handles = compose(&fleet, executor.clone(), provider, reporter, start_ms, &options);

    info!(
        nodes = handles.ledger.borrow().node_count(),
        fleet_capacity = handles.ledger.borrow().fleet_available(),
        "Stack composed, entering tick loop"
    );

    // ── Driver loop: tick → sleep ─────────────────────────────────────────────
    let deadline = start_ms + cli.run_for_secs * 1_000;
    loop {
        let now = wall.now_ms();
        if now >= deadline {
            break;
        }
        sim_clock.set(now);

        let sleep_ms = match handles.scheduler.tick(&*sim_clock) {
            Ok(ms) => ms,
            Err(e) => {
                // A deadline regression means the timing math is broken;
                // continuing would dispatch garbage.
                error!("Fatal scheduler error: {e}");
                process::exit(1);
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(sleep_ms.min(deadline - now))) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    // ── Summary ───────────────────────────────────────────────────────────────
    let launches = executor.launches();
    let killed = launches.iter().filter(|l| l.killed_at.is_some()).count();
    info!(
        total_launches = launches.len(),
        killed,
        still_reserved = handles.ledger.borrow().active_count(),
        "Dry run complete"
    );
    let audit = handles.ledger.borrow().integrity_check();
    if let Err(e) = audit {
        error!("Ledger failed its final conservation audit: {e}");
        process::exit(1);
    }
}
