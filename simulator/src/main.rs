//! SwapSettle Simulator
//!
//! Runs end-to-end scenarios against the settlement engine with an
//! in-process exchange standing in for the liquidity provider.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod exchange;
mod metrics;
mod scenario;

use controller::{Signing, SimulationController};
use scenario::Scenario;

/// SwapSettle Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "swapsettle-sim")]
#[command(about = "SwapSettle end-to-end scenario runner")]
struct Args {
    /// Scenario to run; every scenario runs when omitted
    #[arg(short, long)]
    scenario: Option<String>,

    /// List available scenarios and exit
    #[arg(long)]
    list: bool,

    /// Webhook signing scheme used by the simulated exchange
    #[arg(long, value_enum, default_value = "hmac")]
    signing: Signing,

    /// Random seed for reproducible keys
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.list {
        for name in Scenario::names() {
            let scenario = Scenario::load(name)?;
            println!("{:<20} {}", scenario.name, scenario.description);
        }
        return Ok(());
    }

    let names: Vec<&str> = match &args.scenario {
        Some(name) => vec![name.as_str()],
        None => Scenario::names().to_vec(),
    };

    info!(scenarios = names.len(), signing = ?args.signing, "Starting SwapSettle Simulator");

    let mut failed = Vec::new();
    for name in names {
        let scenario = Scenario::load(name)?;
        let mut controller = SimulationController::new(args.signing, args.seed)?;
        controller.run_scenario(&scenario).await?;

        let metrics = controller.metrics();
        info!(
            scenario = %scenario.name,
            steps = metrics.steps,
            webhooks = metrics.webhooks_delivered,
            passed = metrics.assertions_passed,
            failed = metrics.assertions_failed,
            avg_latency_us = metrics.average_latency_us(),
            p99_latency_us = metrics.p99_latency_us(),
            "Scenario complete"
        );
        if !metrics.passed() {
            failed.push(scenario.name);
        }
    }

    if !failed.is_empty() {
        error!(failed = ?failed, "Simulation failed");
        return Err(anyhow::anyhow!("Scenarios failed: {}", failed.join(", ")));
    }

    info!("Simulation complete");
    Ok(())
}
