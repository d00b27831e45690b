//! Comfort Sim - replay recorded comfort traces through the feedback loop
//!
//! Useful for tuning thresholds and strategies offline:
//! - Replay a JSON trace against a profile (optionally with TOML overrides)
//! - Print the event stream, per-session metrics and the final report
//! - Print a profile's effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use comfort_loop::ExperienceProfile;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod profile;
mod replay;
mod trace;

use trace::Trace;

/// Comfort loop simulator
#[derive(Parser)]
#[command(name = "comfort-sim")]
#[command(about = "Replay comfort traces through the feedback loop controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a trace
    Run {
        /// JSON trace file
        #[arg(short, long)]
        trace: PathBuf,

        /// Configuration preset (standard, quest3, research, development)
        #[arg(short, long, env = "COMFORT_PROFILE", default_value = "standard")]
        profile: ExperienceProfile,

        /// TOML file layered over the preset
        #[arg(short, long, env = "COMFORT_CONFIG")]
        config: Option<PathBuf>,

        /// Print the whole outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a preset's configuration as TOML
    Config {
        #[arg(short, long, default_value = "standard")]
        profile: ExperienceProfile,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .init();

    match cli.command {
        Commands::Run {
            trace,
            profile,
            config,
            json,
        } => {
            let config = profile::load_config(profile, config.as_deref())?;
            let trace = Trace::load(&trace)?;
            let outcome = replay::replay(config, &trace).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }

            for envelope in &outcome.events {
                println!(
                    "{}  {:<8} {}",
                    envelope.timestamp.format("%H:%M:%S%.3f"),
                    format!("{:?}", envelope.severity),
                    envelope.event
                );
            }

            let report = &outcome.report;
            println!();
            println!(
                "points: {}  adjustments: {}  rollbacks: {}",
                report.summary.data_points,
                outcome.adjustments(),
                outcome.rollbacks()
            );
            if let Some(average) = report.metrics.average_comfort_score {
                println!("average comfort: {:.1}", average);
            }
            for insight in &report.insights {
                println!("insight: {}", insight);
            }
            for recommendation in &report.recommendations {
                println!("recommendation: {}", recommendation);
            }
        }
        Commands::Config { profile } => {
            print!("{}", profile::render_profile(profile)?);
        }
    }

    Ok(())
}
