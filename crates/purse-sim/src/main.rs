// crates/purse-sim/src/main.rs
//
// Purse ledger simulator.
//
// Initializes tracing, loads the deployment configuration, replays a JSON
// operation script against both ledger tiers, and prints per-step results,
// account positions and an audit summary as tables or JSON.

mod config;
mod output;
mod runner;
mod script;

use clap::{Parser, Subcommand};

use config::SimConfig;
use output::{AccountRow, EventRow, OutputFormat, RunReport, StepRow};
use runner::Simulator;
use script::Script;

/// Purse staking ledger simulator.
#[derive(Parser, Debug)]
#[command(name = "purse-sim", version = "0.1.0", about = "Replay scripted operations against the Purse staking ledger")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "purse-sim.toml")]
    config: String,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay a JSON script.
    Run {
        /// Path to the JSON script.
        #[arg(long)]
        script: String,

        /// Also print the full event log.
        #[arg(long)]
        events: bool,
    },

    /// Print the effective configuration.
    Config,
}

fn load_config(path: &str) -> SimConfig {
    match SimConfig::load(path) {
        Ok(config) => {
            tracing::info!("Loaded configuration from {}", path);
            config
        }
        Err(e) => {
            tracing::warn!("Could not load config from {}: {}. Using defaults.", path, e);
            SimConfig::default()
        }
    }
}

fn run(
    config: SimConfig,
    script_path: &str,
    show_events: bool,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = Script::load(script_path)?;
    tracing::info!("Replaying {} steps from {}", script.steps.len(), script_path);

    let mut sim = Simulator::new(config)?;
    let steps = sim.run(&script);
    let accounts = sim.accounts()?;
    let summary = sim.summary();
    let failed = steps.iter().filter(|s| !s.ok).count();
    tracing::info!(steps = steps.len(), failed, "Replay finished");

    match format {
        OutputFormat::Json => {
            let report = RunReport {
                steps: &steps,
                accounts: &accounts,
                summary: &summary,
                events: show_events.then(|| sim.system().events().events()),
            };
            println!("{}", output::format_json(&report));
        }
        OutputFormat::Table => {
            let step_rows: Vec<StepRow> = steps.iter().map(StepRow::from).collect();
            println!("{}", output::format_table(&step_rows));
            println!();
            let account_rows: Vec<AccountRow> = accounts.iter().map(AccountRow::from).collect();
            println!("{}", output::format_table(&account_rows));
            println!();
            if show_events {
                let event_rows: Vec<EventRow> = sim
                    .system()
                    .events()
                    .events()
                    .iter()
                    .enumerate()
                    .map(|(i, event)| EventRow::new(i, event))
                    .collect();
                println!("{}", output::format_table(&event_rows));
                println!();
            }
            println!("{}", output::format_summary(&summary));
        }
    }

    if !summary.audit.is_empty() {
        return Err(format!("ledger audit failed with {} problems", summary.audit.len()).into());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config);

    match &cli.command {
        Commands::Run { script, events } => run(config, script, *events, cli.format)?,
        Commands::Config => match cli.format {
            OutputFormat::Json => println!("{}", output::format_json(&config)),
            OutputFormat::Table => println!("{}", toml::to_string_pretty(&config)?),
        },
    }

    Ok(())
}
