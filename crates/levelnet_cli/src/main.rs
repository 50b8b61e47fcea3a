pub mod loader;
pub mod settings;
pub mod stats;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use levelnet_core::{run_simulation, Registry, SimulationConfig};
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "levelnet")]
#[command(about = "Discrete multi-level influence network simulator")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log at DEBUG instead of INFO
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Model sources shared by every subcommand.
#[derive(Args)]
struct ModelArgs {
    /// Model table (CSV, one row per element)
    model: PathBuf,

    /// Truth-table sheet (CSV); repeat for several elements
    #[arg(long = "table")]
    tables: Vec<PathBuf>,

    /// TOML file overriding the defaults applied to blank cells
    #[arg(long)]
    defaults: Option<PathBuf>,
}

impl ModelArgs {
    fn build(&self) -> Result<Registry> {
        let table = loader::load_model(&self.model, &self.tables)?;
        let defaults = settings::load_defaults(self.defaults.as_deref())?;
        let registry = Registry::build(&table, &defaults)
            .with_context(|| format!("invalid model {}", self.model.display()))?;
        Ok(registry)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a model and write the trace file
    Run {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        config: SimulationConfig,

        /// Also write per-step mean and standard deviation as CSV
        #[arg(long)]
        stats: Option<PathBuf>,
    },
    /// Print the built registry as JSON
    Inspect {
        #[command(flatten)]
        model: ModelArgs,

        /// Write the JSON to a file instead of stdout
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Build the registry and report its size without simulating
    Validate {
        #[command(flatten)]
        model: ModelArgs,
    },
}

fn init_logging(json: bool, verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr);
    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    if let Err(e) = installed {
        eprintln!("failed to install log subscriber: {e}");
    }
}

fn simulate(
    model: &ModelArgs,
    config: &SimulationConfig,
    stats_path: Option<&PathBuf>,
) -> Result<()> {
    let registry = model.build()?;
    let summary = run_simulation(&registry, config)
        .with_context(|| format!("simulation of {} failed", model.model.display()))?;
    if let Some(path) = stats_path {
        stats::export_csv(&summary, path)?;
    }
    info!(
        runs = summary.runs,
        steps = summary.steps,
        output = %config.output.display(),
        "done"
    );
    Ok(())
}

fn inspect(model: &ModelArgs, json: Option<&PathBuf>) -> Result<()> {
    let registry = model.build()?;
    let text = serde_json::to_string_pretty(&registry.summary())?;
    match json {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "registry written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn validate(model: &ModelArgs) -> Result<()> {
    let registry = model.build()?;
    println!(
        "{}: {} elements, {} regulated, {} scenario(s)",
        model.model.display(),
        registry.len(),
        registry.update_list().len(),
        registry.scenario_count()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.json_logs, cli.verbose);

    let result = match &cli.command {
        Commands::Run {
            model,
            config,
            stats,
        } => simulate(model, config, stats.as_ref()),
        Commands::Inspect { model, json } => inspect(model, json.as_ref()),
        Commands::Validate { model } => validate(model),
    };

    if let Err(e) = result {
        error!(error = %format!("{e:#}"), "fatal error");
        std::process::exit(1);
    }
}
