use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "zoneplan", version, about = "Zone-aware task scheduler")]
struct Cli {
    /// Configuration file (overrides $ZONEPLAN_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place tasks that have no calendar blocks yet
    Schedule(commands::plan::PlanArgs),
    /// Replace every managed block with a fresh placement
    Reschedule(commands::plan::PlanArgs),
    /// Delete every managed block in the horizon
    Clean(commands::plan::CleanArgs),
    /// Show the zone catalogue
    Zones {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ZONEPLAN_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Schedule(args) => commands::plan::run_schedule(config_path, args, false),
        Commands::Reschedule(args) => commands::plan::run_schedule(config_path, args, true),
        Commands::Clean(args) => commands::plan::run_clean(config_path, args),
        Commands::Zones { json } => commands::zones::run(config_path, json),
        Commands::Config { action } => commands::config::run(config_path, action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "zoneplan", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
