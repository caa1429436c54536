use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tcoctl::config::{self, Config};
use tcoctl::exit_codes::exit_code_for_anyhow;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tcoctl")]
#[command(
    about = "Estimate the AWS cost of migrating an on-premises VM inventory",
    long_about = "tcoctl turns a VMware inventory export into an AWS cost estimate.\n\nPipeline:\n  - Scope filter (drops hypervisor, backup and network appliances)\n  - Right-sizing to EC2 instance types\n  - Pricing via local cache, AWS Price List API, then versioned fallback tables\n  - Monthly and annual totals per VM and workload class"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, global = true, default_value = "text")]
    output: String,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate monthly and annual AWS cost for an inventory
    Estimate(commands::EstimateArgs),
    /// Show which VMs are in migration scope and why
    Scope {
        /// Inventory file (JSON array of VM records)
        #[arg(short, long)]
        inventory: PathBuf,
    },
    /// Show the recommended instance type for every in-scope VM
    Recommend {
        /// Inventory file (JSON array of VM records)
        #[arg(short, long)]
        inventory: PathBuf,
    },
    /// Manage the local price cache
    Cache {
        #[command(subcommand)]
        subcommand: commands::CacheCommands,
    },
    /// Initialize configuration
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = ".tcoctl.toml")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool, format: LogFormat) {
    // --verbose wins, then RUST_LOG, else warnings only
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { output } = &cli.command {
        return config::init_config(output);
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Estimate(args) => {
            commands::handle_estimate(args, &config, &cli.output).await?;
        }
        Commands::Scope { inventory } => {
            commands::handle_scope(&inventory, &config, &cli.output).await?;
        }
        Commands::Recommend { inventory } => {
            commands::handle_recommend(&inventory, &config, &cli.output).await?;
        }
        Commands::Cache { subcommand } => {
            commands::handle_cache(subcommand, &config, &cli.output).await?;
        }
        Commands::Init { .. } => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code_for_anyhow(&e));
    }
}
