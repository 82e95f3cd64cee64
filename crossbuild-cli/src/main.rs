mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use commands::build::BuildArgs;
use commands::plan::PlanArgs;

/// crossbuild - build every OS x arch x toolchain combination in clean containers
#[derive(Parser, Debug)]
#[command(name = "crossbuild", version, about)]
struct Cli {
    /// Show backend commands and debug logs
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the full matrix and export the outputs (default)
    Build(BuildArgs),

    /// Show the cells a build would run, without contacting the backend
    Plan(PlanArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Build(args)) => commands::build::execute(args).await,
        Some(Commands::Plan(args)) => commands::plan::execute(args),
        None => commands::build::execute(BuildArgs::default()).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("crossbuild=debug,crossbuild_service=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}
