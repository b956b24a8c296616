use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;

/// imageforge - machine-image build-job worker
#[derive(Parser)]
#[command(name = "imageforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the build phase of the job assigned to this instance
  Build(cmd::BuildArgs),

  /// Close out a finished job: upload the build log and notify the hub
  Finish,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .without_time()
    .init();

  match cli.command {
    Commands::Build(args) => cmd::cmd_build(args),
    Commands::Finish => cmd::cmd_finish(),
  }
}
