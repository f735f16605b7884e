mod commands;
mod job;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lucida", about = "3-D Richardson-Lucy deconvolution for volume stacks")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore a blurred volume by Richardson-Lucy deconvolution
    Deconvolve(commands::deconvolve::DeconvolveArgs),
    /// Circularly convolve a volume with a kernel
    Convolve(commands::convolve::ConvolveArgs),
    /// Inspect or dump the frequency spectrum of a volume
    Fft(commands::fft::FftArgs),
    /// Export a 2-D preview image from a volume
    Preview(commands::preview::PreviewArgs),
    /// Print or save a default deconvolution job config
    Config(commands::config::ConfigArgs),
    /// List the compute devices visible on this machine
    Devices(commands::devices::DevicesArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Deconvolve(args) => commands::deconvolve::run(args),
        Commands::Convolve(args) => commands::convolve::run(args),
        Commands::Fft(args) => commands::fft::run(args),
        Commands::Preview(args) => commands::preview::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Devices(args) => commands::devices::run(args),
    }
}
