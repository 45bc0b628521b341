use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use incline_runtime::runtime::{self, RunOptions};
use incline_runtime::system::Position;

/// Dual-track incline controller
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Directory holding motor_p.json and io_p.json
    #[arg(long, default_value = ".")]
    params_dir: PathBuf,

    /// Run without the display; output goes to the log
    #[arg(long)]
    no_display: bool,

    /// Never write calibration back to the parameter files
    #[arg(long)]
    dry_run: bool,

    /// Where the incline is assumed to be at power-on
    #[arg(long, value_enum, default_value_t = Position::Up)]
    start_position: Position,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let options = RunOptions {
        params_dir: args.params_dir,
        no_display: args.no_display,
        dry_run: args.dry_run,
        start_position: args.start_position,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
