mod cli;
mod commands;

use anyhow::Result;
use cli::Args;

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    commands::dispatch(args.command)
}
