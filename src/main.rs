//! Vellum CLI entry point.

use clap::Parser;
use vellum::core::error::VellumError;

fn init_logging() {
    let mut builder = env_logger::Builder::new();
    match std::env::var("RUST_LOG") {
        Ok(filter) => {
            builder.parse_filters(&filter);
        }
        Err(_) => {
            builder.filter_level(log::LevelFilter::Warn);
        }
    }
    builder.format_timestamp(None);
    builder.init();
}

fn main() {
    init_logging();
    let cli = vellum::cli::Cli::parse();
    if let Err(e) = vellum::cli::dispatch(cli) {
        eprintln!("ERROR: {}", e);
        if matches!(e, VellumError::Build(_)) {
            eprintln!("Exiting (use -k to keep going)");
        }
        std::process::exit(1);
    }
}
