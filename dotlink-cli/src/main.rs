mod app;

use anyhow::Context;
use clap::{CommandFactory, FromArgMatches};
use dotlink::{driver::expand_response_files, linker::MessageCategory, Driver};

use crate::app::Cli;

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .context("failed to set Ctrl+C handler")?;

    let args = expand_response_files(std::env::args())?;
    let matches = Cli::command().get_matches_from(args);
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    // Show dotlink info+ on stderr; --verbose enables debug; RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_module("dotlink", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let options = cli.driver_options(&matches)?;
    let ctx = Driver::new(options).run()?;

    let warnings = ctx
        .diagnostics
        .iter()
        .filter(|m| m.category == MessageCategory::Warning)
        .count();
    log::info!(
        "Linked {} assemblies with {warnings} warning(s)",
        ctx.graph
            .modules()
            .iter()
            .filter(|m| !ctx.graph.symbol(**m).is_removed())
            .count()
    );
    Ok(())
}
