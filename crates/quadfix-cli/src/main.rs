//! Repository tool: the `repotool` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Operation};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let Some(operation) = cli.operation() else {
        eprintln!("error: no operation selected; use --analyze, --analyzeAndFix or --cleanup");
        std::process::exit(1);
    };
    let invocation = support::resolve_invocation_or_exit(&cli);

    match operation {
        Operation::Analyze => commands::analyze::run(&invocation),
        Operation::AnalyzeAndFix => commands::fix::run(&invocation),
        Operation::Cleanup => commands::cleanup::run(&invocation),
    }
}
