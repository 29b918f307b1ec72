//! Command-line entry point for the reconciliation engine.
//!
//! Loads a YAML configuration (spec.md §6), selects which configured
//! tasks to run, and dispatches them through the [`task`] runner. Out of
//! scope per spec.md §1: the gateway proxy server is accepted as a
//! recognized flag but reports an explicit "out of scope" error rather
//! than silently doing nothing (SPEC_FULL.md §10.6).
mod concurrency;
mod config;
mod context;
mod diff;
mod error;
mod es;
mod hash;
mod migrator;
mod orchestrator;
mod task;

use std::process::ExitCode;

use clap::{Arg, Command};
use tracing_subscriber::EnvFilter;

use config::{Config, LogLevel};

fn build_cli() -> Command<'static> {
    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .help("Path to the YAML configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::new("tasks")
                .long("tasks")
                .help("Run every task configured in --config")
                .takes_value(false),
        )
        .arg(
            Arg::new("task")
                .long("task")
                .help("Run a whitespace-separated subset of configured task names")
                .takes_value(true),
        )
        .arg(
            Arg::new("gateway")
                .long("gateway")
                .help("Run the gateway proxy server (out of scope for this engine)")
                .takes_value(false),
        )
}

fn init_tracing(level: LogLevel) {
    let filter = match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}

fn main() -> ExitCode {
    let matches = build_cli().get_matches();

    // Missing --config prints usage and exits 0 (spec.md §6, matching
    // the original's `main.go`, which just prints usage and returns).
    let Some(config_path) = matches.value_of("config") else {
        let _ = build_cli().print_help();
        println!();
        return ExitCode::SUCCESS;
    };

    let cfg = match Config::load(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(cfg.level);

    if matches.is_present("gateway") {
        tracing::error!("--gateway was requested but the gateway proxy is out of scope for this engine");
        return ExitCode::FAILURE;
    }

    let selected_names: Vec<String> = matches
        .value_of("task")
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let run_all = matches.is_present("tasks");

    let selected: Vec<&config::TaskSpec> = if run_all {
        cfg.tasks.iter().collect()
    } else if !selected_names.is_empty() {
        cfg.tasks_named(&selected_names)
    } else {
        tracing::warn!("neither --tasks nor --task was given; nothing to run");
        Vec::new()
    };

    if selected.is_empty() {
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(task::run_tasks(&cfg, &selected)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "run finished with a fatal error");
            ExitCode::FAILURE
        }
    }
}
