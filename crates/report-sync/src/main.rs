// Copyright 2026 Report Sync Contributors
// SPDX-License-Identifier: Apache-2.0

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use report_sync::cli::{self, output, DestinationArgs, RunArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "report-sync",
    about = "Export the portal report and replace a Google Sheets tab with it",
    version,
    after_help = "Run 'report-sync <command> --help' for details on each command.\nRun 'report-sync' with no command to perform a full run."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, export the report, and publish it (default)
    Run(RunArgs),
    /// Publish a report archive that is already on disk
    Publish {
        /// Path to the downloaded .zip archive
        artifact: PathBuf,
        #[command(flatten)]
        destination: DestinationArgs,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_logging(json: bool, verbose: bool) {
    let default = if verbose {
        "report_sync=debug"
    } else {
        "report_sync=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var(output::ENV_JSON, "1");
    }
    if cli.quiet {
        std::env::set_var(output::ENV_QUIET, "1");
    }
    init_logging(cli.json, cli.verbose);

    let result = match cli.command {
        None => cli::run_cmd::run(RunArgs::default().into()).await,
        Some(Commands::Run(args)) => cli::run_cmd::run(args.into()).await,
        Some(Commands::Publish {
            artifact,
            destination,
        }) => cli::publish_cmd::run(&artifact, destination.into()).await,
        Some(Commands::Doctor) => cli::doctor::run().await,
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "report-sync", &mut std::io::stdout());
            Ok(0)
        }
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            if output::is_json() {
                output::print_json(&serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                    "exit_code": cli::exit_code_for(&e),
                }));
            } else if !output::is_quiet() {
                eprintln!("  Error: {e:#}");
            }
            cli::exit_code_for(&e)
        }
    };
    std::process::exit(code);
}
