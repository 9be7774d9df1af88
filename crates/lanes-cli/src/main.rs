#![forbid(unsafe_code)]

mod cmd;
mod output;
mod rest;
mod session;
mod store;

use clap::{CommandFactory, Parser, Subcommand};
use lanes_core::config;
use lanes_core::error::{ErrorCode, ReorderError};
use lanes_core::lock::LockError;
use lanes_core::service::{ContainerScope, ServiceError};
use lanes_core::timing;
use lanes_core::view::{GroupBy, OrderBy};
use output::{CliError, OutputMode, render_error};
use session::SessionOptions;
use std::env;
use std::path::PathBuf;
use store::StoreError;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "lanes: reorder issues across grouped board lanes",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit command timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Board file to use (default: .lanes/board.json).
    #[arg(long, global = true, value_name = "FILE", conflicts_with = "remote")]
    board: Option<PathBuf>,

    /// Talk to the REST API configured under [api] instead of a board file.
    #[arg(long, global = true)]
    remote: bool,

    /// Group issues by: none, state, priority, labels, assignees, created_by.
    #[arg(long, global = true, value_name = "ATTR")]
    group_by: Option<String>,

    /// Order issues by: sort_order, -created_at, -updated_at, priority.
    #[arg(long, global = true, value_name = "ORDER", allow_hyphen_values = true)]
    order_by: Option<OrderBy>,

    /// Scope the board to a cycle.
    #[arg(long, global = true, value_name = "ID", conflicts_with = "module")]
    cycle: Option<String>,

    /// Scope the board to a module.
    #[arg(long, global = true, value_name = "ID")]
    module: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn session_options(&self) -> SessionOptions {
        let scope = match (&self.cycle, &self.module) {
            (Some(id), _) => ContainerScope::Cycle(id.clone()),
            (None, Some(id)) => ContainerScope::Module(id.clone()),
            (None, None) => ContainerScope::Project,
        };
        SessionOptions {
            board: self.board.clone(),
            remote: self.remote,
            group_by: self.group_by.as_deref().map(GroupBy::parse),
            order_by: self.order_by,
            scope,
            log_toasts: false,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Read",
        about = "Show the grouped board",
        long_about = "Show every bucket of the current view with its issues in display order.",
        after_help = "EXAMPLES:\n    # Show the board grouped by state\n    lanes show\n\n    # Group by priority instead\n    lanes --group-by priority show\n\n    # Emit machine-readable output\n    lanes show --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Reorder",
        about = "Move an issue to a bucket position",
        long_about = "Drop an issue into a bucket at a zero-based position. Under manual ordering the issue gets a sort key between its new neighbours; moving across buckets rewrites the grouped attribute.",
        after_help = "EXAMPLES:\n    # Put an issue second in its own bucket\n    lanes move ISS-1 --index 1\n\n    # Move an issue to the end of the done column\n    lanes move ISS-1 --to done\n\n    # Raise priority, placing it first\n    lanes --group-by priority move ISS-1 --to urgent --index 0"
    )]
    Move(cmd::move_cmd::MoveArgs),

    #[command(
        next_help_heading = "Reorder",
        about = "Delete an issue",
        long_about = "Drop an issue on the delete target. The issue is deleted remotely.",
        after_help = "EXAMPLES:\n    # Delete an issue\n    lanes discard ISS-1"
    )]
    Discard(cmd::discard::DiscardArgs),

    #[command(
        next_help_heading = "Reorder",
        about = "Remove an issue from the scoped cycle or module",
        long_about = "Take an issue out of the cycle or module the board is scoped to. The issue itself is kept.",
        after_help = "EXAMPLES:\n    # Remove from a cycle\n    lanes --cycle CY-3 remove ISS-1\n\n    # Remove from a module\n    lanes --module auth remove ISS-1 --json"
    )]
    Remove(cmd::remove::RemoveArgs),

    #[command(
        next_help_heading = "Read",
        about = "Count issues per bucket",
        after_help = "EXAMPLES:\n    # Counts by state\n    lanes stats\n\n    # Only buckets with issues, by assignee\n    lanes --group-by assignees stats --non-empty"
    )]
    Stats(cmd::stats::StatsArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    lanes completions bash\n\n    # Generate zsh completions\n    lanes completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LANES_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "lanes=debug,info"
        } else {
            "lanes=info,warn"
        })
    });

    let format = env::var("LANES_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Map a command failure to a structured error with its code.
fn cli_error(err: &anyhow::Error) -> CliError {
    if let Some(e) = err.downcast_ref::<ReorderError>() {
        return CliError::from(e);
    }
    if let Some(e) = err.downcast_ref::<ServiceError>() {
        return CliError::with_code(e.to_string(), e.code());
    }
    if let Some(e) = err.downcast_ref::<StoreError>() {
        return CliError::with_code(e.to_string(), e.code());
    }
    if let Some(e) = err.downcast_ref::<LockError>() {
        return CliError::with_code(e.to_string(), e.code());
    }
    CliError::new(format!("{err:#}"))
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let timing_enabled = cli.timing || timing::enabled_from_env();
    timing::set_enabled(timing_enabled);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let config = match config::resolve_config(&project_root, cli.json) {
        Ok(config) => config,
        Err(err) => {
            let mode = if cli.json {
                OutputMode::Json
            } else {
                OutputMode::Text
            };
            render_error(
                mode,
                &CliError::with_code(format!("{err:#}"), ErrorCode::ConfigParseError),
            )?;
            std::process::exit(1);
        }
    };
    let output = OutputMode::from_resolved(&config.resolved_output);
    let opts = SessionOptions {
        log_toasts: output.is_json(),
        ..cli.session_options()
    };

    let command_result = match &cli.command {
        Commands::Show(args) => timing::timed("cmd.show", || {
            session::run(&opts, &config, &project_root, |board, _| {
                cmd::show::run_show(args, output, board)
            })
        }),
        Commands::Move(args) => timing::timed("cmd.move", || {
            session::run(&opts, &config, &project_root, |board, reconciler| {
                cmd::move_cmd::run_move(args, output, board, reconciler)
            })
        }),
        Commands::Discard(args) => timing::timed("cmd.discard", || {
            session::run(&opts, &config, &project_root, |board, reconciler| {
                cmd::discard::run_discard(args, output, board, reconciler)
            })
        }),
        Commands::Remove(args) => timing::timed("cmd.remove", || {
            session::run(&opts, &config, &project_root, |board, reconciler| {
                cmd::remove::run_remove(args, output, board, reconciler)
            })
        }),
        Commands::Stats(args) => timing::timed("cmd.stats", || {
            session::run(&opts, &config, &project_root, |board, _| {
                cmd::stats::run_stats(args, output, board)
            })
        }),
        Commands::Completions(args) => timing::timed("cmd.completions", || {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }),
    };

    if timing_enabled {
        let report = timing::take_report();
        if report.is_empty() {
            eprintln!("timing report: no samples recorded");
        } else {
            eprintln!("timing report:");
            eprintln!("{}", report.display_table());
            eprintln!("timing report (json):");
            eprintln!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if let Err(err) = command_result {
        render_error(output, &cli_error(&err))?;
        std::process::exit(1);
    }
    Ok(())
}
