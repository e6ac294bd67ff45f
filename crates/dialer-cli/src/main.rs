mod commands;
mod error;
mod util;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

use crate::commands::{agents, completions, leads, outcome, recovery, run, stats, Context};
use crate::error::{exit_code_for, report_error};
use dialer_config as config;
use dialer_store::{paths, Store};

#[derive(Debug, Parser)]
#[command(name = "dialer", version, about = "Outbound call dispatcher")]
struct Cli {
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage the lead queue
    #[command(subcommand)]
    Lead(leads::LeadCommand),
    /// Manage agents
    #[command(subcommand)]
    Agent(agents::AgentCommand),
    /// Apply a provider status to a placed call
    Outcome(outcome::OutcomeArgs),
    /// Return leads stuck in flight to the queue
    #[command(name = "reset-stuck")]
    ResetStuck(recovery::ResetStuckArgs),
    /// Summarize leads, calls and agent capacity
    Stats,
    /// Run the dispatcher until interrupted
    Run(run::RunArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    let long_running = matches!(cli.command, Command::Run(_));
    init_logging(verbose, long_running);
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, verbose);
            exit_code_for(&err)
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let Cli {
        db_path,
        config: config_path,
        json,
        verbose,
        command,
    } = cli;

    if let Command::Completions(args) = command {
        return completions::emit(args);
    }

    let app_config = config::load(config_path.clone()).with_context(|| "load config")?;
    if verbose {
        match config::resolve_config_path(config_path) {
            Ok(path) if path.exists() => debug!(path = %path.display(), "config resolved"),
            Ok(path) => debug!(path = %path.display(), "config missing, using defaults"),
            Err(err) => debug!(error = %err, "config unavailable"),
        }
    }
    let db_path = paths::resolve_db_path(db_path).with_context(|| "resolve database path")?;
    debug!(path = %db_path.display(), "database path resolved");

    let store =
        Store::open(&db_path).with_context(|| format!("open database {}", db_path.display()))?;
    store.migrate().with_context(|| "run migrations")?;

    if let Command::Run(args) = command {
        return run::run(store, &app_config, json, args);
    }

    let ctx = Context {
        store: &store,
        json,
        config: &app_config,
    };

    match command {
        Command::Lead(cmd) => match cmd {
            leads::LeadCommand::Add(args) => leads::add_lead(&ctx, args),
            leads::LeadCommand::List(args) => leads::list_leads(&ctx, args),
            leads::LeadCommand::Show(args) => leads::show_lead(&ctx, args),
            leads::LeadCommand::Edit(args) => leads::edit_lead(&ctx, args),
            leads::LeadCommand::Retire(args) => leads::retire_lead(&ctx, args),
        },
        Command::Agent(cmd) => match cmd {
            agents::AgentCommand::Add(args) => agents::add_agent(&ctx, args),
            agents::AgentCommand::List(args) => agents::list_agents(&ctx, args),
            agents::AgentCommand::Available(args) => agents::set_available(&ctx, args, true),
            agents::AgentCommand::Unavailable(args) => agents::set_available(&ctx, args, false),
            agents::AgentCommand::Deactivate(args) => agents::deactivate_agent(&ctx, args),
        },
        Command::Outcome(args) => outcome::apply_outcome(&ctx, args),
        Command::ResetStuck(args) => recovery::reset_stuck(&ctx, args),
        Command::Stats => stats::show_stats(&ctx),
        Command::Run(_) | Command::Completions(_) => Ok(()),
    }
}

fn init_logging(verbose: bool, long_running: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose {
        "debug"
    } else if long_running {
        "info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
