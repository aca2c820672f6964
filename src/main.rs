//! review-loop - stop hook that keeps a coding agent on its pull request
//!
//! Registered as a `Stop` hook, the binary reads the hook payload on stdin
//! and prints a block decision on stdout when the agent still has work to
//! do on its PR. Logs always go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use review_loop::config::LoopConfig;
use review_loop::decision::{self, Decision};
use review_loop::driver::{DriverDependencies, PollDriver};
use review_loop::escalation::{EscalationGovernor, FileHistoryStore};
use review_loop::hook::{HookInput, HookOutput};
use review_loop::repo;
use review_loop::ReviewLoopError;

#[derive(Parser)]
#[command(name = "review-loop")]
#[command(version)]
#[command(about = "Stop hook that keeps a coding agent working until its PR is done", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Defaults to `stop`
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the stop hook: read the payload on stdin, print a decision on stdout
    Stop {
        /// Seconds between review service polls
        #[arg(long, value_name = "SECS")]
        poll_interval: Option<u64>,

        /// Seconds without review activity before giving up
        #[arg(long, value_name = "SECS")]
        max_idle: Option<u64>,
    },

    /// Show what the hook sees for the project, without polling
    Inspect {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the repeated-block history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List recorded block fingerprints, oldest first
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget all recorded blocks
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Stdout carries the hook protocol, so logs go to stderr
    let filter = if cli.verbose {
        "review_loop=debug,info"
    } else {
        "review_loop=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    match run(cli.command, &project_path).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            let code = e
                .downcast_ref::<ReviewLoopError>()
                .map_or(1, ReviewLoopError::exit_code);
            std::process::exit(code);
        }
    }
}

async fn run(command: Option<Commands>, project_path: &Path) -> anyhow::Result<i32> {
    match command.unwrap_or(Commands::Stop {
        poll_interval: None,
        max_idle: None,
    }) {
        Commands::Stop {
            poll_interval,
            max_idle,
        } => stop(project_path, poll_interval, max_idle).await,

        Commands::Inspect { json } => {
            inspect(project_path, json).await?;
            Ok(0)
        }

        Commands::History { action } => {
            let config = load_config(project_path)?;
            let governor = EscalationGovernor::new(
                std::sync::Arc::new(FileHistoryStore::new(&config.history_file)),
                config.max_repeated_blocks,
            );
            match action {
                HistoryAction::Show { json } => {
                    let entries = governor.history()?;
                    if json {
                        let value = serde_json::json!({
                            "path": governor.location(),
                            "capacity": config.max_repeated_blocks,
                            "entries": entries,
                        });
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    } else {
                        println!("\n{} Block History", "History:".cyan().bold());
                        println!("{}", "─".repeat(40));
                        println!("   File: {}", governor.location());
                        println!(
                            "   Entries: {}/{}",
                            entries.len(),
                            config.max_repeated_blocks
                        );
                        for entry in &entries {
                            println!("   • {entry}");
                        }
                    }
                }
                HistoryAction::Clear => {
                    governor.reset()?;
                    println!("{} Cleared {}", "✓".green(), governor.location());
                }
            }
            Ok(0)
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                let config = load_config(project_path)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                } else {
                    println!("\n{} Review Loop Configuration", "Config:".cyan().bold());
                    println!("{}", "─".repeat(40));
                    println!("   Service URL: {}", config.service_url);
                    println!("   Poll interval: {}s", config.poll_interval_secs);
                    println!("   Max idle: {}s", config.max_idle_secs);
                    println!("   Max repeated blocks: {}", config.max_repeated_blocks);
                    println!("   History file: {}", config.history_file.display());
                    println!("   Fetch timeout: {}s", config.fetch_timeout_secs);
                    println!("   HTTP timeout: {}s", config.http_timeout_secs);
                    println!(
                        "   Disabled: {}",
                        if config.disabled {
                            "yes".yellow()
                        } else {
                            "no".green()
                        }
                    );
                }
                Ok(0)
            }
        },
    }
}

/// Load and validate the configuration for the repository containing `dir`.
fn load_config(dir: &Path) -> anyhow::Result<LoopConfig> {
    let root = repo::find_repo_root(dir);
    let config = LoopConfig::load(&root)?;
    config.validate()?;
    Ok(config)
}

async fn stop(
    project_path: &Path,
    poll_interval: Option<u64>,
    max_idle: Option<u64>,
) -> anyhow::Result<i32> {
    let stdin = std::io::stdin();
    let input = if stdin.is_terminal() {
        HookInput::default()
    } else {
        HookInput::read_from(stdin.lock())
    };
    let cwd = input.working_dir(project_path);

    // A hook that cannot configure itself must never trap the agent
    let mut config = match load_config(&cwd) {
        Ok(config) => config,
        Err(e) => {
            warn!("Review loop not configured, allowing stop: {e:#}");
            return Ok(0);
        }
    };
    if let Some(secs) = poll_interval.filter(|s| *s > 0) {
        config.poll_interval_secs = secs;
    }
    if let Some(secs) = max_idle {
        config.max_idle_secs = secs;
    }

    let deps = match DriverDependencies::real(&config) {
        Ok(deps) => deps,
        Err(e) => {
            warn!("Could not set up review service client, allowing stop: {e}");
            return Ok(0);
        }
    };

    let mut driver = PollDriver::new(config.clone(), deps);
    match driver.run(&cwd).await {
        Decision::Allow => Ok(0),
        Decision::Block(reason) => {
            let output = HookOutput::block(&reason)
                .to_json()
                .context("Failed to serialize hook output")?;
            println!("{output}");
            Ok(0)
        }
        Decision::Terminate => {
            let err = ReviewLoopError::IdleTimeout {
                idle: driver.idle(),
                ceiling: config.max_idle(),
            };
            error!("{err}. Ending.");
            Ok(err.exit_code())
        }
    }
}

async fn inspect(project_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(project_path)?;
    let driver = PollDriver::new(config.clone(), DriverDependencies::real(&config)?);
    let survey = driver.survey(project_path).await;

    let gate = survey
        .as_ref()
        .and_then(|s| decision::gate(&s.repo, s.session.as_ref(), &s.repo_path()));

    if json {
        let value = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "root": survey.as_ref().map(|s| s.repo_path()),
            "repo": survey.as_ref().map(|s| &s.repo),
            "session": survey.as_ref().and_then(|s| s.session.as_ref()),
            "gate": gate.as_ref().map(|reason| reason.class),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let Some(survey) = survey else {
        println!(
            "{} {} is not a git repository with a checked-out branch",
            "Note:".yellow().bold(),
            project_path.display()
        );
        return Ok(());
    };

    println!("\n{} {}", "Repository:".cyan().bold(), survey.repo_path());
    println!("{}", "─".repeat(40));
    println!("   Branch: {}", survey.repo.branch);
    println!("   Default branch: {}", survey.repo.default_branch);
    println!(
        "   Uncommitted changes: {}",
        survey.repo.uncommitted_changes.len()
    );
    println!("   Unpushed commits: {}", survey.repo.unpushed_commit_count);
    println!(
        "   Conflicting files: {}",
        survey.repo.conflicting_paths.len()
    );

    match &survey.session {
        Some(session) => println!(
            "   Session: {} ({:?}, {}, {})",
            session.id,
            session.session_type,
            session.review_label(),
            session.lifecycle_state
        ),
        None => println!("   Session: {}", "none".dimmed()),
    }

    match gate {
        Some(reason) => println!("\n{} {}", "Would block:".red().bold(), reason.class),
        None => println!("\n{} gating passed; the hook would poll", "✓".green()),
    }
    Ok(())
}
