//! `stackadm` CLI.
//!
//! Works directly on the project directory, without the server. `run-step`
//! is what the boot-time systemd unit and the cron entry invoke on hosts
//! where the console process is not kept alive.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use stackadm_core::autostart::{Autostart, DEFAULT_UNIT};
use stackadm_core::command::{CommandRunner, SystemCommandRunner};
use stackadm_core::layout::ProjectLayout;
use stackadm_core::runner::StepRunner;
use stackadm_core::setup_log::SetupLog;
use stackadm_core::state::{SetupState, SetupStore};
use stackadm_core::step::{self, StepStatus};
use stackadm_core::view::SetupView;
use stackadm_storage::DocumentStore;

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

// ── CLI structure ────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "stackadm",
    version,
    about = "stackadm CLI: inspect and drive the stack setup sequence",
    long_about = None,
)]
struct Cli {
    /// Deployment directory holding the Makefile and `.env`.
    #[arg(long, env = "STACKADM_PROJECT_DIR", default_value = ".")]
    project_dir: PathBuf,

    /// systemd unit removed once the last step has run.
    #[arg(long, env = "STACKADM_AUTOSTART_UNIT", default_value = DEFAULT_UNIT)]
    autostart_unit: String,

    /// Disable colored output.
    #[arg(long, default_value = "false")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every step with its status.
    Status,
    /// List the setup sequence with commands and titles.
    Steps,
    /// Run the first requested step, if any, then print state and log.
    RunStep,
}

/// Colors, or nothing with `--no-color`.
#[derive(Clone, Copy)]
struct Palette {
    enabled: bool,
}

impl Palette {
    fn paint(self, color: &'static str, text: &str) -> String {
        if self.enabled {
            format!("{color}{text}{RESET}")
        } else {
            text.to_owned()
        }
    }

    fn status(self, status: StepStatus) -> String {
        let color = match status {
            StepStatus::Done => GREEN,
            StepStatus::Failed => RED,
            StepStatus::Requested | StepStatus::InProgress => YELLOW,
            StepStatus::Pending => DIM,
        };
        // Pad before painting so escape codes do not skew the columns.
        self.paint(color, &format!("{:<12}", status.as_str()))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let palette = Palette {
        enabled: !cli.no_color,
    };

    match run(cli, palette).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", palette.paint(RED, "error:"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, palette: Palette) -> Result<()> {
    let layout = ProjectLayout::new(&cli.project_dir);
    match cli.command {
        Commands::Status => cmd_status(&layout, palette).await,
        Commands::Steps => {
            cmd_steps(palette);
            Ok(())
        }
        Commands::RunStep => cmd_run_step(&layout, &cli.autostart_unit, palette).await,
    }
}

fn stores(layout: &ProjectLayout) -> (SetupStore, SetupLog) {
    let store: Arc<dyn DocumentStore> = Arc::new(layout.store());
    (
        SetupStore::new(Arc::clone(&store), ProjectLayout::STATE_FILE),
        SetupLog::new(store, ProjectLayout::SETUP_LOG),
    )
}

// ── Commands ─────────────────────────────────────────────────────────

async fn cmd_status(layout: &ProjectLayout, palette: Palette) -> Result<()> {
    let (states, _) = stores(layout);
    let state = states.load().await.context("failed to load setup state")?;
    print_state(&state, palette);
    Ok(())
}

fn cmd_steps(palette: Palette) {
    for (position, step) in step::steps().iter().enumerate() {
        let command = step.command.to_string();
        println!(
            "{position}  {}  {command:<20} {}",
            palette.paint(BOLD, &format!("{:<14}", step.id.as_str())),
            step.title
        );
    }
}

async fn cmd_run_step(layout: &ProjectLayout, unit: &str, palette: Palette) -> Result<()> {
    let (states, log) = stores(layout);
    let mut state = states.load().await.context("failed to load setup state")?;

    let commands: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new(layout.root()));
    let runner = StepRunner::new(states, log.clone(), Arc::clone(&commands))
        .with_autostart(Autostart::new(commands, unit));

    match runner
        .run_pending_step(&mut state)
        .await
        .context("failed to run setup step")?
    {
        Some(run) => {
            let line = format!("ran {} → {}", run.step, run.status);
            println!("{}", palette.paint(CYAN, &line));
            if let Some(next) = run.advanced {
                println!("requested {next}");
            }
        }
        None => println!("no step requested"),
    }
    println!();

    print_state(&state, palette);

    let text = log.read().await.context("failed to read setup log")?;
    if !text.trim().is_empty() {
        println!();
        println!("{}", palette.paint(DIM, "── setup log ──"));
        println!("{}", text.trim_start());
    }
    Ok(())
}

fn print_state(state: &SetupState, palette: Palette) {
    for (id, status) in state.iter() {
        println!("{:<14} {} {}", id.as_str(), palette.status(status), id.title());
    }
    if let Some(restore) = state.restore_backup() {
        println!("restore_backup: {}", restore.as_str());
    }

    let summary = match SetupView::resolve(state) {
        SetupView::InitialForm => "waiting for initial settings".to_owned(),
        SetupView::Progress { step, status } => format!("{step} is {status}"),
        SetupView::Failed { step } => format!("{step} failed"),
        SetupView::Complete => "setup complete".to_owned(),
    };
    println!("{}", palette.paint(BOLD, &summary));
}
