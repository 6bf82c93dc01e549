//! CLI entry point for tagflow.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use tagflow_app::{IndexRepository, ProjectConfig, TaskService};
use tagflow_store_fs::FsStore;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod commands;

/// Tag-driven workflows over Markdown checklists.
#[derive(Parser, Debug)]
#[command(
    name = "tagflow",
    version,
    about = "tagflow: workflows, projects and priorities from tags in Markdown checklists"
)]
struct Cli {
    /// Vault directory (defaults to current).
    #[arg(long, default_value = ".")]
    vault: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tasks.
    Ls(LsArgs),

    /// List registered workflows with progress.
    Workflows {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show the project tree.
    Projects {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Report index issues and orphaned tasks.
    Check {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Set the status glyph of a task.
    Status {
        #[arg(long)]
        task: String,
        /// Glyph to put between the brackets (`x`, `/`, `-`, or empty for open).
        #[arg(long, allow_hyphen_values = true)]
        set: String,
    },

    /// Toggle a task between open and done.
    Toggle {
        #[arg(long)]
        task: String,
    },

    /// Replace the text of a task.
    Edit {
        #[arg(long)]
        task: String,
        #[arg(long)]
        text: String,
    },

    /// Add or remove a tag.
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Set or clear the priority of a task.
    #[command(group(ArgGroup::new("choice").required(true).args(["rank", "clear"])))]
    Priority {
        #[arg(long)]
        task: String,
        /// Rank to set, 0 is the highest.
        #[arg(long)]
        rank: Option<usize>,
        /// Remove every priority tag.
        #[arg(long)]
        clear: bool,
    },

    /// Move a task through its workflow.
    #[command(group(ArgGroup::new("move").required(true).args(["advance", "set", "toggle"])))]
    Step {
        #[arg(long)]
        task: String,
        /// Chain workflows: go to the next step.
        #[arg(long)]
        advance: bool,
        /// Chain workflows: go to this step.
        #[arg(long)]
        set: Option<String>,
        /// Checkbox workflows: flip this step.
        #[arg(long)]
        toggle: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TagAction {
    /// Append a tag.
    Add {
        #[arg(long)]
        task: String,
        #[arg(long)]
        tag: String,
    },
    /// Remove a tag.
    Remove {
        #[arg(long)]
        task: String,
        #[arg(long)]
        tag: String,
    },
}

#[derive(Args, Debug)]
struct LsArgs {
    #[arg(short = 'w', long = "workflow")]
    workflows: Vec<String>,
    #[arg(long = "step")]
    steps: Vec<String>,
    #[arg(short = 'p', long = "project")]
    projects: Vec<String>,
    /// Status kinds to include (todo, in_progress, done, cancelled, other).
    #[arg(long = "status")]
    statuses: Vec<String>,
    /// Status kinds to exclude.
    #[arg(long = "exclude-status")]
    exclude_statuses: Vec<String>,
    /// Priority ranks or priority tags.
    #[arg(long = "priority")]
    priorities: Vec<String>,
    #[arg(short = 't', long = "tag")]
    tags: Vec<String>,
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    orphans: bool,
    #[arg(long)]
    unclassified: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let Cli { vault, cmd } = Cli::parse();

    if should_install_tracing(&cmd) {
        install_tracing();
    }

    execute_command(Path::new(&vault), cmd)
}

fn execute_command(vault: &Path, command: Command) -> Result<()> {
    let store = Arc::new(FsStore::open(vault)?);
    let config = ProjectConfig::from_workdir(vault)?;
    let repository = Arc::new(IndexRepository::new(Arc::clone(&store), config));
    repository.reload().context("Failed to index vault")?;
    let service = TaskService::new(repository, store);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    commands::run(command, &service, &mut out)
}

/// Tracing stays off for JSON output.
const fn should_install_tracing(cmd: &Command) -> bool {
    let format = match cmd {
        Command::Ls(args) => args.format,
        Command::Workflows { format } | Command::Projects { format } | Command::Check { format } => *format,
        _ => OutputFormat::Table,
    };
    !matches!(format, OutputFormat::Json)
}

fn install_tracing() {
    // RUST_LOG overrides the INFO default.
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .compact()
        .try_init();
}
