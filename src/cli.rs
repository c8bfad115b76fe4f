use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tiatrack")]
#[command(about = "Tracks tags, blocks and hardware across PLC project archive uploads")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// SQLite database file (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Extraction worker threads
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Debug logging and extra detail in text output
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a snapshot of a project archive
    Ingest(IngestArgs),

    /// List projects and their snapshot counts, or add one
    Projects(ProjectsArgs),

    /// List the snapshots of one project, newest first
    Snapshots(SnapshotsArgs),

    /// Display one snapshot and its records
    Show(ShowArgs),

    /// Compare two snapshots
    Diff(DiffArgs),
}

#[derive(Parser)]
pub struct IngestArgs {
    /// Archive to ingest
    pub archive: PathBuf,

    /// Project the snapshot belongs to (created on first use)
    #[arg(long)]
    pub project: String,

    /// Who is uploading
    #[arg(long)]
    pub operator: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ProjectsArgs {
    #[command(subcommand)]
    pub action: Option<ProjectsAction>,
}

#[derive(Subcommand)]
pub enum ProjectsAction {
    /// Create a project before its first upload
    Add(ProjectAddArgs),
}

#[derive(Parser)]
pub struct ProjectAddArgs {
    pub name: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct SnapshotsArgs {
    #[arg(long)]
    pub project: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ShowArgs {
    pub id: i64,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct DiffArgs {
    /// Older snapshot ID
    #[arg(long, requires = "to")]
    pub from: Option<i64>,

    /// Newer snapshot ID
    #[arg(long, requires = "from")]
    pub to: Option<i64>,

    /// Compare the two most recent snapshots of this project
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub project: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
