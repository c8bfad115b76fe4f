use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tiatrack::cli::{Cli, Command, DiffArgs, IngestArgs, ProjectsAction};
use tiatrack::config::{Config, ConfigError, Overrides};
use tiatrack::extract::Extractor;
use tiatrack::ingest::{IngestError, IngestRequest, Ingestor};
use tiatrack::logging;
use tiatrack::report::{json, table, SnapshotDetail, SnapshotList};
use tiatrack::store::{self, diff, SnapshotId, Store, StoreError};

/// A failed command: exit 2 when the input was at fault, 1 otherwise.
struct Failure {
    message: String,
    rejected: bool,
}

impl Failure {
    fn rejected(message: impl Into<String>) -> Self {
        Failure {
            message: message.into(),
            rejected: true,
        }
    }

    fn fault(message: impl Into<String>) -> Self {
        Failure {
            message: message.into(),
            rejected: false,
        }
    }

    fn exit_code(&self) -> ExitCode {
        ExitCode::from(if self.rejected { 2 } else { 1 })
    }
}

impl From<IngestError> for Failure {
    fn from(e: IngestError) -> Self {
        Failure {
            rejected: e.is_rejected_input(),
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for Failure {
    fn from(e: StoreError) -> Self {
        Failure {
            rejected: e.is_rejected_input(),
            message: e.to_string(),
        }
    }
}

impl From<ConfigError> for Failure {
    fn from(e: ConfigError) -> Self {
        Failure::fault(e.to_string())
    }
}

impl From<serde_json::Error> for Failure {
    fn from(e: serde_json::Error) -> Self {
        Failure::fault(format!("failed to render JSON: {e}"))
    }
}

impl From<rayon::ThreadPoolBuildError> for Failure {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Failure::fault(format!("failed to start extraction workers: {e}"))
    }
}

fn database_path(config: &Config) -> Result<PathBuf, StoreError> {
    match &config.database_path {
        Some(path) => Ok(path.clone()),
        None => store::snapshot::default_db_path(),
    }
}

fn ingest(store: &mut Store, config: &Config, args: &IngestArgs, verbose: bool) -> Result<(), Failure> {
    let extractor = Extractor::new(config.workers())?;
    let tool = config.export.as_ref().map(|e| e.tool()).transpose()?;

    let mut ingestor = Ingestor::new(store, &extractor, config.limits);
    if let (Some(tool), Some(export)) = (&tool, &config.export) {
        ingestor = ingestor.with_export_tool(tool, export.extensions.clone());
    }

    let outcome = ingestor.ingest(&IngestRequest {
        archive_path: &args.archive,
        project: &args.project,
        operator: &args.operator,
    })?;

    if args.json {
        println!("{}", json::render(&outcome)?);
    } else {
        print!("{}", table::render_ingest(&outcome, verbose));
    }
    Ok(())
}

fn diff_ids(store: &Store, args: &DiffArgs) -> Result<(SnapshotId, SnapshotId), Failure> {
    if let (Some(from), Some(to)) = (args.from, args.to) {
        return Ok((from, to));
    }
    let Some(name) = &args.project else {
        return Err(Failure::rejected("pass --from and --to, or --project"));
    };

    let project = store
        .find_project(name)?
        .ok_or_else(|| StoreError::ProjectNotFound(name.clone()))?;
    let (older, newer) = store.latest_pair(project.id)?.ok_or_else(|| {
        Failure::rejected(format!("project '{name}' needs at least 2 snapshots to compare"))
    })?;
    Ok((older.id, newer.id))
}

fn run(cli: Cli) -> Result<(), Failure> {
    let verbose = cli.global.verbose;

    let mut config = Config::load(cli.global.config.as_deref())?;
    config.apply(&Overrides {
        database_path: cli.global.db.clone(),
        workers: cli.global.workers,
    });
    config.validate()?;

    let mut store = Store::open(&database_path(&config)?)?;

    match cli.command {
        Command::Ingest(args) => ingest(&mut store, &config, &args, verbose)?,
        Command::Projects(args) => match args.action {
            None => {
                let projects = store.list_projects()?;
                print!("{}", table::render_projects(&projects));
            }
            Some(ProjectsAction::Add(add)) => {
                let project = store.create_project(&add.name)?;
                if add.json {
                    println!("{}", json::render(&project)?);
                } else {
                    print!("{}", table::render_project(&project));
                }
            }
        },
        Command::Snapshots(args) => {
            let project = store
                .find_project(&args.project)?
                .ok_or_else(|| StoreError::ProjectNotFound(args.project.clone()))?;
            let snapshots = store.list_snapshots(project.id)?;
            let list = SnapshotList { project, snapshots };

            if args.json {
                println!("{}", json::render(&list)?);
            } else {
                print!("{}", table::render_snapshots(&list));
            }
        }
        Command::Show(args) => {
            let snapshot = store
                .get_snapshot(args.id)?
                .ok_or(StoreError::SnapshotNotFound(args.id))?;
            let entities = store.get_entities(args.id)?;
            let detail = SnapshotDetail { snapshot, entities };

            if args.json {
                println!("{}", json::render(&detail)?);
            } else {
                print!("{}", table::render_snapshot(&detail));
            }
        }
        Command::Diff(args) => {
            let (from, to) = diff_ids(&store, &args)?;
            let comparison = diff::compare(&store, from, to)?;

            if args.json {
                println!("{}", json::render_comparison(&comparison)?);
            } else {
                print!("{}", table::render_comparison(&comparison));
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.global.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("error: {}", failure.message);
            failure.exit_code()
        }
    }
}
