//! External export tool.
//!
//! Some project archives can only be read by the vendor's own automation
//! tooling, which runs out of process and writes one XML file per exported
//! entity into an output directory. This module treats that tool as a black
//! box invoked as `program [args…] <archive> <output_dir>`:
//! - exit status 0: the directory holds the export (possibly empty)
//! - anything else: failure, the directory is thrown away
//!
//! Runs can take minutes, so output is relayed to the log line by line while
//! the process runs, and every run is bounded by a timeout.

use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to start export tool '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("export tool failed ({})", exit_label(.code))]
    Failed { code: Option<i32> },
    #[error("export tool timed out after {}", format_timeout(.0))]
    TimedOut(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}

fn format_timeout(timeout: &Duration) -> String {
    humantime::format_duration(*timeout).to_string()
}

pub trait ExportTool: Send + Sync {
    fn name(&self) -> &str;

    /// Populates `output_dir` with XML exports of `archive`.
    fn export(&self, archive: &Path, output_dir: &Path) -> Result<(), ExportError>;
}

#[derive(Debug, Clone)]
pub struct CommandExportTool {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandExportTool {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        CommandExportTool {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn relay<R: Read + Send + 'static>(reader: R, stream: Stream) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match stream {
                Stream::Stdout => info!(target: "tiatrack::export::tool", "{line}"),
                Stream::Stderr => warn!(target: "tiatrack::export::tool", "{line}"),
            }
        }
    })
}

impl ExportTool for CommandExportTool {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("export tool")
    }

    fn export(&self, archive: &Path, output_dir: &Path) -> Result<(), ExportError> {
        info!(
            program = %self.program.display(),
            archive = %archive.display(),
            output = %output_dir.display(),
            "starting export tool"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(archive)
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExportError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let relays: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|out| relay(out, Stream::Stdout)),
            child.stderr.take().map(|err| relay(err, Stream::Stderr)),
        ]
        .into_iter()
        .flatten()
        .collect();

        let start = Instant::now();
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    if start.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        // relays are left to finish on their own; a grandchild
                        // may still hold the pipes open
                        error!(timeout = ?self.timeout, "export tool timed out, killed");
                        return Err(ExportError::TimedOut(self.timeout));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };

        for handle in relays {
            let _ = handle.join();
        }

        if status.success() {
            info!(elapsed = ?start.elapsed(), "export tool finished");
            Ok(())
        } else {
            error!(code = ?status.code(), "export tool failed");
            Err(ExportError::Failed {
                code: status.code(),
            })
        }
    }
}

/// Runs `tool` into a fresh temporary directory.
///
/// On failure the directory and anything partially written to it is removed
/// before returning. On success the caller owns it; it is removed on drop.
pub fn export_to_tempdir(tool: &dyn ExportTool, archive: &Path) -> Result<TempDir, ExportError> {
    let dir = tempfile::Builder::new().prefix("tiatrack-export-").tempdir()?;
    tool.export(archive, dir.path())?;
    Ok(dir)
}
