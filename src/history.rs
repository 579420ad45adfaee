use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use ::time::{format_description::well_known, OffsetDateTime};
use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::types::{HistoryEntry, HistoryLog, HistoryRequest, NewHistoryEntry};

/// What was found on disk when the history file was read.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Missing,
    Loaded,
    /// The file exists but reading it failed (permissions, descriptor limits, ...).
    Unreadable(String),
    /// The file was read but does not hold a history log.
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub entries: HistoryLog,
    pub state: LoadState,
}

/// Synchronous access to the JSON history file. Holds no cached state: every
/// call goes to disk.
#[derive(Debug, Clone)]
pub struct HistoryFile {
    path: PathBuf,
}

impl HistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file and report whether it was missing, valid or unreadable.
    pub fn load(&self) -> Snapshot {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Snapshot {
                    entries: Vec::new(),
                    state: LoadState::Missing,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(path = %self.path.display(), %reason, "history file unreadable, treating as empty");
                return Snapshot {
                    entries: Vec::new(),
                    state: LoadState::Unreadable(reason),
                };
            }
        };
        match serde_json::from_str::<HistoryLog>(&raw) {
            Ok(entries) => Snapshot {
                entries,
                state: LoadState::Loaded,
            },
            Err(e) => {
                let reason = e.to_string();
                warn!(path = %self.path.display(), %reason, "history file corrupt, treating as empty");
                Snapshot {
                    entries: Vec::new(),
                    state: LoadState::Corrupt(reason),
                }
            }
        }
    }

    /// Full log, newest first. Missing or unreadable files yield an empty log.
    pub fn read_all(&self) -> HistoryLog {
        self.load().entries
    }

    /// Stamp `new` with a fresh id and timestamp, put it at the head of the log
    /// and rewrite the whole file.
    ///
    /// A corrupt file is copied aside first so its content survives the rewrite; if
    /// that copy fails, or the file could not be read at all, nothing is written.
    pub fn append(&self, new: NewHistoryEntry) -> Result<HistoryEntry> {
        let snapshot = self.load();
        match &snapshot.state {
            LoadState::Unreadable(reason) => {
                bail!("history file {} could not be read: {reason}", self.path.display())
            }
            LoadState::Corrupt(_) => self.quarantine()?,
            LoadState::Missing | LoadState::Loaded => {}
        }

        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            target: new.target,
            options: new.options,
            timestamp: now_iso_local(),
            results: new.results,
        };
        let mut entries = snapshot.entries;
        entries.insert(0, entry.clone());
        self.write(&entries)?;
        Ok(entry)
    }

    fn write(&self, entries: &HistoryLog) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory: {}", dir.display()))?;
        }
        let body = serde_json::to_vec_pretty(entries).context("failed to encode history")?;
        let tmp = self.sibling("tmp");
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to create history file: {}", tmp.display()))?;
        file.write_all(&body)
            .and_then(|()| file.sync_all())
            .with_context(|| format!("failed to write history file: {}", tmp.display()))?;
        drop(file);
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace history file: {}", self.path.display()))?;
        Ok(())
    }

    /// Copy the current file to `<file>.corrupt-<unix>`, never replacing an existing copy.
    fn quarantine(&self) -> Result<()> {
        let dest = self.sibling(&format!(
            "corrupt-{}",
            OffsetDateTime::now_utc().unix_timestamp()
        ));
        let mut src = File::open(&self.path)
            .with_context(|| format!("failed to open history file: {}", self.path.display()))?;
        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&dest)
            .with_context(|| format!("failed to create backup: {}", dest.display()))?;
        io::copy(&mut src, &mut out)
            .and_then(|_| out.sync_all())
            .with_context(|| format!("failed to write backup: {}", dest.display()))?;
        warn!(path = %dest.display(), "copied corrupt history aside");
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{suffix}"));
        self.path.with_file_name(name)
    }
}

/// RFC3339 timestamp on the local clock, UTC when the local offset is unknown.
fn now_iso_local() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

enum Command {
    ReadAll {
        reply: oneshot::Sender<HistoryLog>,
    },
    Append {
        entry: NewHistoryEntry,
        reply: oneshot::Sender<Result<HistoryEntry>>,
    },
}

/// Handle to the task that owns the history file.
///
/// Every read and append goes through one channel and is applied in arrival
/// order, so concurrent appends never lose each other's entries.
#[derive(Clone, Debug)]
pub struct HistoryStore {
    tx: mpsc::Sender<Command>,
}

impl HistoryStore {
    /// Start the owning task. Must be called inside a tokio runtime.
    pub fn spawn(file: HistoryFile) -> Self {
        let (tx, rx) = mpsc::channel(64);
        info!(path = %file.path().display(), "history store started");
        tokio::spawn(run(file, rx));
        Self { tx }
    }

    pub async fn read_all(&self) -> Result<HistoryLog, ApiError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ReadAll { reply }).await?;
        rx.await.map_err(|_| store_gone())
    }

    /// Validate the submission, then persist it at the head of the log.
    pub async fn append(&self, req: HistoryRequest) -> Result<HistoryEntry, ApiError> {
        let entry = NewHistoryEntry::try_from(req)?;
        let (reply, rx) = oneshot::channel();
        self.send(Command::Append { entry, reply }).await?;
        Ok(rx.await.map_err(|_| store_gone())??)
    }

    async fn send(&self, cmd: Command) -> Result<(), ApiError> {
        self.tx.send(cmd).await.map_err(|_| store_gone())
    }
}

fn store_gone() -> ApiError {
    ApiError::Internal("history store is not running".into())
}

async fn run(file: HistoryFile, mut rx: mpsc::Receiver<Command>) {
    while let Some(cmd) = rx.recv().await {
        let file = file.clone();
        match cmd {
            Command::ReadAll { reply } => {
                let log = tokio::task::spawn_blocking(move || file.read_all())
                    .await
                    .unwrap_or_default();
                let _ = reply.send(log);
            }
            Command::Append { entry, reply } => {
                let res = tokio::task::spawn_blocking(move || file.append(entry))
                    .await
                    .map_err(anyhow::Error::from)
                    .and_then(|r| r);
                match &res {
                    Ok(e) => info!(id = %e.id, scan_target = %e.target, "history entry saved"),
                    Err(e) => error!(error = %e, "failed to save history entry"),
                }
                let _ = reply.send(res);
            }
        }
    }
}
