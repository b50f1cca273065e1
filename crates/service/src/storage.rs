//! Append-only text files under the storage root, written by one task.
//!
//! Layout:
//! - `<root>/YY/MM/DD/<device>.txt` validated record lines for that UTC day
//! - `<root>/Error/<device>.txt` invalid records with their reason
//! - `<root>/ODP/<device>.txt` Gryphon-Pro event lines

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use tracklink_core::{DayBucket, DecodeOutcome, GpsRecord, PersistenceSink, route_outcome};

pub const ERROR_DIR: &str = "Error";
pub const EVENTS_DIR: &str = "ODP";

const LINE_END: &str = "\r\n";

/// File-backed [`PersistenceSink`].
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn day_path(&self, device: &str, day: DayBucket) -> PathBuf {
        let date = day.date();
        self.root
            .join(date.format("%y").to_string())
            .join(date.format("%m").to_string())
            .join(date.format("%d").to_string())
            .join(file_name(device))
    }

    pub fn error_path(&self, device: &str) -> PathBuf {
        self.root.join(ERROR_DIR).join(file_name(device))
    }

    pub fn events_path(&self, device: &str) -> PathBuf {
        self.root.join(EVENTS_DIR).join(file_name(device))
    }

    fn append(path: &Path, text: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        Ok(())
    }
}

impl PersistenceSink for FileStore {
    fn append_records(&mut self, device: &str, day: DayBucket, records: &[GpsRecord]) -> Result<()> {
        let text: String = records.iter().map(ToString::to_string).collect();
        Self::append(&self.day_path(device, day), &text)
    }

    fn append_error(&mut self, device: &str, record: &GpsRecord, reason: &str) -> Result<()> {
        let text = format!(
            "-{reason} {LINE_END}{}{LINE_END}{}",
            Local::now().format("%d.%m.%Y %H:%M:%S"),
            record.dated_line()
        );
        Self::append(&self.error_path(device), &text)
    }

    fn append_events(&mut self, device: &str, lines: &[String]) -> Result<()> {
        let text: String = lines.iter().map(|line| format!("{line}{LINE_END}")).collect();
        Self::append(&self.events_path(device), &text)
    }
}

/// Make a device name safe to use as a file name.
pub fn sanitize_device_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "unknown".to_string(),
        _ => cleaned,
    }
}

fn file_name(device: &str) -> String {
    format!("{}.txt", sanitize_device_name(device))
}

/// Work item for the storage writer.
#[derive(Debug)]
pub struct StorageCommand {
    pub device: String,
    pub outcome: DecodeOutcome,
}

/// Sending side of the storage queue, cloned into every connection.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    tx: mpsc::Sender<StorageCommand>,
}

impl StorageHandle {
    /// Queue `outcome` for persistence. Waits while the queue is full.
    pub async fn persist(&self, device: &str, outcome: DecodeOutcome) -> Result<()> {
        self.tx
            .send(StorageCommand {
                device: device.to_string(),
                outcome,
            })
            .await
            .context("Storage writer has stopped")
    }
}

/// Start the writer on a blocking thread. It runs until every
/// [`StorageHandle`] is dropped and the queue is drained.
pub fn spawn_writer<S>(mut sink: S, capacity: usize) -> (StorageHandle, JoinHandle<()>)
where
    S: PersistenceSink + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<StorageCommand>(capacity);
    let task = tokio::task::spawn_blocking(move || {
        while let Some(command) = rx.blocking_recv() {
            if let Err(e) = route_outcome(&mut sink, &command.device, &command.outcome) {
                error!(device = %command.device, "Failed to persist decode outcome: {e:#}");
            }
        }
        debug!("Storage writer stopped");
    });
    (StorageHandle { tx }, task)
}
