//! Checkpoint sinks for per-generation run records.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::schema::CheckpointRecord;

/// Checkpoint I/O error.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Checkpoint serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Receives one record per completed generation.
pub trait CheckpointSink {
    fn checkpoint(&mut self, record: &CheckpointRecord) -> Result<(), PersistenceError>;
}

/// Append-only JSON-lines checkpoint file.
///
/// Each record is written on its own line and flushed immediately, so the
/// last complete line survives a crash mid-run.
pub struct JsonLinesCheckpoints {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl JsonLinesCheckpoints {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written by this sink.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl CheckpointSink for JsonLinesCheckpoints {
    fn checkpoint(&mut self, record: &CheckpointRecord) -> Result<(), PersistenceError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryCheckpoints {
    pub records: Vec<CheckpointRecord>,
}

impl MemoryCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&CheckpointRecord> {
        self.records.last()
    }
}

impl CheckpointSink for MemoryCheckpoints {
    fn checkpoint(&mut self, record: &CheckpointRecord) -> Result<(), PersistenceError> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Read every record from a JSON-lines checkpoint file. Blank lines are
/// skipped.
pub fn load_checkpoints<P: AsRef<Path>>(path: P) -> Result<Vec<CheckpointRecord>, PersistenceError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
