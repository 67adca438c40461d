use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HISTORY_FILE: &str = ".simcull-history.jsonl";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One deleted image.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeletionRecord {
    pub timestamp: String,
    pub image: String,
    /// blake3 of the file contents just before it was removed
    pub digest: Option<String>,
    /// Image that was on screen when a similar image was deleted
    pub kept: Option<String>,
    pub score: Option<f32>,
}

impl DeletionRecord {
    pub fn new(image: &str, digest: Option<String>, kept: Option<(&str, f32)>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            image: image.to_string(),
            digest,
            kept: kept.map(|(name, _)| name.to_string()),
            score: kept.map(|(_, score)| score),
        }
    }
}

/// Append-only JSON-lines journal of deletions, stored inside the folder.
#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
}

impl History {
    pub fn in_folder(folder: &Path) -> Self {
        Self {
            path: folder.join(HISTORY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &DeletionRecord) -> Result<(), HistoryError> {
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        let line = serde_json::to_string(record)?;
        writeln!(out, "{}", line).map_err(|source| self.io_error(source))?;
        Ok(())
    }

    /// All readable records, oldest first. A missing journal is empty;
    /// malformed lines are skipped.
    pub fn records(&self) -> Result<Vec<DeletionRecord>, HistoryError> {
        let f = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };

        let mut records = Vec::new();
        for (i, line) in BufReader::new(f).lines().enumerate() {
            let line = line.map_err(|source| self.io_error(source))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DeletionRecord>(&line) {
                Ok(rec) => records.push(rec),
                Err(err) => log::warn!("Skipping malformed history entry {}: {}", i, err),
            }
        }
        Ok(records)
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// blake3 digest of a file, hex encoded.
pub fn file_digest(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
