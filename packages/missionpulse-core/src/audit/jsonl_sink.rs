//! Append-only JSON-lines audit trail.
//!
//! Line format: `<crc32 as 8 hex digits>\t<audit record JSON>\n`. The
//! checksum covers the JSON payload. Lines that fail the checksum or do not
//! parse (e.g. a write torn by a crash) are skipped on read. A failed append
//! is truncated away, and a torn tail left by another writer is terminated
//! before the next append, so a new line never joins a torn one.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{AuditEntry, AuditFilter, AuditRecord, AuditSink};
use crate::error::StoreError;

/// Audit sink appending one checksummed JSON line per record.
#[derive(Debug, Clone)]
pub struct JsonlAuditSink {
    path: PathBuf,
    /// Append handle; also held while reading so readers never see a
    /// half-written line
    file: Arc<Mutex<File>>,
}

impl JsonlAuditSink {
    /// Opens or creates the trail at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_error)?;
        terminate_torn_line(&mut file).map_err(io_error)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Path of the trail file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Ends a torn final line so the next append starts on a fresh line.
fn terminate_torn_line(file: &mut File) -> std::io::Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        tracing::warn!("Audit trail ends with a torn line; terminating it");
        file.write_all(b"\n")?;
        file.sync_data()?;
    }
    Ok(())
}

fn io_error(e: std::io::Error) -> StoreError {
    StoreError::Io(e.to_string())
}

/// Encodes one record as a checksummed line, newline included.
fn encode_line(record: &AuditRecord) -> Result<String, StoreError> {
    let payload = serde_json::to_string(record)?;
    let crc = crc32fast::hash(payload.as_bytes());
    Ok(format!("{:08x}\t{}\n", crc, payload))
}

/// Decodes one line, returning `None` if it is torn or corrupt.
fn decode_line(line: &str) -> Option<AuditRecord> {
    let (crc, payload) = line.split_once('\t')?;
    let expected = u32::from_str_radix(crc, 16).ok()?;
    if crc32fast::hash(payload.as_bytes()) != expected {
        return None;
    }
    serde_json::from_str(payload).ok()
}

fn read_records(path: &Path) -> Result<Vec<AuditRecord>, StoreError> {
    let reader = BufReader::new(File::open(path).map_err(io_error)?);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_error)?;
        if line.is_empty() {
            continue;
        }
        match decode_line(&line) {
            Some(record) => records.push(record),
            None => tracing::warn!(
                "Skipping corrupt audit line {} in {}",
                index + 1,
                path.display()
            ),
        }
    }
    Ok(records)
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<AuditRecord, StoreError> {
        let record = entry.into_record(Uuid::new_v4().to_string(), Utc::now());
        let line = encode_line(&record)?;
        let file = self.file.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut file = file.lock();
            terminate_torn_line(&mut file)?;
            let before = file.metadata()?.len();
            let written = file
                .write_all(line.as_bytes())
                .and_then(|_| file.flush())
                .and_then(|_| file.sync_data());
            if let Err(e) = written {
                if let Err(rollback) = file.set_len(before) {
                    tracing::error!(
                        "Failed to roll back partial audit line: {}",
                        rollback
                    );
                }
                return Err(e);
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Io(format!("Audit writer task failed: {}", e)))?
        .map_err(io_error)?;

        Ok(record)
    }

    async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, StoreError> {
        let file = self.file.clone();
        let path = self.path.clone();
        let filter = filter.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<AuditRecord>, StoreError> {
            let _guard = file.lock();
            let records = read_records(&path)?;
            Ok(records
                .into_iter()
                .rev()
                .filter(|r| filter.matches(r))
                .take(filter.limit)
                .collect())
        })
        .await
        .map_err(|e| StoreError::Io(format!("Audit reader task failed: {}", e)))?
    }
}
