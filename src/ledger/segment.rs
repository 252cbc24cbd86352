//! Append-only ledger segment files.
//!
//! Signed entries are persisted as newline-delimited JSON. When the active
//! segment exceeds the configured size, a new sequentially numbered segment
//! is opened. Entries never move between segments and no segment is ever
//! rewritten.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::crypto::SignedEntry;
use crate::error::VaultError;

/// Writer for the active segment of one ledger session.
pub struct SegmentWriter {
    directory: PathBuf,
    session_id: String,
    sequence: u32,
    file: File,
    path: PathBuf,
    bytes_written: u64,
    max_segment_bytes: u64,
}

impl SegmentWriter {
    /// Open the first segment for a session, creating the ledger directory
    /// if needed.
    pub fn open(
        directory: &Path,
        session_id: &str,
        max_segment_bytes: u64,
    ) -> Result<Self, VaultError> {
        std::fs::create_dir_all(directory).map_err(|e| {
            VaultError::LedgerError(format!(
                "Failed to create ledger directory {}: {}",
                directory.display(),
                e
            ))
        })?;

        let sequence = 1;
        let path = segment_path(directory, session_id, sequence);
        let file = open_append(&path)?;

        info!("Opened ledger segment {}", path.display());
        Ok(Self {
            directory: directory.to_path_buf(),
            session_id: session_id.to_string(),
            sequence,
            file,
            path,
            bytes_written: 0,
            max_segment_bytes,
        })
    }

    /// Append one signed entry as a JSON line, rotating first if the active
    /// segment is full. The write is flushed before returning; a failed
    /// write is a hard error.
    pub fn append(&mut self, entry: &SignedEntry) -> Result<(), VaultError> {
        let line = serde_json::to_string(entry)?;
        let line_bytes = line.len() as u64 + 1;

        if self.bytes_written > 0 && self.bytes_written + line_bytes > self.max_segment_bytes {
            self.rotate()?;
        }

        writeln!(self.file, "{}", line)
            .map_err(|e| VaultError::LedgerError(format!("Failed to write ledger entry: {}", e)))?;
        self.file
            .flush()
            .map_err(|e| VaultError::LedgerError(format!("Failed to flush ledger segment: {}", e)))?;

        self.bytes_written += line_bytes;
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), VaultError> {
        self.sequence += 1;
        let path = segment_path(&self.directory, &self.session_id, self.sequence);
        self.file = open_append(&path)?;
        info!(
            "Rotated ledger segment {} -> {}",
            self.path.display(),
            path.display()
        );
        self.path = path;
        self.bytes_written = 0;
        Ok(())
    }

    pub fn active_path(&self) -> &Path {
        &self.path
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

fn segment_path(directory: &Path, session_id: &str, sequence: u32) -> PathBuf {
    let date = chrono::Utc::now().format("%Y%m%d");
    directory.join(format!("audit-{}-{}-{:04}.jsonl", date, session_id, sequence))
}

fn open_append(path: &Path) -> Result<File, VaultError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            VaultError::LedgerError(format!(
                "Failed to open ledger segment {}: {}",
                path.display(),
                e
            ))
        })
}

/// Load every signed entry from a segment file, in append order.
pub fn load_segment(path: &Path) -> Result<Vec<SignedEntry>, VaultError> {
    let file = File::open(path).map_err(|e| {
        VaultError::LedgerError(format!("Failed to open segment {}: {}", path.display(), e))
    })?;

    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            VaultError::LedgerError(format!("Failed to read line {}: {}", line_num + 1, e))
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let entry: SignedEntry = serde_json::from_str(&line).map_err(|e| {
            VaultError::LedgerError(format!(
                "Failed to parse entry at line {}: {}",
                line_num + 1,
                e
            ))
        })?;
        entries.push(entry);
    }

    debug!("Loaded {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// List all segment files in a ledger directory, in name order. The filename
/// pattern sorts by date then session then sequence, so this is also append
/// order within a session.
pub fn list_segments(directory: &Path) -> Result<Vec<PathBuf>, VaultError> {
    let mut segments = Vec::new();

    let entries = std::fs::read_dir(directory).map_err(|e| {
        VaultError::LedgerError(format!(
            "Failed to read ledger directory {}: {}",
            directory.display(),
            e
        ))
    })?;

    for entry in entries {
        let entry = entry
            .map_err(|e| VaultError::LedgerError(format!("Failed to read directory entry: {}", e)))?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("audit-") && name.ends_with(".jsonl") {
            segments.push(path);
        }
    }

    segments.sort();
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Signer, VaultKeyPair};
    use serde_json::json;
    use tempfile::tempdir;

    async fn test_signer(dir: &Path) -> Signer {
        Signer::new(VaultKeyPair::initialize(dir, "segment-test").unwrap())
    }

    #[tokio::test]
    async fn test_append_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let signer = test_signer(dir.path()).await;
        let ledger_dir = dir.path().join("ledger");

        let mut writer = SegmentWriter::open(&ledger_dir, "sess1", 1024 * 1024).unwrap();
        let mut written = Vec::new();
        for i in 0..3 {
            let entry = signer.sign(json!({"n": i}), "state-transition").await.unwrap();
            writer.append(&entry).unwrap();
            written.push(entry);
        }

        let loaded = load_segment(writer.active_path()).unwrap();
        assert_eq!(loaded.len(), 3);
        for (a, b) in written.iter().zip(loaded.iter()) {
            assert_eq!(a.signature, b.signature);
            assert!(signer.verify(b));
        }
    }

    #[tokio::test]
    async fn test_rotation_by_size() {
        let dir = tempdir().unwrap();
        let signer = test_signer(dir.path()).await;
        let ledger_dir = dir.path().join("ledger");

        // Small enough that every entry after the first forces a rotation.
        let mut writer = SegmentWriter::open(&ledger_dir, "sess1", 64).unwrap();
        for i in 0..3 {
            let entry = signer.sign(json!({"n": i}), "state-transition").await.unwrap();
            writer.append(&entry).unwrap();
        }

        assert_eq!(writer.sequence(), 3);
        let segments = list_segments(&ledger_dir).unwrap();
        assert_eq!(segments.len(), 3);
        for segment in &segments {
            assert_eq!(load_segment(segment).unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_segment_filename_pattern() {
        let dir = tempdir().unwrap();
        let ledger_dir = dir.path().join("ledger");
        let writer = SegmentWriter::open(&ledger_dir, "sess1", 1024).unwrap();

        let name = writer
            .active_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert!(name.starts_with("audit-"));
        assert!(name.contains("-sess1-"));
        assert!(name.ends_with("-0001.jsonl"));
    }
}
