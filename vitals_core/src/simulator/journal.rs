//! Append-only JSON Lines journal of native records.
//!
//! Records are appended with an exclusive file lock and read back under a
//! shared lock, so two processes sharing a data directory never interleave
//! partial lines.

use crate::Result;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// JSONL file holding one native record per line
#[derive(Clone, Debug)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        Ok(())
    }

    /// Every parseable record; corrupt lines are logged and skipped
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        let reader = BufReader::new(&file);
        let mut records = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<T>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(
                        "Skipping corrupt record at {:?} line {}: {}",
                        self.path,
                        line_num + 1,
                        e
                    );
                }
            }
        }

        file.unlock()?;
        tracing::debug!("Read {} records from {:?}", records.len(), self.path);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: String,
        value: f64,
    }

    fn entry(id: &str, value: f64) -> Entry {
        Entry {
            id: id.into(),
            value,
        }
    }

    #[test]
    fn test_append_and_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(temp_dir.path().join("nested").join("records.jsonl"));

        journal.append(&entry("a", 1.0)).unwrap();
        journal.append(&entry("b", 2.5)).unwrap();

        let entries: Vec<Entry> = journal.read_all().unwrap();
        assert_eq!(entries, vec![entry("a", 1.0), entry("b", 2.5)]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(temp_dir.path().join("absent.jsonl"));
        let entries: Vec<Entry> = journal.read_all().unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_corrupt_lines_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("records.jsonl");
        std::fs::write(
            &path,
            "{\"id\":\"a\",\"value\":1.0}\n{not json\n\n{\"id\":\"b\",\"value\":2.0}\n",
        )
        .unwrap();

        let entries: Vec<Entry> = Journal::new(&path).read_all().unwrap();
        assert_eq!(entries, vec![entry("a", 1.0), entry("b", 2.0)]);
    }
}
