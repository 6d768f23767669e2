//! Persisted permission state of the simulated user.

use crate::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Identifiers granted so far and identifiers the user has been asked about
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantState {
    #[serde(default)]
    pub granted: BTreeSet<String>,
    #[serde(default)]
    pub requested: BTreeSet<String>,
}

impl GrantState {
    /// Load with a shared lock.
    ///
    /// A missing, unreadable or corrupt file yields the default state.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Unable to open grant file {:?}: {}. Using defaults.", path, e);
                return Ok(Self::default());
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!("Unable to lock grant file {:?}: {}. Using defaults.", path, e);
            return Ok(Self::default());
        }

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            tracing::warn!("Failed to read grant file {:?}: {}. Using defaults.", path, e);
            return Ok(Self::default());
        }

        file.unlock()?;

        match serde_json::from_str::<GrantState>(&contents) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!("Failed to parse grant file {:?}: {}. Using defaults.", path, e);
                Ok(Self::default())
            }
        }
    }

    /// Write to a temp file in the same directory, sync, then rename over
    /// `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Other(format!("grant path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved grant state to {:?}", path);
        Ok(())
    }

    /// Record a prompt for `identifiers`, granting all but `deny`
    pub fn answer_prompt<'a>(
        &mut self,
        identifiers: impl IntoIterator<Item = &'a String>,
        deny: &BTreeSet<String>,
    ) {
        for id in identifiers {
            self.requested.insert(id.clone());
            if !deny.contains(id) {
                self.granted.insert(id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("grants.json");

        let mut state = GrantState::default();
        let ids = vec!["READ_STEPS".to_string(), "WRITE_STEPS".to_string()];
        let deny: BTreeSet<String> = ["WRITE_STEPS".to_string()].into_iter().collect();
        state.answer_prompt(&ids, &deny);
        state.save(&path).unwrap();

        let loaded = GrantState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.granted.contains("READ_STEPS"));
        assert!(!loaded.granted.contains("WRITE_STEPS"));
        assert!(loaded.requested.contains("WRITE_STEPS"));
    }

    #[test]
    fn test_corrupt_file_yields_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("grants.json");
        std::fs::write(&path, "{{{{").unwrap();
        assert_eq!(GrantState::load(&path).unwrap(), GrantState::default());
    }

    #[test]
    fn test_save_replaces_previous() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("grants.json");

        let mut state = GrantState::default();
        state.granted.insert("a".into());
        state.save(&path).unwrap();
        state.granted.insert("b".into());
        state.save(&path).unwrap();

        assert_eq!(GrantState::load(&path).unwrap().granted.len(), 2);
    }
}
