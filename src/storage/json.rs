//! JSON snapshot file backend
//!
//! One file per source id, `{dir}/{source_id}.json`, holding an object keyed
//! by content hash. Writes go to a temporary file that is renamed into place.

use crate::site::ResourceInfo;
use crate::storage::traits::{check_entries, HistoryBackend, StoreError, StoreResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// History backend storing each snapshot as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the snapshot file for `source_id`
    pub fn snapshot_path(&self, source_id: &str) -> PathBuf {
        self.dir.join(format!("{source_id}.json"))
    }
}

impl HistoryBackend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load(&self, source_id: &str) -> StoreResult<HashMap<String, ResourceInfo>> {
        let path = self.snapshot_path(source_id);
        if !path.exists() {
            tracing::debug!("No history snapshot at {}", path.display());
            return Ok(HashMap::new());
        }

        let content = std::fs::read_to_string(&path)?;
        let entries: HashMap<String, ResourceInfo> =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                source_id: source_id.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })?;

        check_entries(source_id, &entries)?;
        Ok(entries)
    }

    fn save(&self, source_id: &str, entries: &HashMap<String, ResourceInfo>) -> StoreResult<()> {
        std::fs::create_dir_all(&self.dir)?;

        // Sorted so consecutive snapshots diff cleanly
        let ordered: BTreeMap<&String, &ResourceInfo> = entries.iter().collect();
        let content = serde_json::to_string_pretty(&ordered)?;

        let path = self.snapshot_path(source_id);
        let tmp = path.with_extension("json.tmp");
        write_then_rename(&tmp, &path, content.as_bytes())?;
        Ok(())
    }
}

fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(tmp, bytes)?;
    std::fs::rename(tmp, path)
}
