//! On-disk snapshot of the mirror store, used to hydrate it at startup.

use super::memory::MirrorStore;
use crate::connection::config::StorePolicy;
use crate::core::{MirrorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshotFile {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub values: BTreeMap<String, Value>,
}

impl MirrorStore {
    /// Write every present key to `path`. The file is replaced atomically.
    pub fn save_snapshot(&self, path: &Path) -> Result<usize> {
        let file = StoreSnapshotFile {
            version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Utc::now(),
            values: self.snapshot()?,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer(&mut writer, &file)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path)
            .map_err(|err| MirrorError::IoError(err.error.to_string()))?;

        info!(keys = file.values.len(), path = %path.display(), "store snapshot saved");
        Ok(file.values.len())
    }

    /// Create a store hydrated from `path`. A missing file hydrates an empty store.
    pub fn load_snapshot(path: &Path, policy: StorePolicy) -> Result<Self> {
        let store = MirrorStore::new(policy);
        if !path.exists() {
            store.init(Map::new())?;
            return Ok(store);
        }

        let reader = BufReader::new(fs::File::open(path)?);
        let file: StoreSnapshotFile = serde_json::from_reader(reader)?;
        if file.version != SNAPSHOT_FORMAT_VERSION {
            return Err(MirrorError::Serialization(format!(
                "unsupported store snapshot version {} (expected {})",
                file.version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        let keys = file.values.len();
        store.init(file.values.into_iter().collect())?;
        info!(keys, path = %path.display(), "store hydrated from snapshot");
        Ok(store)
    }
}
