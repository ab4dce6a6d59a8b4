use std::fs;
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tracing::info;

use crate::domain::{EntityRecord, EvolutionChain, Snapshot};
use crate::error::DexError;

pub const DEFAULT_SNAPSHOT_PATH: &str = "data/dex.json";

/// Writes the whole snapshot in one go; a previous file is replaced, never patched.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: Utf8PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Sorts by id and persists. Returns the number of entity records written.
    pub fn write(
        &self,
        mut records: Vec<EntityRecord>,
        evolutions: Vec<EvolutionChain>,
    ) -> Result<usize, DexError> {
        records.sort_by_key(|record| record.id);
        let snapshot = Snapshot {
            pokemon: records,
            evolutions,
        };

        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| DexError::SnapshotWrite(format!("create {parent}: {err}")))?;

        // Dropping the temp file on any early return removes it.
        let mut temp = tempfile::Builder::new()
            .prefix(".dex-snapshot")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| DexError::SnapshotWrite(err.to_string()))?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &snapshot)
                .map_err(|err| DexError::SnapshotWrite(err.to_string()))?;
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(|err| DexError::SnapshotWrite(err.to_string()))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|err| DexError::SnapshotWrite(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| DexError::SnapshotWrite(err.to_string()))?;

        info!(path = %self.path, records = snapshot.pokemon.len(), "snapshot written");
        Ok(snapshot.pokemon.len())
    }
}

/// Reads either a bare array of records or a `{pokemon, evolutions}` object.
pub fn read_snapshot(path: &Utf8Path) -> Result<Snapshot, DexError> {
    if !path.as_std_path().exists() {
        return Err(DexError::SnapshotMissing(path.to_path_buf()));
    }
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| DexError::SnapshotRead(format!("{path}: {err}")))?;
    parse_snapshot(&content)
}

pub fn parse_snapshot(content: &str) -> Result<Snapshot, DexError> {
    let raw: Value =
        serde_json::from_str(content).map_err(|err| DexError::SnapshotParse(err.to_string()))?;
    match raw {
        Value::Array(_) => {
            let pokemon: Vec<EntityRecord> = serde_json::from_value(raw)
                .map_err(|err| DexError::SnapshotParse(err.to_string()))?;
            Ok(Snapshot {
                pokemon,
                evolutions: Vec::new(),
            })
        }
        Value::Object(_) => {
            serde_json::from_value(raw).map_err(|err| DexError::SnapshotParse(err.to_string()))
        }
        _ => Err(DexError::SnapshotParse(
            "expected an array of records or an object with `pokemon`".to_string(),
        )),
    }
}
