use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{EntityRecord, Snapshot, sanitize_name};
use crate::error::DexError;
use crate::snapshot::read_snapshot;

pub const DEFAULT_DATABASE_PATH: &str = "data/dex.db";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS pokemon (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        types TEXT NOT NULL,
        abilities TEXT NOT NULL,
        height INTEGER NOT NULL,
        weight INTEGER NOT NULL,
        stats TEXT NOT NULL,
        flavor_text TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_pokemon_name ON pokemon (name);
    CREATE TABLE IF NOT EXISTS evolutions (
        chain_id INTEGER NOT NULL,
        stage INTEGER NOT NULL,
        pokemon_id INTEGER NOT NULL REFERENCES pokemon (id),
        PRIMARY KEY (chain_id, stage)
    );
";

const ENTITY_COLUMNS: &str = "id, name, types, abilities, height, weight, stats, flavor_text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadCounts {
    pub entities: usize,
    pub evolution_chains: usize,
}

/// Relational destination for the catalog: one entity table, one evolution table.
pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    /// Opens (creating if needed) the database file and its parent directory.
    pub fn open(path: &Utf8Path) -> Result<Self, DexError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| DexError::Filesystem(format!("create {parent}: {err}")))?;
        }
        let conn = Connection::open(path).map_err(|err| DexError::Store(err.to_string()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, DexError> {
        let conn = Connection::open_in_memory().map_err(|err| DexError::Store(err.to_string()))?;
        Ok(Self { conn })
    }

    /// Creates missing tables; never drops or alters existing ones.
    pub fn ensure_schema(&self) -> Result<(), DexError> {
        self.conn
            .execute_batch(SCHEMA)
            .map_err(|err| DexError::Store(err.to_string()))
    }

    /// Replaces the stored catalog with `snapshot` inside a single transaction.
    ///
    /// Either every row lands or the store is left exactly as it was.
    pub fn replace_catalog(&mut self, snapshot: &Snapshot) -> Result<LoadCounts, DexError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|err| DexError::Store(err.to_string()))?;
        match write_catalog(&tx, snapshot) {
            Ok(counts) => {
                tx.commit().map_err(|err| DexError::Store(err.to_string()))?;
                Ok(counts)
            }
            Err(err) => {
                warn!(error = %err, "catalog load failed; rolling back");
                tx.rollback()
                    .map_err(|rollback| DexError::Store(format!("{err}; rollback: {rollback}")))?;
                Err(err)
            }
        }
    }

    pub fn entity_count(&self) -> Result<usize, DexError> {
        self.count("SELECT COUNT(*) FROM pokemon")
    }

    pub fn evolution_row_count(&self) -> Result<usize, DexError> {
        self.count("SELECT COUNT(*) FROM evolutions")
    }

    pub fn evolution_chain_count(&self) -> Result<usize, DexError> {
        self.count("SELECT COUNT(DISTINCT chain_id) FROM evolutions")
    }

    /// Numeric input matches the id; anything else matches the sanitized name.
    pub fn find_by_name_or_id(&self, input: &str) -> Result<Option<EntityRecord>, DexError> {
        let trimmed = input.trim();
        let found = match trimmed.parse::<u32>() {
            Ok(id) => self.conn.query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM pokemon WHERE id = ?1"),
                params![id],
                entity_from_row,
            ),
            Err(_) => self.conn.query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM pokemon WHERE name = ?1 ORDER BY id LIMIT 1"),
                params![sanitize_name(trimmed)],
                entity_from_row,
            ),
        };
        found.optional().map_err(|err| DexError::Store(err.to_string()))
    }

    /// Ids of one chain, earliest stage first.
    pub fn evolution_chain(&self, chain_id: usize) -> Result<Vec<u32>, DexError> {
        let chain_id =
            i64::try_from(chain_id).map_err(|err| DexError::Store(err.to_string()))?;
        let mut stmt = self
            .conn
            .prepare("SELECT pokemon_id FROM evolutions WHERE chain_id = ?1 ORDER BY stage")
            .map_err(|err| DexError::Store(err.to_string()))?;
        let rows = stmt
            .query_map(params![chain_id], |row| row.get::<_, u32>(0))
            .map_err(|err| DexError::Store(err.to_string()))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|err| DexError::Store(err.to_string()))?);
        }
        Ok(ids)
    }

    fn count(&self, sql: &str) -> Result<usize, DexError> {
        let count: i64 = self
            .conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|err| DexError::Store(err.to_string()))?;
        usize::try_from(count).map_err(|err| DexError::Store(err.to_string()))
    }
}

fn write_catalog(tx: &Transaction<'_>, snapshot: &Snapshot) -> Result<LoadCounts, DexError> {
    tx.execute_batch(SCHEMA)
        .map_err(|err| DexError::Store(err.to_string()))?;
    tx.execute_batch("DELETE FROM evolutions; DELETE FROM pokemon;")
        .map_err(|err| DexError::Store(err.to_string()))?;

    {
        let mut insert = tx
            .prepare(&format!(
                "INSERT INTO pokemon ({ENTITY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ))
            .map_err(|err| DexError::Store(err.to_string()))?;
        for record in &snapshot.pokemon {
            insert
                .execute(params![
                    record.id,
                    record.name,
                    to_json(&record.types)?,
                    to_json(&record.abilities)?,
                    record.height,
                    record.weight,
                    to_json(&record.stats)?,
                    record.flavor_text,
                ])
                .map_err(|err| DexError::Store(format!("insert id {}: {err}", record.id)))?;
        }
    }

    {
        let mut insert = tx
            .prepare("INSERT INTO evolutions (chain_id, stage, pokemon_id) VALUES (?1, ?2, ?3)")
            .map_err(|err| DexError::Store(err.to_string()))?;
        for (chain_id, chain) in snapshot.evolutions.iter().enumerate() {
            for (stage, pokemon_id) in chain.0.iter().enumerate() {
                insert
                    .execute(params![chain_id as i64, stage as i64, pokemon_id])
                    .map_err(|err| {
                        DexError::Store(format!("insert chain {chain_id} stage {stage}: {err}"))
                    })?;
            }
        }
    }

    Ok(LoadCounts {
        entities: snapshot.pokemon.len(),
        evolution_chains: snapshot.evolutions.len(),
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, DexError> {
    serde_json::to_string(value).map_err(|err| DexError::Store(err.to_string()))
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<EntityRecord> {
    let types: String = row.get(2)?;
    let abilities: String = row.get(3)?;
    let stats: String = row.get(6)?;
    Ok(EntityRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        types: from_json_column(2, &types)?,
        abilities: from_json_column(3, &abilities)?,
        height: row.get(4)?,
        weight: row.get(5)?,
        stats: from_json_column::<BTreeMap<String, u32>>(6, &stats)?,
        flavor_text: row.get(7)?,
    })
}

fn from_json_column<T: serde::de::DeserializeOwned>(
    index: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })
}

/// Reads the snapshot and bulk-loads it into the store.
///
/// The snapshot is read and checked before the database is touched, so a missing, empty
/// or inconsistent snapshot leaves the store untouched.
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    snapshot_path: Utf8PathBuf,
    database_path: Utf8PathBuf,
}

impl CatalogLoader {
    pub fn new(snapshot_path: impl Into<Utf8PathBuf>, database_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            database_path: database_path.into(),
        }
    }

    pub fn database_path(&self) -> &Utf8Path {
        &self.database_path
    }

    pub fn load(&self) -> Result<LoadCounts, DexError> {
        let snapshot = read_snapshot(&self.snapshot_path)?;
        if snapshot.pokemon.is_empty() {
            return Err(DexError::SnapshotEmpty(self.snapshot_path.clone()));
        }
        if let Some(record) = snapshot.stat_key_mismatch() {
            return Err(DexError::SnapshotInconsistent {
                path: self.snapshot_path.clone(),
                id: record.id,
            });
        }
        info!(
            snapshot = %self.snapshot_path,
            database = %self.database_path,
            entities = snapshot.pokemon.len(),
            evolution_chains = snapshot.evolutions.len(),
            "loading catalog"
        );
        let mut store = CatalogStore::open(&self.database_path)?;
        store.replace_catalog(&snapshot)
    }
}
