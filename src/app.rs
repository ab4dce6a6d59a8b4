use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{CatalogLoader, CatalogStore};
use crate::config::PipelineConfig;
use crate::dispatch::BoundedDispatcher;
use crate::domain::{EntityRecord, FetchFailure, FetchOutcome};
use crate::error::{DexError, FailureReason};
use crate::pokeapi::CatalogClient;
use crate::snapshot::SnapshotWriter;

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FetchFailure>,
    pub snapshot_path: String,
    pub snapshot_written: bool,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub entities: usize,
    pub evolution_chains: usize,
    pub database_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    Phase,
    /// One more outcome collected during a fetch.
    Counter { processed: usize, total: usize },
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Drives the two pipeline phases against one remote catalog.
pub struct App<C: CatalogClient> {
    client: Arc<C>,
    config: PipelineConfig,
}

impl<C: CatalogClient + 'static> App<C> {
    pub fn new(client: C, config: PipelineConfig) -> Self {
        Self {
            client: Arc::new(client),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Lists the remote catalog, fetches every entry and writes the snapshot.
    ///
    /// A failing listing aborts the phase. Individual entries that fail are counted and
    /// reported. When nothing at all succeeded the previous snapshot is kept.
    pub async fn fetch(&self, sink: &dyn ProgressSink) -> Result<FetchResult, DexError> {
        let dispatcher = BoundedDispatcher::new(self.config.concurrency)?;
        let start = Instant::now();

        sink.event(ProgressEvent {
            kind: ProgressKind::Phase,
            message: "phase=Fetch; requesting catalog listing".to_string(),
            elapsed: None,
        });
        let listing = self.client.list(self.config.listing_limit).await?;
        info!(
            entries = listing.len(),
            concurrency = dispatcher.ceiling(),
            "catalog listing received"
        );
        let locators = listing.into_iter().map(|entry| entry.url).collect();

        let report = dispatcher.run(Arc::clone(&self.client), locators, sink).await;
        let succeeded = report.success_count();
        let failed = report.failure_count();
        sink.event(ProgressEvent {
            kind: ProgressKind::Phase,
            message: format!("phase=Fetch; {succeeded} succeeded, {failed} failed"),
            elapsed: Some(start.elapsed()),
        });

        let writer = SnapshotWriter::new(self.config.snapshot_path.clone());
        let snapshot_written = if succeeded == 0 && report.total > 0 {
            warn!(path = %writer.path(), "no entries fetched; keeping previous snapshot");
            false
        } else {
            sink.event(ProgressEvent {
                kind: ProgressKind::Phase,
                message: format!("phase=Store; writing {succeeded} entries to {}", writer.path()),
                elapsed: None,
            });
            writer.write(report.records, Vec::new())?;
            true
        };

        Ok(FetchResult {
            total: report.total,
            succeeded,
            failed,
            failures: report.failures,
            snapshot_path: self.config.snapshot_path.to_string(),
            snapshot_written,
            generated_at: Utc::now().to_rfc3339(),
        })
    }

    /// Bulk-loads the snapshot into the catalog database.
    pub fn load(&self, sink: &dyn ProgressSink) -> Result<LoadResult, DexError> {
        let loader = CatalogLoader::new(
            self.config.snapshot_path.clone(),
            self.config.database_path.clone(),
        );
        let start = Instant::now();
        sink.event(ProgressEvent {
            kind: ProgressKind::Phase,
            message: format!("phase=Load; reading {}", self.config.snapshot_path),
            elapsed: None,
        });
        let counts = loader.load()?;
        sink.event(ProgressEvent {
            kind: ProgressKind::Phase,
            message: format!(
                "phase=Load; {} entries and {} evolution chains committed",
                counts.entities, counts.evolution_chains
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(LoadResult {
            entities: counts.entities,
            evolution_chains: counts.evolution_chains,
            database_path: loader.database_path().to_string(),
        })
    }

    /// Fetches a single entry by name or id straight from the remote catalog.
    pub async fn lookup(&self, input: &str) -> Result<EntityRecord, DexError> {
        let locator = self.client.detail_locator(input);
        match self.client.fetch_detail(&locator).await {
            FetchOutcome::Success(record) => Ok(record),
            FetchOutcome::Failure(FetchFailure {
                reason: FailureReason::NotFound,
                ..
            }) => Err(DexError::NotFound(input.to_string())),
            FetchOutcome::Failure(failure) => Err(DexError::Lookup {
                input: input.to_string(),
                reason: failure.reason,
            }),
        }
    }

    /// Looks an entry up in the loaded catalog database.
    pub fn lookup_local(&self, input: &str) -> Result<EntityRecord, DexError> {
        let path = &self.config.database_path;
        if !path.as_std_path().exists() {
            return Err(DexError::DatabaseMissing(path.clone()));
        }
        let store = CatalogStore::open(path)?;
        store.ensure_schema()?;
        store
            .find_by_name_or_id(input)?
            .ok_or_else(|| DexError::NotFound(input.to_string()))
    }
}
