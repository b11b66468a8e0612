// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Two-phase import and the maintenance operations around it.
//!
//! Phase 1 builds the correlation lookup from the span stream and tails
//! the span stream into the prompt sink. Phase 2 tails the metric stream
//! into the metrics sink, enriched from the same lookup. The store is pinged
//! once before any cursor is read.

mod report;

pub use report::{RunReport, StatusReport, StreamStatus};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, info_span, Instrument};

use crate::config::{CorrelationMode, ResolvedConfig};
use crate::correlate::{CorrelationLookup, ScanPosition, SpanCorrelator};
use crate::cursor::{rewind_start, rotation_reason, FileFingerprint, StreamId};
use crate::error::{IngestError, StoreError};
use crate::extract::{MetricsExtractor, PromptExtractor};
use crate::ingest::{IncrementalIngestor, IngestOptions};
use crate::store::{SinkKind, SqliteStore, Store};
use crate::telemetry::RunId;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Settings the pipeline runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub traces_file: PathBuf,
    pub metrics_file: PathBuf,
    pub correlation_mode: CorrelationMode,
    pub ingest: IngestOptions,
}

impl From<&ResolvedConfig> for PipelineOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            traces_file: config.traces_file.clone(),
            metrics_file: config.metrics_file.clone(),
            correlation_mode: config.correlation_mode,
            ingest: IngestOptions {
                rewind_bytes: config.rewind_bytes,
                checkpoint_interval: config.checkpoint_interval,
                dry_run: config.dry_run,
            },
        }
    }
}

/// Runs imports, status and reset against one store.
pub struct CorrelationPipeline {
    store: Arc<dyn Store>,
    options: PipelineOptions,
}

impl CorrelationPipeline {
    pub fn new(store: Arc<dyn Store>, options: PipelineOptions) -> Self {
        Self { store, options }
    }

    /// Open the SQLite store named by `config`.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self, StoreError> {
        let store = SqliteStore::open(
            &config.database_path,
            Duration::from_millis(config.store_timeout_ms),
        )?;
        Ok(Self::new(Arc::new(store), PipelineOptions::from(config)))
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run both phases once.
    pub async fn run(&self) -> Result<RunReport, IngestError> {
        let run_id = RunId::new();
        let span = info_span!("run", run_id = %run_id.short());
        self.run_phases(run_id).instrument(span).await
    }

    async fn run_phases(&self, run_id: RunId) -> Result<RunReport, IngestError> {
        let started = Instant::now();
        let dry_run = self.options.ingest.dry_run;

        self.store.ping().await?;
        info!(
            store = self.store.name(),
            mode = %self.options.correlation_mode,
            dry_run,
            "starting import"
        );

        let imported_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        let ingestor = IncrementalIngestor::new(self.store.as_ref(), self.options.ingest);

        // Phase 1: spans.
        let lookup = self.build_lookup().await?;
        let traces = ingestor
            .ingest(
                StreamId::Traces,
                &self.options.traces_file,
                &PromptExtractor::new(&lookup, imported_at.clone()),
            )
            .await?;

        // Phase 2: metrics, enriched from the phase 1 lookup.
        let metrics = ingestor
            .ingest(
                StreamId::Metrics,
                &self.options.metrics_file,
                &MetricsExtractor::new(&lookup, imported_at),
            )
            .await?;

        let prompt_documents = self.store.count_documents(SinkKind::PromptRecords).await?;
        let metrics_documents = self.store.count_documents(SinkKind::MetricsRecords).await?;

        let report = RunReport {
            run_id,
            dry_run,
            correlation_mode: self.options.correlation_mode,
            traces,
            metrics,
            calls: lookup.call_count(),
            prompts: lookup.prompt_count(),
            prompt_documents,
            metrics_documents,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            new = report.new_records(),
            duplicates = report.duplicates(),
            prompt_documents,
            metrics_documents,
            elapsed_ms = report.elapsed_ms,
            "import complete"
        );

        #[cfg(feature = "telemetry")]
        {
            GLOBAL_METRICS.record_operation("pipeline.run", started.elapsed());
            debug!("\n{}", GLOBAL_METRICS.snapshot().format_report());
        }

        Ok(report)
    }

    async fn build_lookup(&self) -> Result<CorrelationLookup, IngestError> {
        let correlator = SpanCorrelator::new(&self.options.traces_file);

        match self.options.correlation_mode {
            CorrelationMode::FullScan => correlator.build_full().await,
            CorrelationMode::Incremental => {
                let mut lookup = self.store.load_lookup().await?;
                let loaded = (lookup.call_count(), lookup.prompt_count());

                let path = &self.options.traces_file;
                let fingerprint = FileFingerprint::of(path)
                    .await
                    .map_err(|e| IngestError::io(path.display().to_string(), e))?;

                if let Some(fingerprint) = fingerprint {
                    // Resume from the lookup's own position, never the tail cursor.
                    let resume = match lookup.position() {
                        Some(saved)
                            if saved.generation == fingerprint.generation
                                && saved.offset <= fingerprint.size =>
                        {
                            saved.offset
                        }
                        Some(saved) => {
                            info!(
                                saved_generation = saved.generation,
                                saved_offset = saved.offset,
                                "span stream replaced; rescanning for correlation"
                            );
                            0
                        }
                        None => 0,
                    };
                    let start_offset = rewind_start(resume, self.options.ingest.rewind_bytes);
                    let stats = correlator.scan_into(&mut lookup, start_offset).await?;
                    lookup.set_position(ScanPosition {
                        generation: fingerprint.generation,
                        offset: stats.end_offset.max(resume),
                    });
                    debug!(
                        start_offset,
                        end_offset = stats.end_offset,
                        lines = stats.lines,
                        "scanned span region for correlation"
                    );
                }

                let delta = lookup.take_changes();
                if !self.options.ingest.dry_run && !delta.is_empty() {
                    self.store.save_lookup(&delta).await?;
                }
                info!(
                    loaded_calls = loaded.0,
                    loaded_prompts = loaded.1,
                    changed = delta.len(),
                    calls = lookup.call_count(),
                    prompts = lookup.prompt_count(),
                    "updated persisted correlation lookup"
                );
                Ok(lookup)
            }
        }
    }

    /// Cursor of each stream against its current file, plus sink counts.
    pub async fn status(&self) -> Result<StatusReport, IngestError> {
        self.store.ping().await?;

        let mut streams = Vec::with_capacity(StreamId::ALL.len());
        for stream in StreamId::ALL {
            let path = self.path_of(stream);
            let cursor = self.store.load_cursor(stream).await?;
            let fingerprint = FileFingerprint::of(&path)
                .await
                .map_err(|e| IngestError::io(path.display().to_string(), e))?;

            let (unprocessed_bytes, rotation) = match (&cursor, &fingerprint) {
                (_, None) => (0, None),
                (None, Some(fp)) => (fp.size, None),
                (Some(cursor), Some(fp)) => {
                    match rotation_reason(cursor, fp.generation, fp.size) {
                        Some(reason) => (fp.size, Some(reason)),
                        None => (fp.size.saturating_sub(cursor.byte_offset), None),
                    }
                }
            };

            streams.push(StreamStatus {
                stream,
                path,
                cursor,
                fingerprint,
                unprocessed_bytes,
                rotation,
            });
        }

        Ok(StatusReport {
            store: self.store.name().to_string(),
            streams,
            prompt_documents: self.store.count_documents(SinkKind::PromptRecords).await?,
            metrics_documents: self.store.count_documents(SinkKind::MetricsRecords).await?,
        })
    }

    /// Delete every cursor so the next run starts from offset zero. Sinks are untouched.
    pub async fn reset(&self) -> Result<usize, IngestError> {
        self.store.ping().await?;
        let removed = self.store.reset_cursors().await?;
        info!(removed, "cursors reset");
        Ok(removed)
    }

    fn path_of(&self, stream: StreamId) -> PathBuf {
        match stream {
            StreamId::Traces => self.options.traces_file.clone(),
            StreamId::Metrics => self.options.metrics_file.clone(),
        }
    }
}
