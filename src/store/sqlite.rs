// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-backed store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "telemetry")]
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::correlate::{CallInfo, CorrelationLookup, LookupDelta, PromptData, ScanPosition};
use crate::cursor::{StreamCursor, StreamId};
use crate::error::StoreError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::{InsertOutcome, SinkKind, Store};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

fn sink_table(sink: SinkKind) -> &'static str {
    match sink {
        SinkKind::PromptRecords => "prompt_records",
        SinkKind::MetricsRecords => "metrics_records",
    }
}

/// Synchronous SQLite database holding cursors, sinks and lookup tables.
pub struct SqliteDatabase {
    conn: Connection,
    path: PathBuf,
}

impl SqliteDatabase {
    /// Open or create a database at a specific path.
    ///
    /// `busy_timeout` bounds how long a statement waits on a locked database.
    pub fn open_at(db_path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| {
            StoreError::Unavailable(format!(
                "Failed to open database {}: {}",
                db_path.display(),
                e
            ))
        })?;

        Self::with_connection(conn, db_path.to_path_buf(), busy_timeout)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, PathBuf::from(":memory:"), Duration::from_secs(5))
    }

    fn with_connection(
        conn: Connection,
        path: PathBuf,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        conn.busy_timeout(busy_timeout)?;
        // WAL keeps readers (status) from blocking a running import.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut db = Self { conn, path };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&mut self) -> Result<(), StoreError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS stream_cursors (
                stream TEXT PRIMARY KEY,
                file_path TEXT,
                byte_offset INTEGER NOT NULL DEFAULT 0,
                line_number INTEGER NOT NULL DEFAULT 0,
                file_generation INTEGER,
                file_modified_at TEXT,
                records_inserted INTEGER NOT NULL DEFAULT 0,
                last_total_lines INTEGER,
                last_processed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS prompt_records (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                inserted_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metrics_records (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                inserted_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS call_lookup (
                call_id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS prompt_lookup (
                trace_id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS lookup_position (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                file_generation INTEGER NOT NULL,
                byte_offset INTEGER NOT NULL
            );
            "#,
        )?;

        let current_version: Option<u32> = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        if current_version.is_none() {
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?)",
                params![SCHEMA_VERSION],
            )?;
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("store.sqlite.init_schema", start.elapsed());

        Ok(())
    }

    /// Cheap round trip to check the database answers.
    pub fn ping(&self) -> Result<(), StoreError> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    // ========================================================================
    // CURSORS
    // ========================================================================

    pub fn load_cursor(&self, stream: StreamId) -> Result<Option<StreamCursor>, StoreError> {
        self.conn
            .query_row(
                r#"
                SELECT stream, file_path, byte_offset, line_number, file_generation,
                       file_modified_at, records_inserted, last_total_lines, last_processed_at
                FROM stream_cursors WHERE stream = ?
                "#,
                params![stream.as_str()],
                row_to_cursor,
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn save_cursor(&self, cursor: &StreamCursor) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO stream_cursors (
                stream, file_path, byte_offset, line_number, file_generation,
                file_modified_at, records_inserted, last_total_lines, last_processed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                cursor.stream.as_str(),
                cursor.file_path,
                cursor.byte_offset as i64,
                cursor.line_number as i64,
                cursor.file_generation.map(|g| g as i64),
                cursor.file_modified_at.map(|t| t.to_rfc3339()),
                cursor.records_inserted as i64,
                cursor.last_total_lines.map(|n| n as i64),
                cursor.last_processed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn delete_cursors(&self) -> Result<usize, StoreError> {
        Ok(self.conn.execute("DELETE FROM stream_cursors", [])?)
    }

    // ========================================================================
    // SINKS
    // ========================================================================

    pub fn insert_if_absent(
        &self,
        sink: SinkKind,
        id: &str,
        document: &Value,
    ) -> Result<InsertOutcome, StoreError> {
        let body = serde_json::to_string(document)?;
        let sql = format!(
            "INSERT OR IGNORE INTO {} (id, document, inserted_at) VALUES (?, ?, ?)",
            sink_table(sink)
        );

        let changed = self
            .conn
            .execute(&sql, params![id, body, Utc::now().timestamp()])
            .map_err(|e| match StoreError::from(e) {
                StoreError::Query(message) => StoreError::write_failed(id, message),
                other => other,
            })?;

        Ok(if changed == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }

    pub fn get_document(&self, sink: SinkKind, id: &str) -> Result<Option<Value>, StoreError> {
        let sql = format!("SELECT document FROM {} WHERE id = ?", sink_table(sink));
        let body: Option<String> = self
            .conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?;

        body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
            .transpose()
    }

    pub fn count_documents(&self, sink: SinkKind) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", sink_table(sink));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ========================================================================
    // CORRELATION TABLES
    // ========================================================================

    pub fn load_lookup(&self) -> Result<CorrelationLookup, StoreError> {
        let calls: HashMap<String, CallInfo> = self.load_table("SELECT call_id, data FROM call_lookup")?;
        let prompts: HashMap<String, PromptData> =
            self.load_table("SELECT trace_id, data FROM prompt_lookup")?;
        let position = self
            .conn
            .query_row(
                "SELECT file_generation, byte_offset FROM lookup_position WHERE id = 1",
                [],
                |row| {
                    Ok(ScanPosition {
                        generation: row.get::<_, i64>(0)? as u64,
                        offset: row.get::<_, i64>(1)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(CorrelationLookup::from_parts(calls, prompts).with_position(position))
    }

    fn load_table<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
    ) -> Result<HashMap<String, T>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut table = HashMap::new();
        for row in rows {
            let (key, data) = row?;
            table.insert(key, serde_json::from_str(&data)?);
        }
        Ok(table)
    }

    /// Upsert changed entries in one transaction.
    pub fn save_lookup(&mut self, delta: &LookupDelta) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut calls = tx.prepare(
                "INSERT OR REPLACE INTO call_lookup (call_id, data) VALUES (?, ?)",
            )?;
            for (call_id, info) in &delta.calls {
                calls.execute(params![call_id, serde_json::to_string(info)?])?;
            }

            let mut prompts = tx.prepare(
                "INSERT OR REPLACE INTO prompt_lookup (trace_id, data) VALUES (?, ?)",
            )?;
            for (trace_id, data) in &delta.prompts {
                prompts.execute(params![trace_id, serde_json::to_string(data)?])?;
            }

            if let Some(position) = delta.position {
                tx.execute(
                    "INSERT OR REPLACE INTO lookup_position (id, file_generation, byte_offset) VALUES (1, ?, ?)",
                    params![position.generation as i64, position.offset as i64],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn row_to_cursor(row: &Row<'_>) -> rusqlite::Result<StreamCursor> {
    let stream: String = row.get(0)?;
    let stream = StreamId::parse(&stream).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown stream id: {}", stream).into(),
        )
    })?;

    Ok(StreamCursor {
        stream,
        file_path: row.get(1)?,
        byte_offset: row.get::<_, i64>(2)? as u64,
        line_number: row.get::<_, i64>(3)? as u64,
        file_generation: row.get::<_, Option<i64>>(4)?.map(|g| g as u64),
        file_modified_at: parse_time(row.get(5)?),
        records_inserted: row.get::<_, i64>(6)? as u64,
        last_total_lines: row.get::<_, Option<i64>>(7)?.map(|n| n as u64),
        last_processed_at: parse_time(row.get(8)?),
    })
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// ASYNC FACADE
// ============================================================================

/// [`Store`] implementation over a shared [`SqliteDatabase`].
pub struct SqliteStore {
    db: Arc<Mutex<SqliteDatabase>>,
    timeout: Duration,
}

impl SqliteStore {
    /// Open the database at `path`; `timeout` bounds every store operation.
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let db = SqliteDatabase::open_at(path, timeout)?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("store.sqlite.open", start.elapsed());

        Ok(Self::with_database(db, timeout))
    }

    /// Wrap an already opened database (useful for testing).
    pub fn with_database(db: SqliteDatabase, timeout: Duration) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            timeout,
        }
    }

    async fn lock(&self) -> Result<MutexGuard<'_, SqliteDatabase>, StoreError> {
        tokio::time::timeout(self.timeout, self.db.lock())
            .await
            .map_err(|_| StoreError::Timeout(self.timeout.as_millis() as u64))
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().await?.ping()
    }

    async fn load_cursor(&self, stream: StreamId) -> Result<Option<StreamCursor>, StoreError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let result = self.lock().await?.load_cursor(stream);

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("store.load_cursor", start.elapsed());

        result
    }

    async fn save_cursor(&self, cursor: &StreamCursor) -> Result<(), StoreError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let result = self.lock().await?.save_cursor(cursor);

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("store.save_cursor", start.elapsed());

        result
    }

    async fn reset_cursors(&self) -> Result<usize, StoreError> {
        self.lock().await?.delete_cursors()
    }

    async fn insert_if_absent(
        &self,
        sink: SinkKind,
        id: &str,
        document: &Value,
    ) -> Result<InsertOutcome, StoreError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let result = self.lock().await?.insert_if_absent(sink, id, document);

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("store.insert", start.elapsed());

        result
    }

    async fn get_document(&self, sink: SinkKind, id: &str) -> Result<Option<Value>, StoreError> {
        self.lock().await?.get_document(sink, id)
    }

    async fn count_documents(&self, sink: SinkKind) -> Result<u64, StoreError> {
        self.lock().await?.count_documents(sink)
    }

    async fn load_lookup(&self) -> Result<CorrelationLookup, StoreError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let result = self.lock().await?.load_lookup();

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("store.load_lookup", start.elapsed());

        result
    }

    async fn save_lookup(&self, delta: &LookupDelta) -> Result<(), StoreError> {
        if delta.is_empty() {
            return Ok(());
        }

        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let result = self.lock().await?.save_lookup(delta);

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("store.save_lookup", start.elapsed());

        result
    }
}
