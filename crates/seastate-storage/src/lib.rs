//! DuckDB-backed persistence layer for seastate tick summaries.

use duckdb::{Connection, Transaction, params};
use seastate_core::{BoundsBatch, BoundsPersistence};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const DEFAULT_TICK_BUFFER: usize = 32;
const DEFAULT_METRIC_BUFFER: usize = 256;

/// Storage error wrapper.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

/// Summary row written to the `ticks` table.
#[derive(Debug, Clone)]
struct TickRow {
    tick: i64,
    input_count: i64,
    inputs_reported: i64,
    max_horizontal: f64,
    max_vertical: f64,
    max_extra: f64,
}

/// Metric row written to the `metrics` table.
#[derive(Debug, Clone)]
struct MetricRow {
    tick: i64,
    name: String,
    value: f64,
}

#[derive(Default)]
struct StorageBuffer {
    ticks: Vec<TickRow>,
    metrics: Vec<MetricRow>,
}

impl StorageBuffer {
    fn is_empty(&self) -> bool {
        self.ticks.is_empty() && self.metrics.is_empty()
    }

    fn clear(&mut self) {
        self.ticks.clear();
        self.metrics.clear();
    }
}

/// Latest metric reading fetched for analytics displays.
#[derive(Debug, Clone)]
pub struct MetricReading {
    pub tick: i64,
    pub name: String,
    pub value: f64,
}

/// Tick reading ranked by vertical displacement.
#[derive(Debug, Clone)]
pub struct SwellPeak {
    pub tick: i64,
    pub max_vertical: f64,
    pub max_horizontal: f64,
}

/// DuckDB-backed persistence sink with buffered writes.
pub struct Storage {
    conn: Connection,
    buffer: StorageBuffer,
    tick_flush_threshold: usize,
    metric_flush_threshold: usize,
}

impl Storage {
    /// Open or create a DuckDB database at the provided path with default
    /// buffering thresholds.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::with_thresholds(path, DEFAULT_TICK_BUFFER, DEFAULT_METRIC_BUFFER)
    }

    /// Override flush thresholds for ticks and metrics respectively.
    pub fn with_thresholds(
        path: &str,
        tick: usize,
        metric: usize,
    ) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let mut storage = Self {
            conn,
            buffer: StorageBuffer::default(),
            tick_flush_threshold: tick,
            metric_flush_threshold: metric,
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn initialize_schema(&mut self) -> Result<(), StorageError> {
        self.conn.execute(
            "create table if not exists ticks (
                tick bigint primary key,
                input_count integer,
                inputs_reported integer,
                max_horizontal double,
                max_vertical double,
                max_extra double
            )",
            [],
        )?;
        self.conn.execute(
            "create table if not exists metrics (
                tick bigint,
                name text,
                value double,
                primary key (tick, name)
            )",
            [],
        )?;
        Ok(())
    }

    /// Buffer one tick batch, flushing when a threshold is crossed.
    pub fn persist(&mut self, batch: &BoundsBatch) -> Result<(), StorageError> {
        let summary = &batch.summary;
        let tick = summary.tick.0 as i64;
        self.buffer.ticks.push(TickRow {
            tick,
            input_count: summary.input_count as i64,
            inputs_reported: summary.inputs_reported as i64,
            max_horizontal: f64::from(summary.bounds.horizontal),
            max_vertical: f64::from(summary.bounds.vertical),
            max_extra: f64::from(summary.bounds.extra),
        });
        for metric in &batch.metrics {
            self.buffer.metrics.push(MetricRow {
                tick,
                name: metric.name.to_string(),
                value: metric.value,
            });
        }
        if self.buffer.ticks.len() >= self.tick_flush_threshold
            || self.buffer.metrics.len() >= self.metric_flush_threshold
        {
            self.flush()?;
        }
        Ok(())
    }

    /// Write every buffered row inside one transaction.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        Self::insert_ticks(&tx, &self.buffer.ticks)?;
        Self::insert_metrics(&tx, &self.buffer.metrics)?;
        tx.commit()?;
        self.buffer.clear();
        Ok(())
    }

    fn insert_ticks(tx: &Transaction<'_>, rows: &[TickRow]) -> Result<(), duckdb::Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut stmt = tx.prepare(
            "insert or replace into ticks (
                tick, input_count, inputs_reported,
                max_horizontal, max_vertical, max_extra
            ) values (?, ?, ?, ?, ?, ?)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.tick,
                row.input_count,
                row.inputs_reported,
                row.max_horizontal,
                row.max_vertical,
                row.max_extra,
            ])?;
        }
        Ok(())
    }

    fn insert_metrics(tx: &Transaction<'_>, rows: &[MetricRow]) -> Result<(), duckdb::Error> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut stmt =
            tx.prepare("insert or replace into metrics (tick, name, value) values (?, ?, ?)")?;
        for row in rows {
            stmt.execute(params![row.tick, row.name, row.value])?;
        }
        Ok(())
    }

    /// Metric readings for the most recently persisted tick.
    pub fn latest_metrics(&self, limit: usize) -> Result<Vec<MetricReading>, StorageError> {
        let tick: Option<i64> =
            self.conn
                .query_row("select max(tick) from metrics", [], |row| row.get(0))?;
        let Some(tick) = tick else {
            return Ok(Vec::new());
        };
        let mut stmt = self
            .conn
            .prepare("select name, value from metrics where tick = ? order by name limit ?")?;
        let mut rows = stmt.query(params![tick, limit as i64])?;
        let mut readings = Vec::new();
        while let Some(row) = rows.next()? {
            readings.push(MetricReading {
                tick,
                name: row.get(0)?,
                value: row.get(1)?,
            });
        }
        Ok(readings)
    }

    /// Persisted ticks ranked by vertical displacement, largest first.
    pub fn peak_swells(&self, limit: usize) -> Result<Vec<SwellPeak>, StorageError> {
        let mut stmt = self.conn.prepare(
            "select tick, max_vertical, max_horizontal from ticks
             order by max_vertical desc, tick desc
             limit ?",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut peaks = Vec::new();
        while let Some(row) = rows.next()? {
            peaks.push(SwellPeak {
                tick: row.get(0)?,
                max_vertical: row.get(1)?,
                max_horizontal: row.get(2)?,
            });
        }
        Ok(peaks)
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            eprintln!("failed to flush persistence buffer on drop: {err}");
        }
    }
}

impl BoundsPersistence for Storage {
    fn on_tick(&mut self, payload: &BoundsBatch) {
        if let Err(err) = self.persist(payload) {
            eprintln!(
                "failed to enqueue persistence data for tick {}: {err}",
                payload.summary.tick.0
            );
        }
    }
}

/// Adapter sharing one [`Storage`] between the simulation and analytics reads.
pub struct SharedStorage {
    inner: Arc<Mutex<Storage>>,
}

impl SharedStorage {
    /// Wrap an existing shared storage handle.
    #[must_use]
    pub fn new(inner: Arc<Mutex<Storage>>) -> Self {
        Self { inner }
    }
}

impl BoundsPersistence for SharedStorage {
    fn on_tick(&mut self, payload: &BoundsBatch) {
        match self.inner.lock() {
            Ok(mut storage) => storage.on_tick(payload),
            Err(_) => eprintln!(
                "storage mutex poisoned; dropping batch for tick {}",
                payload.summary.tick.0
            ),
        }
    }
}
