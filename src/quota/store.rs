//! RocksDB-backed append-only query ledger
//!
//! Key layout:
//! - `q:{identity_key}:{timestamp_millis:020}:{uuid}` -> bincode `QueryRecord`
//! - `daily:{user_id}` -> bincode `DailyCounter`
//!
//! The zero-padded timestamp keeps one identity's records in time order, so a
//! "since midnight" count is a single forward scan from the day's start key.

use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{Direction, IteratorMode, Options, WriteOptions, DB};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use super::types::{DailyCounter, QueryRecord};

const RECORD_PREFIX: &str = "q:";
const DAILY_PREFIX: &str = "daily:";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("rocksdb: {0}")]
    Db(#[from] rocksdb::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode: {0}")]
    Encode(String),
    #[error("decode: {0}")]
    Decode(String),
}

/// Iterate RocksDB results, logging instead of silently dropping errors
trait LogErrors<T> {
    fn log_errors(self) -> impl Iterator<Item = T>;
}

impl<I, T, E> LogErrors<T> for I
where
    I: Iterator<Item = Result<T, E>>,
    E: std::fmt::Display,
{
    fn log_errors(self) -> impl Iterator<Item = T> {
        self.filter_map(|r| match r {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Ledger iterator error (continuing): {}", e);
                None
            }
        })
    }
}

/// Write durability for ledger appends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// fsync on every append; survives power loss
    Sync,
    /// Buffered in the OS page cache; survives process crashes
    Async,
}

impl WriteMode {
    /// `GUARD_WRITE_MODE=sync` selects fsync per append
    pub fn from_env() -> Self {
        match std::env::var("GUARD_WRITE_MODE") {
            Ok(mode) if mode.eq_ignore_ascii_case("sync") => WriteMode::Sync,
            _ => WriteMode::Async,
        }
    }
}

fn record_prefix(identity_key: &str) -> String {
    format!("{RECORD_PREFIX}{identity_key}:")
}

fn record_key(record: &QueryRecord) -> String {
    format!(
        "{}{:020}:{}",
        record_prefix(&record.identity_key),
        record.timestamp.timestamp_millis().max(0),
        record.id
    )
}

fn daily_key(user_id: &str) -> String {
    format!("{DAILY_PREFIX}{user_id}")
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| LedgerError::Encode(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, LedgerError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(v, _)| v)
        .map_err(|e| LedgerError::Decode(e.to_string()))
}

/// Persistent store for query records
pub struct LedgerStore {
    db: DB,
    write_mode: WriteMode,
    total_records: AtomicU64,
}

impl LedgerStore {
    pub fn open(path: &Path, write_mode: WriteMode) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_manual_wal_flush(false);

        let db = DB::open(&opts, path.join("ledger"))?;

        let total = db
            .iterator(IteratorMode::From(
                RECORD_PREFIX.as_bytes(),
                Direction::Forward,
            ))
            .log_errors()
            .take_while(|(key, _)| key.starts_with(RECORD_PREFIX.as_bytes()))
            .count() as u64;

        tracing::info!(
            records = total,
            "Query ledger opened with {:?} write mode",
            write_mode
        );

        Ok(Self {
            db,
            write_mode,
            total_records: AtomicU64::new(total),
        })
    }

    fn write_opts(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.write_mode == WriteMode::Sync);
        write_opts
    }

    /// Append one record. Keys embed a fresh UUID, so nothing is overwritten.
    pub fn append(&self, record: &QueryRecord) -> Result<(), LedgerError> {
        let value = encode(record)?;
        self.db
            .put_opt(record_key(record), value, &self.write_opts())?;
        self.total_records.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Count an identity's records with `timestamp >= since` (all records when `None`)
    pub fn count_since(
        &self,
        identity_key: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<u32, LedgerError> {
        let prefix = record_prefix(identity_key);
        let start = match since {
            Some(ts) => format!("{prefix}{:020}", ts.timestamp_millis().max(0)),
            None => prefix.clone(),
        };

        let count = self
            .db
            .iterator(IteratorMode::From(start.as_bytes(), Direction::Forward))
            .log_errors()
            .take_while(|(key, _)| key.starts_with(prefix.as_bytes()))
            .count();

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// All records of one identity, oldest first
    pub fn records(&self, identity_key: &str) -> Result<Vec<QueryRecord>, LedgerError> {
        let prefix = record_prefix(identity_key);
        self.db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
            .log_errors()
            .take_while(|(key, _)| key.starts_with(prefix.as_bytes()))
            .map(|(_, value)| decode(&value))
            .collect()
    }

    pub fn daily_counter(&self, user_id: &str) -> Result<Option<DailyCounter>, LedgerError> {
        match self.db.get(daily_key(user_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Advance and persist the display counter for `today`
    pub fn bump_daily_counter(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<DailyCounter, LedgerError> {
        let next = DailyCounter::bump(self.daily_counter(user_id)?, today);
        self.db
            .put_opt(daily_key(user_id), encode(&next)?, &self.write_opts())?;
        Ok(next)
    }

    pub fn total_records(&self) -> u64 {
        self.total_records.load(Ordering::Relaxed)
    }

    /// Flush memtables to disk, blocking until complete
    pub fn flush(&self) -> Result<(), LedgerError> {
        use rocksdb::FlushOptions;

        let mut flush_opts = FlushOptions::default();
        flush_opts.set_wait(true);
        self.db.flush_opt(&flush_opts)?;
        Ok(())
    }
}
