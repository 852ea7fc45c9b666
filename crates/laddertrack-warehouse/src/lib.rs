//! # Laddertrack Warehouse
//!
//! DuckDB-backed local storage used by the laddertrack client layer.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `var` | Key/value variables (provider health snapshots and similar) |
//! | `season` | Last known ladder seasons per region |
//! | `schema_migrations` | Applied migration versions |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use laddertrack_warehouse::{SeasonRecord, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!     warehouse.set_var("battlenet_health", "98.5")?;
//!
//!     let seasons = warehouse.seasons_for_region("EU")?;
//!     println!("{} known EU seasons", seasons.len());
//!     Ok(())
//! }
//! ```

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::ToSql;
use serde::Serialize;
use thiserror::Error;

pub use duckdb::{ConnectionPool, PooledConnection};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A record failed validation before it was written.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for laddertrack data.
    pub laddertrack_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let laddertrack_home = resolve_laddertrack_home();
        let db_path = laddertrack_home.join("warehouse.duckdb");
        Self {
            laddertrack_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Config rooted at an explicit directory.
    pub fn at(home: impl Into<PathBuf>) -> Self {
        let laddertrack_home = home.into();
        let db_path = laddertrack_home.join("warehouse.duckdb");
        Self {
            laddertrack_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// A ladder season as stored locally.
///
/// Dates are ISO 8601 calendar dates (`YYYY-MM-DD`) so they sort lexically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeasonRecord {
    pub region: String,
    pub battlenet_id: i32,
    pub year: i32,
    pub number: i32,
    pub start_date: String,
    pub end_date: String,
}

/// A stored variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarRecord {
    pub key: String,
    pub value: String,
}

/// Local storage for variables and seasons.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    pool: ConnectionPool,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { config, pool };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply pending schema migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    pub fn home(&self) -> &Path {
        self.config.laddertrack_home.as_path()
    }

    pub fn get_var(&self, key: &str) -> Result<Option<String>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare("SELECT value FROM var WHERE key = ?")?;
        let mut rows = statement.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn set_var(&self, key: &str, value: &str) -> Result<(), WarehouseError> {
        if key.trim().is_empty() {
            return Err(WarehouseError::InvalidRecord(String::from(
                "variable key must not be empty",
            )));
        }

        let connection = self.pool.acquire()?;
        let params: [&dyn ToSql; 2] = [&key, &value];
        connection.execute(
            "INSERT OR REPLACE INTO var (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// All variables whose key starts with `prefix`, ordered by key.
    pub fn vars_with_prefix(&self, prefix: &str) -> Result<Vec<VarRecord>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection
            .prepare("SELECT key, value FROM var WHERE starts_with(key, ?) ORDER BY key")?;
        let rows = statement.query_map([prefix], |row| {
            Ok(VarRecord {
                key: row.get(0)?,
                value: row.get(1)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Insert or replace a season keyed by region and Battle.net season id.
    pub fn upsert_season(&self, season: &SeasonRecord) -> Result<(), WarehouseError> {
        validate_season(season)?;

        let connection = self.pool.acquire()?;
        let params: [&dyn ToSql; 6] = [
            &season.region,
            &season.battlenet_id,
            &season.year,
            &season.number,
            &season.start_date,
            &season.end_date,
        ];
        connection.execute(
            "INSERT OR REPLACE INTO season \
             (region, battlenet_id, year, number, start_date, end_date, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Known seasons for a region, most recent first.
    pub fn seasons_for_region(&self, region: &str) -> Result<Vec<SeasonRecord>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(
            "SELECT region, battlenet_id, year, number, start_date, end_date FROM season \
             WHERE region = ? \
             ORDER BY end_date DESC, start_date DESC, battlenet_id DESC",
        )?;
        let rows = statement.query_map([region], |row| {
            Ok(SeasonRecord {
                region: row.get(0)?,
                battlenet_id: row.get(1)?,
                year: row.get(2)?,
                number: row.get(3)?,
                start_date: row.get(4)?,
                end_date: row.get(5)?,
            })
        })?;

        let mut seasons = Vec::new();
        for row in rows {
            seasons.push(row?);
        }
        Ok(seasons)
    }
}

fn validate_season(season: &SeasonRecord) -> Result<(), WarehouseError> {
    if season.region.trim().is_empty() {
        return Err(WarehouseError::InvalidRecord(String::from(
            "season region must not be empty",
        )));
    }
    if !is_iso_date(&season.start_date) || !is_iso_date(&season.end_date) {
        return Err(WarehouseError::InvalidRecord(format!(
            "season dates must be YYYY-MM-DD: '{}' / '{}'",
            season.start_date, season.end_date
        )));
    }
    Ok(())
}

fn is_iso_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(index, byte)| index == 4 || index == 7 || byte.is_ascii_digit())
}

/// Resolve the laddertrack home directory from environment or default.
fn resolve_laddertrack_home() -> PathBuf {
    if let Some(path) = env::var_os("LADDERTRACK_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".laddertrack");
    }

    PathBuf::from(".laddertrack")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn season(region: &str, id: i32, start: &str, end: &str) -> SeasonRecord {
        SeasonRecord {
            region: region.to_owned(),
            battlenet_id: id,
            year: 2024,
            number: id % 4 + 1,
            start_date: start.to_owned(),
            end_date: end.to_owned(),
        }
    }

    #[test]
    fn vars_round_trip_and_overwrite() {
        let temp = tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig::at(temp.path())).expect("open");

        assert_eq!(warehouse.get_var("twitch_health").expect("get"), None);

        warehouse.set_var("twitch_health", "100").expect("set");
        warehouse.set_var("twitch_health", "66.6").expect("overwrite");

        assert_eq!(
            warehouse.get_var("twitch_health").expect("get").as_deref(),
            Some("66.6")
        );
    }

    #[test]
    fn prefix_listing_only_returns_matching_keys() {
        let temp = tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig::at(temp.path())).expect("open");

        warehouse.set_var("aligulac_health", "90").expect("set");
        warehouse.set_var("aligulac_errors", "1").expect("set");
        warehouse.set_var("twitch_health", "100").expect("set");

        let keys: Vec<String> = warehouse
            .vars_with_prefix("aligulac_")
            .expect("list")
            .into_iter()
            .map(|record| record.key)
            .collect();
        assert_eq!(keys, vec!["aligulac_errors", "aligulac_health"]);
    }

    #[test]
    fn seasons_are_ordered_most_recent_first() {
        let temp = tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig::at(temp.path())).expect("open");

        warehouse
            .upsert_season(&season("EU", 58, "2024-01-02", "2024-03-25"))
            .expect("insert");
        warehouse
            .upsert_season(&season("EU", 59, "2024-03-26", "2024-06-10"))
            .expect("insert");
        warehouse
            .upsert_season(&season("US", 60, "2024-06-11", "2024-09-01"))
            .expect("insert");

        let seasons = warehouse.seasons_for_region("EU").expect("query");
        let ids: Vec<i32> = seasons.iter().map(|s| s.battlenet_id).collect();
        assert_eq!(ids, vec![59, 58]);
    }

    #[test]
    fn malformed_season_dates_are_rejected() {
        let temp = tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig::at(temp.path())).expect("open");

        let error = warehouse
            .upsert_season(&season("KR", 1, "2024/01/02", "2024-03-25"))
            .expect_err("should reject");
        assert!(matches!(error, WarehouseError::InvalidRecord(_)));
    }

    #[test]
    fn reopening_keeps_existing_data() {
        let temp = tempdir().expect("tempdir");
        {
            let warehouse = Warehouse::open(WarehouseConfig::at(temp.path())).expect("open");
            warehouse.set_var("discord_requests", "12").expect("set");
        }

        let warehouse = Warehouse::open(WarehouseConfig::at(temp.path())).expect("reopen");
        assert_eq!(
            warehouse.get_var("discord_requests").expect("get").as_deref(),
            Some("12")
        );
    }
}
