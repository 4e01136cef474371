//! Backend interfaces and the pool options shared by both engines.
//!
//! Each engine module wraps an existing driver and pool; the traits
//! here are the seam the [`Database`](crate::core::Database) facade
//! dispatches through.

pub mod mssql;
pub mod mysql;

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::MatdbError;
use crate::query::Query;
use crate::record::Record;
use crate::url::DatabaseUrl;

/// Root-transaction and savepoint control for one backend connection.
///
/// The facade decides whether a transaction is a root or a savepoint
/// (see [`crate::core::Transaction`]); the backend only renders the
/// engine's statements for it.
#[async_trait]
pub trait TransactionBackend: Send {
    async fn begin(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError>;
    async fn commit(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError>;
    async fn rollback(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError>;
}

/// One checked-out pooled connection. Dropping the value returns the
/// underlying connection to its pool.
#[async_trait]
pub trait ConnectionBackend: TransactionBackend + Send {
    async fn fetch_all(&mut self, query: &Query) -> Result<Vec<Record>, MatdbError>;

    async fn fetch_one(&mut self, query: &Query) -> Result<Option<Record>, MatdbError>;

    /// Execute a DML/DDL statement. MySQL reports `LAST_INSERT_ID()`
    /// when one was generated, otherwise the affected-row count;
    /// SQL Server always reports the affected-row count.
    async fn execute(&mut self, query: &Query) -> Result<u64, MatdbError>;

    async fn execute_many(&mut self, queries: &[Query]) -> Result<(), MatdbError>;

    /// Stream rows without buffering the whole result set. The stream
    /// borrows the connection; drain or drop it before issuing the next
    /// statement.
    async fn iterate<'a>(
        &'a mut self,
        query: &Query,
    ) -> Result<BoxStream<'a, Result<Record, MatdbError>>, MatdbError>;
}

/// A database engine: owns the pool and hands out connections.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Build the connection pool.
    async fn connect(&mut self) -> Result<(), MatdbError>;

    /// Tear the pool down.
    async fn disconnect(&mut self) -> Result<(), MatdbError>;

    /// Check a connection out of the pool.
    async fn acquire(&self) -> Result<Box<dyn ConnectionBackend>, MatdbError>;
}

/// Pool sizing and TLS options, parsed from the URL query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub min_size: usize,
    pub max_size: usize,
    pub ssl: Option<bool>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_size: 5,
            max_size: 10,
            ssl: None,
        }
    }
}

impl PoolOptions {
    /// Parse pool options from the URL query string. Unknown keys are
    /// ignored; `pre_create_num` is accepted (and validated) for
    /// compatibility but has no effect, since neither pool pre-creates
    /// connections beyond its minimum.
    ///
    /// # Errors
    ///
    /// Returns [`MatdbError::ConfigError`] for non-numeric sizes or an
    /// unrecognized `ssl` literal.
    pub fn from_url(url: &DatabaseUrl) -> Result<Self, MatdbError> {
        let options = url.options();
        let mut pool_options = PoolOptions::default();

        if let Some(min_size) = parse_size(&options, "min_size")? {
            pool_options.min_size = min_size;
        }
        if let Some(max_size) = parse_size(&options, "max_size")? {
            pool_options.max_size = max_size;
        }
        parse_size(&options, "pre_create_num")?;

        if let Some(ssl) = options.get("ssl") {
            pool_options.ssl = Some(match ssl.to_lowercase().as_str() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(MatdbError::ConfigError(format!(
                        "invalid ssl option: {other}"
                    )));
                }
            });
        }

        if pool_options.min_size > pool_options.max_size {
            return Err(MatdbError::ConfigError(format!(
                "min_size {} exceeds max_size {}",
                pool_options.min_size, pool_options.max_size
            )));
        }

        Ok(pool_options)
    }
}

fn parse_size(
    options: &HashMap<String, String>,
    key: &str,
) -> Result<Option<usize>, MatdbError> {
    options
        .get(key)
        .map(|raw| {
            raw.parse::<usize>()
                .map_err(|_| MatdbError::ConfigError(format!("invalid {key} option: {raw}")))
        })
        .transpose()
}
