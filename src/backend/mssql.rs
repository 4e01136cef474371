//! SQL Server backend via Tiberius, pooled with bb8.

use std::sync::Arc;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_tiberius::{ConnectionManager, rt};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use tiberius::numeric::Numeric;
use tiberius::{AuthMethod, Config as TiberiusConfig, EncryptionLevel};

use crate::backend::{ConnectionBackend, DatabaseBackend, PoolOptions, TransactionBackend};
use crate::error::MatdbError;
use crate::query::{ParamStyle, Query};
use crate::record::{Record, column_index};
use crate::url::DatabaseUrl;
use crate::value::SqlValue;

/// Type alias for the pooled SQL Server client.
pub type MssqlClient = rt::Client;

pub struct MssqlBackend {
    url: DatabaseUrl,
    options: Option<PoolOptions>,
    pool: Option<Pool<ConnectionManager>>,
}

impl MssqlBackend {
    #[must_use]
    pub fn new(url: DatabaseUrl, options: Option<PoolOptions>) -> Self {
        Self {
            url,
            options,
            pool: None,
        }
    }

    fn tiberius_config(&self, options: &PoolOptions) -> TiberiusConfig {
        let mut config = TiberiusConfig::new();
        config.host(self.url.hostname().unwrap_or("localhost"));
        config.port(self.url.port().unwrap_or(1433));
        if let Some(database) = self.url.database() {
            config.database(database);
        }
        config.authentication(AuthMethod::sql_server(
            self.url.username().unwrap_or_default(),
            self.url.password().unwrap_or_default(),
        ));
        match options.ssl {
            Some(true) => config.encryption(EncryptionLevel::Required),
            Some(false) => config.encryption(EncryptionLevel::NotSupported),
            None => {}
        }
        config.trust_cert();
        config
    }
}

#[async_trait]
impl DatabaseBackend for MssqlBackend {
    async fn connect(&mut self) -> Result<(), MatdbError> {
        let options = match &self.options {
            Some(options) => options.clone(),
            None => PoolOptions::from_url(&self.url)?,
        };
        let config = self.tiberius_config(&options);

        let manager = ConnectionManager::build(config).map_err(|e| {
            MatdbError::ConnectionError(format!("failed to configure SQL Server manager: {e}"))
        })?;

        let pool = Pool::builder()
            .max_size(options.max_size as u32)
            .min_idle(Some(options.min_size as u32))
            .build(manager)
            .await
            .map_err(|e| {
                MatdbError::ConnectionError(format!("failed to create SQL Server pool: {e}"))
            })?;

        self.pool = Some(pool);
        tracing::info!(url = %self.url, "SQL Server connection pool initialized");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MatdbError> {
        // bb8 closes idle connections when the last pool handle drops.
        if self.pool.take().is_some() {
            tracing::info!(url = %self.url, "SQL Server connection pool closed");
        }
        Ok(())
    }

    async fn acquire(&self) -> Result<Box<dyn ConnectionBackend>, MatdbError> {
        let pool = self.pool.as_ref().ok_or_else(MatdbError::not_connected)?;
        let conn = pool.get_owned().await?;
        Ok(Box::new(MssqlConnection { conn }))
    }
}

pub struct MssqlConnection {
    conn: PooledConnection<'static, ConnectionManager>,
}

#[async_trait]
impl ConnectionBackend for MssqlConnection {
    async fn fetch_all(&mut self, query: &Query) -> Result<Vec<Record>, MatdbError> {
        let (sql, values) = query.compile(ParamStyle::Mssql)?;
        build_records(&mut self.conn, sql, &values).await
    }

    async fn fetch_one(&mut self, query: &Query) -> Result<Option<Record>, MatdbError> {
        // Drain the full stream so the connection is clean for the next
        // statement; partial stream drops leave trailing packets.
        let records = self.fetch_all(query).await?;
        Ok(records.into_iter().next())
    }

    async fn execute(&mut self, query: &Query) -> Result<u64, MatdbError> {
        let (sql, values) = query.compile(ParamStyle::Mssql)?;
        let exec_result = bind_query_params(sql, &values)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| {
                MatdbError::ExecutionError(format!("SQL Server execution error: {e}"))
            })?;
        Ok(exec_result.rows_affected().iter().sum())
    }

    async fn execute_many(&mut self, queries: &[Query]) -> Result<(), MatdbError> {
        for query in queries {
            self.execute(query).await?;
        }
        Ok(())
    }

    async fn iterate<'a>(
        &'a mut self,
        query: &Query,
    ) -> Result<BoxStream<'a, Result<Record, MatdbError>>, MatdbError> {
        let (sql, values) = query.compile(ParamStyle::Mssql)?;
        let mut stream = bind_query_params(sql, &values)
            .query(&mut *self.conn)
            .await
            .map_err(|e| MatdbError::ExecutionError(format!("SQL Server query error: {e}")))?;

        let columns = stream
            .columns()
            .await
            .map_err(|e| {
                MatdbError::ExecutionError(format!("SQL Server column fetch error: {e}"))
            })?
            .ok_or_else(|| {
                MatdbError::ExecutionError("no columns returned from query".to_string())
            })?;
        let names = Arc::new(
            columns
                .iter()
                .map(|col| col.name().to_string())
                .collect::<Vec<_>>(),
        );
        let cache = column_index(&names);

        Ok(stream
            .into_row_stream()
            .map_err(MatdbError::from)
            .and_then(move |row| {
                let names = names.clone();
                let cache = cache.clone();
                async move {
                    let values = row_values(&row)?;
                    Ok(Record::from_parts(names, cache, values))
                }
            })
            .boxed())
    }
}

#[async_trait]
impl TransactionBackend for MssqlConnection {
    async fn begin(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError> {
        let statement = if is_root {
            "BEGIN TRANSACTION".to_string()
        } else {
            format!("SAVE TRANSACTION {savepoint}")
        };
        run_statement(&mut self.conn, &statement).await
    }

    async fn commit(&mut self, is_root: bool, _savepoint: &str) -> Result<(), MatdbError> {
        // T-SQL has no RELEASE SAVEPOINT; committing a savepoint is a
        // no-op and the work lands with the enclosing transaction.
        if is_root {
            run_statement(&mut self.conn, "COMMIT TRANSACTION").await?;
        }
        Ok(())
    }

    async fn rollback(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError> {
        let statement = if is_root {
            "ROLLBACK TRANSACTION".to_string()
        } else {
            format!("ROLLBACK TRANSACTION {savepoint}")
        };
        run_statement(&mut self.conn, &statement).await
    }
}

async fn run_statement(client: &mut MssqlClient, statement: &str) -> Result<(), MatdbError> {
    tiberius::Query::new(statement.to_string())
        .execute(client)
        .await
        .map_err(|e| MatdbError::ExecutionError(format!("SQL Server {statement} error: {e}")))?;
    Ok(())
}

/// Bind parameters directly to a Tiberius query builder; the builder
/// owns the data.
fn bind_query_params(sql: String, values: &[SqlValue]) -> tiberius::Query<'static> {
    let mut query_builder = tiberius::Query::new(sql);
    for value in values {
        match value {
            SqlValue::Int(i) => query_builder.bind(*i),
            SqlValue::Float(f) => query_builder.bind(*f),
            SqlValue::Text(s) => query_builder.bind(s.clone()),
            SqlValue::Bool(b) => query_builder.bind(*b),
            SqlValue::Timestamp(dt) => query_builder.bind(*dt),
            SqlValue::Null => query_builder.bind(Option::<String>::None),
            SqlValue::Json(jsval) => query_builder.bind(jsval.to_string()),
            SqlValue::Blob(bytes) => query_builder.bind(bytes.clone()),
        }
    }
    query_builder
}

async fn build_records(
    client: &mut MssqlClient,
    sql: String,
    values: &[SqlValue],
) -> Result<Vec<Record>, MatdbError> {
    let mut stream = bind_query_params(sql, values)
        .query(client)
        .await
        .map_err(|e| MatdbError::ExecutionError(format!("SQL Server query error: {e}")))?;

    let columns = stream
        .columns()
        .await
        .map_err(|e| MatdbError::ExecutionError(format!("SQL Server column fetch error: {e}")))?
        .ok_or_else(|| {
            MatdbError::ExecutionError("no columns returned from query".to_string())
        })?;
    let names = Arc::new(
        columns
            .iter()
            .map(|col| col.name().to_string())
            .collect::<Vec<_>>(),
    );
    let cache = column_index(&names);

    let mut records = Vec::new();
    let mut rows = stream.into_row_stream();
    while let Some(row) = rows.try_next().await.map_err(|e| {
        MatdbError::ExecutionError(format!("SQL Server row fetch error: {e}"))
    })? {
        records.push(Record::from_parts(
            names.clone(),
            cache.clone(),
            row_values(&row)?,
        ));
    }
    Ok(records)
}

fn row_values(row: &tiberius::Row) -> Result<Vec<SqlValue>, MatdbError> {
    (0..row.len())
        .map(|idx| Ok(extract_value(row, idx)?.unwrap_or(SqlValue::Null)))
        .collect()
}

/// Extract a value from a row at a specific index. The Tiberius row API
/// varies by column type, so likely conversions are tried in order.
fn extract_value(row: &tiberius::Row, idx: usize) -> Result<Option<SqlValue>, MatdbError> {
    if let Ok(Some(val)) = row.try_get::<i32, _>(idx) {
        return Ok(Some(SqlValue::Int(i64::from(val))));
    }
    if let Ok(Some(val)) = row.try_get::<i64, _>(idx) {
        return Ok(Some(SqlValue::Int(val)));
    }

    if let Ok(Some(val)) = row.try_get::<f32, _>(idx) {
        return Ok(Some(SqlValue::Float(f64::from(val))));
    }
    if let Ok(Some(val)) = row.try_get::<f64, _>(idx) {
        return Ok(Some(SqlValue::Float(val)));
    }
    if let Ok(Some(val)) = row.try_get::<Numeric, _>(idx) {
        return Ok(Some(SqlValue::Float(numeric_to_f64(&val))));
    }

    if let Ok(Some(val)) = row.try_get::<bool, _>(idx) {
        return Ok(Some(SqlValue::Bool(val)));
    }

    if let Ok(Some(val)) = row.try_get::<NaiveDateTime, _>(idx) {
        return Ok(Some(SqlValue::Timestamp(val)));
    }
    if let Ok(Some(val)) = row.try_get::<NaiveDate, _>(idx) {
        return Ok(Some(date_to_value(val)));
    }
    if let Ok(Some(val)) = row.try_get::<NaiveTime, _>(idx) {
        return Ok(Some(time_to_value(val)));
    }

    if let Ok(Some(val)) = row.try_get::<&str, _>(idx) {
        return Ok(Some(SqlValue::Text(val.to_string())));
    }

    if let Ok(Some(val)) = row.try_get::<&[u8], _>(idx) {
        return Ok(Some(SqlValue::Blob(val.to_vec())));
    }

    Ok(None)
}

fn numeric_to_f64(numeric: &Numeric) -> f64 {
    (numeric.value() as f64) / 10f64.powi(i32::from(numeric.scale()))
}

fn date_to_value(date: NaiveDate) -> SqlValue {
    SqlValue::Timestamp(date.and_time(NaiveTime::MIN))
}

fn time_to_value(time: NaiveTime) -> SqlValue {
    SqlValue::Text(time.format("%H:%M:%S%.6f").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_columns_surface_as_floats() {
        assert_eq!(numeric_to_f64(&Numeric::new_with_scale(150, 2)), 1.5);
        assert_eq!(numeric_to_f64(&Numeric::new_with_scale(-25, 1)), -2.5);
        assert_eq!(numeric_to_f64(&Numeric::new_with_scale(42, 0)), 42.0);
    }

    #[test]
    fn date_columns_surface_as_midnight_timestamps() {
        let date = NaiveDate::from_ymd_opt(2023, 4, 1).unwrap();
        let expected = date.and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(date_to_value(date), SqlValue::Timestamp(expected));
    }

    #[test]
    fn time_columns_surface_as_text() {
        let time = NaiveTime::from_hms_micro_opt(12, 30, 5, 250).unwrap();
        assert_eq!(
            time_to_value(time),
            SqlValue::Text("12:30:05.000250".to_string())
        );
    }
}
