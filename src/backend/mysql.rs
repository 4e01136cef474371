//! MySQL backend over `mysql_async`.
//!
//! The driver ships its own connection pool; sizing comes from the URL
//! options. Checked-out connections go back to the pool on drop.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Timelike};
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, SslOpts, Value};

use crate::backend::{ConnectionBackend, DatabaseBackend, PoolOptions, TransactionBackend};
use crate::error::MatdbError;
use crate::query::{ParamStyle, Query};
use crate::record::{Record, column_index};
use crate::url::DatabaseUrl;
use crate::value::SqlValue;

pub struct MySqlBackend {
    url: DatabaseUrl,
    options: Option<PoolOptions>,
    pool: Option<Pool>,
}

impl MySqlBackend {
    #[must_use]
    pub fn new(url: DatabaseUrl, options: Option<PoolOptions>) -> Self {
        Self {
            url,
            options,
            pool: None,
        }
    }
}

#[async_trait]
impl DatabaseBackend for MySqlBackend {
    async fn connect(&mut self) -> Result<(), MatdbError> {
        let options = match &self.options {
            Some(options) => options.clone(),
            None => PoolOptions::from_url(&self.url)?,
        };
        let constraints =
            PoolConstraints::new(options.min_size, options.max_size).ok_or_else(|| {
                MatdbError::ConfigError(format!(
                    "invalid pool constraints: min {} max {}",
                    options.min_size, options.max_size
                ))
            })?;

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(self.url.hostname().unwrap_or("localhost").to_string())
            .tcp_port(self.url.port().unwrap_or(3306))
            .user(self.url.username())
            .pass(self.url.password())
            .db_name(self.url.database())
            .init(vec!["SET autocommit=1".to_string()])
            .pool_opts(PoolOpts::default().with_constraints(constraints));
        if options.ssl == Some(true) {
            builder = builder.ssl_opts(SslOpts::default());
        }

        self.pool = Some(Pool::new(builder));
        tracing::info!(url = %self.url, "MySQL connection pool initialized");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MatdbError> {
        if let Some(pool) = self.pool.take() {
            pool.disconnect().await?;
            tracing::info!(url = %self.url, "MySQL connection pool closed");
        }
        Ok(())
    }

    async fn acquire(&self) -> Result<Box<dyn ConnectionBackend>, MatdbError> {
        let pool = self.pool.as_ref().ok_or_else(MatdbError::not_connected)?;
        let conn = pool.get_conn().await?;
        Ok(Box::new(MySqlConnection { conn }))
    }
}

pub struct MySqlConnection {
    conn: Conn,
}

#[async_trait]
impl ConnectionBackend for MySqlConnection {
    async fn fetch_all(&mut self, query: &Query) -> Result<Vec<Record>, MatdbError> {
        let (sql, values) = query.compile(ParamStyle::MySql)?;
        let rows: Vec<mysql_async::Row> = self.conn.exec(sql.as_str(), to_params(&values)).await?;

        let mut records = Vec::with_capacity(rows.len());
        if let Some(first) = rows.first() {
            let columns = Arc::new(column_names(first));
            let cache = column_index(&columns);
            for row in &rows {
                records.push(Record::from_parts(
                    columns.clone(),
                    cache.clone(),
                    row_values(row),
                ));
            }
        }
        Ok(records)
    }

    async fn fetch_one(&mut self, query: &Query) -> Result<Option<Record>, MatdbError> {
        let (sql, values) = query.compile(ParamStyle::MySql)?;
        let row: Option<mysql_async::Row> =
            self.conn.exec_first(sql.as_str(), to_params(&values)).await?;
        Ok(row.map(|row| record_from_row(&row)))
    }

    async fn execute(&mut self, query: &Query) -> Result<u64, MatdbError> {
        let (sql, values) = query.compile(ParamStyle::MySql)?;
        self.conn.exec_drop(sql.as_str(), to_params(&values)).await?;
        // Match the driver-facade convention: report the generated key
        // when one exists, the affected-row count otherwise.
        match self.conn.last_insert_id() {
            Some(id) if id != 0 => Ok(id),
            _ => Ok(self.conn.affected_rows()),
        }
    }

    async fn execute_many(&mut self, queries: &[Query]) -> Result<(), MatdbError> {
        for query in queries {
            let (sql, values) = query.compile(ParamStyle::MySql)?;
            self.conn.exec_drop(sql.as_str(), to_params(&values)).await?;
        }
        Ok(())
    }

    async fn iterate<'a>(
        &'a mut self,
        query: &Query,
    ) -> Result<BoxStream<'a, Result<Record, MatdbError>>, MatdbError> {
        let (sql, values) = query.compile(ParamStyle::MySql)?;
        let result = self.conn.exec_iter(sql, to_params(&values)).await?;
        let stream = result
            .stream_and_drop::<mysql_async::Row>()
            .await?
            .ok_or_else(|| {
                MatdbError::ExecutionError("statement produced no result set".to_string())
            })?;

        Ok(stream
            .map_err(MatdbError::from)
            .map_ok(|row| record_from_row(&row))
            .boxed())
    }
}

#[async_trait]
impl TransactionBackend for MySqlConnection {
    async fn begin(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError> {
        if is_root {
            self.conn.query_drop("BEGIN").await?;
        } else {
            self.conn.query_drop(format!("SAVEPOINT {savepoint}")).await?;
        }
        Ok(())
    }

    async fn commit(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError> {
        if is_root {
            self.conn.query_drop("COMMIT").await?;
        } else {
            self.conn
                .query_drop(format!("RELEASE SAVEPOINT {savepoint}"))
                .await?;
        }
        Ok(())
    }

    async fn rollback(&mut self, is_root: bool, savepoint: &str) -> Result<(), MatdbError> {
        if is_root {
            self.conn.query_drop("ROLLBACK").await?;
        } else {
            self.conn
                .query_drop(format!("ROLLBACK TO SAVEPOINT {savepoint}"))
                .await?;
        }
        Ok(())
    }
}

fn column_names(row: &mysql_async::Row) -> Vec<String> {
    row.columns_ref()
        .iter()
        .map(|col| col.name_str().into_owned())
        .collect()
}

fn row_values(row: &mysql_async::Row) -> Vec<SqlValue> {
    (0..row.len())
        .map(|i| row.as_ref(i).map_or(SqlValue::Null, from_mysql_value))
        .collect()
}

fn record_from_row(row: &mysql_async::Row) -> Record {
    Record::new(Arc::new(column_names(row)), row_values(row))
}

fn to_params(values: &[SqlValue]) -> Params {
    if values.is_empty() {
        Params::Empty
    } else {
        Params::Positional(values.iter().map(to_mysql_value).collect())
    }
}

fn to_mysql_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Int(i) => Value::Int(*i),
        SqlValue::Float(f) => Value::Double(*f),
        SqlValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        // The wire format caps years at u16; anything outside binds as
        // NULL rather than wrapping into a bogus date.
        SqlValue::Timestamp(dt) => u16::try_from(dt.year()).map_or(Value::NULL, |year| {
            Value::Date(
                year,
                dt.month() as u8,
                dt.day() as u8,
                dt.hour() as u8,
                dt.minute() as u8,
                dt.second() as u8,
                dt.nanosecond() / 1_000,
            )
        }),
        SqlValue::Null => Value::NULL,
        SqlValue::Json(v) => Value::Bytes(v.to_string().into_bytes()),
        SqlValue::Blob(bytes) => Value::Bytes(bytes.clone()),
    }
}

fn from_mysql_value(value: &Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text.to_string()),
            Err(_) => SqlValue::Blob(bytes.clone()),
        },
        Value::Int(i) => SqlValue::Int(*i),
        Value::UInt(u) => SqlValue::Int(*u as i64),
        Value::Float(f) => SqlValue::Float(f64::from(*f)),
        Value::Double(d) => SqlValue::Float(*d),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(*hour),
                        u32::from(*minute),
                        u32::from(*second),
                        *micros,
                    )
                })
                .map_or(SqlValue::Null, SqlValue::Timestamp)
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            SqlValue::Text(format!(
                "{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}
