use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatdbError {
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    MysqlError(#[from] mysql_async::Error),

    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[error(transparent)]
    PoolErrorMssql(#[from] bb8::RunError<bb8_tiberius::Error>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl MatdbError {
    /// Error for operations attempted before `connect` has been called.
    pub(crate) fn not_connected() -> Self {
        MatdbError::ConnectionError("database is not connected".to_string())
    }
}
