//! matdb: uniform async data access over MySQL and SQL Server.
//!
//! The crate is a thin shim: statement compilation is a named-parameter
//! rewrite, pooling and wire protocols belong to the wrapped drivers
//! (`mysql_async`, `tiberius`/`bb8`). The surface is the same for both
//! engines: [`Database::connect`], [`Database::fetch_all`],
//! [`Database::execute`], [`Connection::iterate`], and
//! [`Connection::transaction`] with nested savepoints.
//!
//! ```rust,no_run
//! use matdb::{Database, Query};
//!
//! # async fn demo() -> Result<(), matdb::MatdbError> {
//! let mut database = Database::new("mssql://sqltest:pw@localhost:1433/aryan_db")?;
//! database.connect().await?;
//!
//! let mut conn = database.acquire().await?;
//! let mut tx = conn.transaction().await?;
//! let query = Query::new("INSERT INTO emp(emp_id, emp_name) VALUES (:emp_id, :emp_name)")
//!     .bind("emp_id", 9331)
//!     .bind("emp_name", "Vijay");
//! // The guard dereferences to the connection.
//! tx.execute(&query).await?;
//! tx.commit().await?;
//! # Ok(()) }
//! ```

pub mod backend;
pub mod core;
pub mod error;
pub mod prelude;
pub mod query;
pub mod record;
pub mod url;
pub mod value;

pub use crate::backend::{ConnectionBackend, DatabaseBackend, PoolOptions, TransactionBackend};
pub use crate::core::{Connection, Database, Transaction};
pub use crate::error::MatdbError;
pub use crate::query::{ParamStyle, Query};
pub use crate::record::Record;
pub use crate::url::DatabaseUrl;
pub use crate::value::SqlValue;
