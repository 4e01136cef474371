//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types to make it
//! easier to get started with the library.

pub use crate::backend::{
    ConnectionBackend, DatabaseBackend, PoolOptions, TransactionBackend,
};
pub use crate::core::{Connection, Database, Transaction};
pub use crate::error::MatdbError;
pub use crate::query::{ParamStyle, Query};
pub use crate::record::Record;
pub use crate::url::DatabaseUrl;
pub use crate::value::SqlValue;
