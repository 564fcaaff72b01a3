//! Embedded SQLite storage backend.

pub mod connection;
pub mod migrations;
pub mod storage;

pub use connection::{create_pool, create_test_pool, ConnectionError};
pub use migrations::{run_migrations, MigrationError};
pub use storage::SqliteStorage;

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::Storage;

/// Open the database at `path`, run migrations, and return it behind the
/// storage contract.
pub async fn open(path: &str) -> DomainResult<Arc<dyn Storage>> {
    let pool = create_pool(path)
        .await
        .map_err(|e| DomainError::DatabaseError(e.to_string()))?;
    run_migrations(&pool)
        .await
        .map_err(|e| DomainError::DatabaseError(e.to_string()))?;
    Ok(Arc::new(SqliteStorage::new(pool)))
}

/// In-memory storage for tests.
pub async fn open_in_memory() -> DomainResult<Arc<dyn Storage>> {
    let pool = create_test_pool()
        .await
        .map_err(|e| DomainError::DatabaseError(e.to_string()))?;
    run_migrations(&pool)
        .await
        .map_err(|e| DomainError::DatabaseError(e.to_string()))?;
    Ok(Arc::new(SqliteStorage::new(pool)))
}
