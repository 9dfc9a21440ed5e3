//! Database layer for fedlink.
//!
//! Provides the SQLite connection pool (via `r2d2`), WAL-mode initialization
//! and the embedded, versioned schema migrations. The peer registry, the
//! credential store and the audit log all live in the same database file.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, open_and_migrate, DbInitError, DbPool, DbRuntimeSettings, PoolError};
