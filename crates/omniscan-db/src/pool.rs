//! Database connection pool management.
//!
//! Connection pooling for SQLite using r2d2. Pool initialization runs the
//! pending migrations.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use omniscan_common::{Error, Result};

use crate::migrations;

/// Type alias for the database connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Initialize a new database pool with the given file path.
///
/// This function will:
/// - Create the SQLite database file if it doesn't exist
/// - Switch the database to WAL journaling
/// - Run pending database migrations
///
/// # Example
///
/// ```no_run
/// use omniscan_db::pool::init_pool;
///
/// let pool = init_pool("/var/lib/omniscan/omniscan.db").unwrap();
/// let conn = pool.get().unwrap();
/// ```
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
    });

    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {}", e)))?;

    migrate(&pool)?;

    Ok(pool)
}

/// Initialize an in-memory database pool for testing.
///
/// Every SQLite in-memory connection is its own database, so the pool is
/// capped at a single connection.
///
/// # Example
///
/// ```
/// use omniscan_db::pool::init_memory_pool;
///
/// let pool = init_memory_pool().unwrap();
/// let conn = pool.get().unwrap();
/// ```
pub fn init_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();

    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create in-memory pool: {}", e)))?;

    migrate(&pool)?;

    Ok(pool)
}

fn migrate(pool: &DbPool) -> Result<()> {
    let conn = pool
        .get()
        .map_err(|e| Error::database(format!("Failed to get connection for migrations: {}", e)))?;

    migrations::run_migrations(&conn)
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

    Ok(())
}

/// Get a connection from the pool.
///
/// Converts the r2d2 error into the common Error type.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_memory_pool() {
        let pool = init_memory_pool().unwrap();
        assert_eq!(pool.max_size(), 1);
    }

    #[test]
    fn test_migrations_run_on_init() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='file_records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_pool_reuses_connection() {
        let pool = init_memory_pool().unwrap();

        {
            let conn = get_conn(&pool).unwrap();
            conn.execute(
                "INSERT INTO file_records (path, size, status, checked_at) VALUES (?, ?, ?, ?)",
                rusqlite::params!["/m/a.mkv", 10, "healthy", "2024-01-01T00:00:00Z"],
            )
            .unwrap();
        }

        let conn = get_conn(&pool).unwrap();
        let status: String = conn
            .query_row(
                "SELECT status FROM file_records WHERE path = ?",
                ["/m/a.mkv"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "healthy");
    }

    #[test]
    fn test_file_pool_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("omniscan.db");
        let db_path = db_path.to_string_lossy().to_string();

        {
            let pool = init_pool(&db_path).unwrap();
            let conn = get_conn(&pool).unwrap();
            conn.execute(
                "INSERT INTO file_records (path, size, status, checked_at) VALUES (?, ?, ?, ?)",
                rusqlite::params!["/m/b.mkv", 1, "unknown", "2024-01-01T00:00:00Z"],
            )
            .unwrap();
        }

        let pool = init_pool(&db_path).unwrap();
        let conn = get_conn(&pool).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM file_records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
