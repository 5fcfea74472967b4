//! Omniscan-DB: schema, migrations and queries for the history store.
//!
//! The in-memory health ledger is the source of truth while the service
//! runs; this crate keeps a durable copy of file records and scan session
//! summaries so both survive a restart.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `queries` - File record and scan session operations
//!
//! # Example
//!
//! ```no_run
//! use omniscan_db::pool::{init_pool, get_conn};
//! use omniscan_db::queries::file_records;
//!
//! let pool = init_pool("/var/lib/omniscan/omniscan.db").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let records = file_records::list_all(&conn).unwrap();
//! println!("Tracking {} files", records.len());
//! ```

pub mod migrations;
pub mod pool;
pub mod queries;
