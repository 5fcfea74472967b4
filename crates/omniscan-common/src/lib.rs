//! Omniscan-Common: shared types, identifiers and utilities.
//!
//! This crate provides the vocabulary used across omniscan:
//!
//! - **Typed IDs**: UUID wrappers for scan jobs and scan sessions
//! - **Core Types**: health classifications, file records, session summaries
//! - **Path Utilities**: media extension checks and subtree relationships
//! - **Error Handling**: the error taxonomy shared by every layer
//!
//! # Examples
//!
//! ```
//! use omniscan_common::{HealthStatus, JobId, Error, Result};
//! use omniscan_common::paths::subtrees_overlap;
//! use std::path::Path;
//!
//! let id = JobId::new();
//! assert!(HealthStatus::CorruptZeroByte.is_corrupt());
//! assert!(subtrees_overlap(Path::new("/media/tv"), Path::new("/media/tv/Show")));
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("job"))
//! }
//! # let _ = (id, example());
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
