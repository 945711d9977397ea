//! Database module: SQL repositories over the queue and audit tables.
//!
//! External modules should import from `pushqueue::db` — the repository API
//! is re-exported here.

pub mod repo;

pub use repo::*;
