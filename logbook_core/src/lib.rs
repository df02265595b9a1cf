#![forbid(unsafe_code)]

//! Core domain model and persistence for the Rowlog club logbook.
//!
//! This crate provides:
//! - Domain types (boats, groups, members, outings, admins, statistics)
//! - The `Database` persistence contract
//! - Backends: in-memory and file-based (snapshot + outing journal)
//! - Configuration store with main-config fallback
//! - Member display names, CSV export

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod names;
pub mod database;
pub mod statistics;
pub mod memory;
pub mod journal;
pub mod store;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::{Config, ConfigStore};
pub use database::{sort_members_by, Database};
pub use memory::MemoryDatabase;
pub use store::FileDatabase;
pub use journal::{OutingJournal, OutingSink};
pub use export::export_outings_csv;
pub use names::{display_name, DEFAULT_NAME_FORMAT};
