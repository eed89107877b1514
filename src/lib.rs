//! MusicHub Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod catalogue_store;
pub mod config;
pub mod download_manager;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use catalogue_store::{CatalogueStore, SqliteCatalogueStore};
pub use download_manager::DownloadCoordinator;
pub use server::{run_server, RequestsLoggingLevel};
