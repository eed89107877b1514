//! Persistent song catalogue.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use schema::CATALOGUE_VERSIONED_SCHEMAS;
pub use store::{SqliteCatalogueStore, UniqueViolation};
pub use trait_def::CatalogueStore;
