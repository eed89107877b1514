//! CatalogueStore trait definition.

use anyhow::Result;

use super::models::{CatalogueItem, DownloadStatus, NewCatalogueItem};

/// Trait for catalogue storage backends.
///
/// Writes that would duplicate an `original_url` or a `file_path` fail with
/// a [`super::UniqueViolation`] wrapped in the returned error.
pub trait CatalogueStore: Send + Sync {
    // =========================================================================
    // Basic CRUD
    // =========================================================================

    /// Insert a new item and return it with its assigned id.
    fn create_item(&self, item: &NewCatalogueItem) -> Result<CatalogueItem>;

    /// Get an item by id.
    fn get_item(&self, id: i64) -> Result<Option<CatalogueItem>>;

    /// Get the item fetched from the given source URL, if any.
    fn find_by_external_source(&self, url: &str) -> Result<Option<CatalogueItem>>;

    /// Overwrite every mutable field of an existing item. An ERROR item
    /// must carry a non-empty message; messages are truncated like
    /// [`CatalogueStore::mark_failed`] does.
    fn update_item(&self, item: &CatalogueItem) -> Result<()>;

    /// Delete an item. Returns false if it did not exist.
    fn delete_item(&self, id: i64) -> Result<bool>;

    /// All items, ordered by artist then title.
    fn list_items(&self) -> Result<Vec<CatalogueItem>>;

    /// Items whose status is one of `statuses`, oldest first.
    fn list_by_status(&self, statuses: &[DownloadStatus]) -> Result<Vec<CatalogueItem>>;

    // =========================================================================
    // State Transitions (atomic)
    // =========================================================================

    /// Overwrite the descriptive fields of `item` and reset it to PENDING,
    /// clearing any error, unless it is currently DOWNLOADING or COMPLETE.
    /// Returns true if the row was updated.
    fn readmit(&self, item: &CatalogueItem) -> Result<bool>;

    /// Atomically move an item to DOWNLOADING unless it is already
    /// DOWNLOADING or COMPLETE. Returns true if this call claimed it.
    fn claim_for_download(&self, id: i64) -> Result<bool>;

    /// Mark an item COMPLETE with its materialized file path.
    fn mark_complete(&self, id: i64, file_path: &str) -> Result<()>;

    /// Mark an item ERROR with a diagnostic message.
    fn mark_failed(&self, id: i64, error_message: &str) -> Result<()>;

    /// Mark an item ERROR unless it is currently DOWNLOADING or COMPLETE.
    /// Returns true if the row was updated.
    fn mark_failed_unless_busy(&self, id: i64, error_message: &str) -> Result<bool>;

    /// Move every PENDING or DOWNLOADING item to ERROR. Returns the count.
    fn fail_unfinished(&self, error_message: &str) -> Result<usize>;
}
