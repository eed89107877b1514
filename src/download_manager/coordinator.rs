//! Download job orchestration.
//!
//! Admission (lookup, metadata, PENDING record) runs concurrently and
//! without locking. Execution (claim, fetch, materialize, record outcome)
//! runs behind the execution gate, one job at a time.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalogue_store::{
    CatalogueItem, CatalogueStore, DownloadStatus, NewCatalogueItem, UniqueViolation,
};
use crate::config::DownloadSettings;

use super::error::DownloadError;
use super::extractor::{ContentFetcher, FetchRequest, MetadataResolver};
use super::materializer::FileMaterializer;
use super::metadata::TrackMetadata;
use super::single_flight::ExecutionGate;

const ABORTED_JOB_MESSAGE: &str = "download job aborted unexpectedly";

/// Result of admitting a URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The item is already downloading or complete; nothing was scheduled.
    Existing(CatalogueItem),
    /// The item is PENDING and a job should execute it.
    Queued(CatalogueItem),
}

impl Admission {
    pub fn item(&self) -> &CatalogueItem {
        match self {
            Admission::Existing(item) | Admission::Queued(item) => item,
        }
    }

    pub fn into_item(self) -> CatalogueItem {
        match self {
            Admission::Existing(item) | Admission::Queued(item) => item,
        }
    }
}

/// Terminal outcome of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(CatalogueItem),
    Failed(DownloadError),
    /// Another execution already handled (or is handling) the item.
    Skipped,
}

/// An admitted download and, when one was scheduled, its background job.
pub struct DownloadTicket {
    pub admission: Admission,
    pub job: Option<JoinHandle<()>>,
}

pub struct DownloadCoordinator {
    store: Arc<dyn CatalogueStore>,
    resolver: Arc<dyn MetadataResolver>,
    fetcher: Arc<dyn ContentFetcher>,
    materializer: FileMaterializer,
    gate: Arc<dyn ExecutionGate>,
    audio_format: String,
    audio_quality: String,
}

impl DownloadCoordinator {
    pub fn new(
        store: Arc<dyn CatalogueStore>,
        resolver: Arc<dyn MetadataResolver>,
        fetcher: Arc<dyn ContentFetcher>,
        materializer: FileMaterializer,
        gate: Arc<dyn ExecutionGate>,
        settings: &DownloadSettings,
    ) -> Self {
        Self {
            store,
            resolver,
            fetcher,
            materializer,
            gate,
            audio_format: settings.preferred_codec.ytdlp_format().to_string(),
            audio_quality: settings.preferred_quality.clone(),
        }
    }

    /// Admits and executes a download, returning the item's final state.
    pub async fn request_download(&self, url: &str) -> Result<CatalogueItem, DownloadError> {
        let item = match self.admit(url).await? {
            Admission::Existing(item) => return Ok(item),
            Admission::Queued(item) => item,
        };
        match self.execute(item.id).await {
            JobOutcome::Completed(item) => Ok(item),
            JobOutcome::Failed(DownloadError::ItemVanished(id)) => {
                Err(DownloadError::ItemVanished(id))
            }
            JobOutcome::Failed(_) | JobOutcome::Skipped => self
                .store
                .get_item(item.id)?
                .ok_or(DownloadError::ItemVanished(item.id)),
        }
    }

    /// Admits a download and runs its execution on a background task.
    pub async fn spawn_download(
        self: &Arc<Self>,
        url: &str,
    ) -> Result<DownloadTicket, DownloadError> {
        let admission = self.admit(url).await?;
        let job = match &admission {
            Admission::Queued(item) => Some(self.spawn_job(item.id)),
            Admission::Existing(_) => None,
        };
        Ok(DownloadTicket { admission, job })
    }

    /// Items that are PENDING or DOWNLOADING.
    pub fn list_active(&self) -> Result<Vec<CatalogueItem>, DownloadError> {
        Ok(self.store.list_by_status(DownloadStatus::active())?)
    }

    /// Lock-free admission: look up the URL, resolve metadata and leave the
    /// item PENDING. A busy or complete item is returned untouched.
    pub async fn admit(&self, url: &str) -> Result<Admission, DownloadError> {
        if url.trim().is_empty() {
            return Err(DownloadError::InvalidUrl);
        }

        let existing = self.store.find_by_external_source(url)?;
        if let Some(item) = &existing {
            if item.status.is_busy_or_done() {
                info!(
                    "Item {} for {} is already {}, not queueing",
                    item.id, url, item.status
                );
                return Ok(Admission::Existing(item.clone()));
            }
        }

        let metadata = match self.resolver.resolve(url).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Metadata resolution failed for {}: {}", url, e);
                if let Some(item) = &existing {
                    // The row may have been readmitted and claimed meanwhile
                    match self.store.mark_failed_unless_busy(item.id, &e.to_string()) {
                        Ok(true) => {}
                        Ok(false) => debug!(
                            "Item {} moved on during metadata resolution, keeping its state",
                            item.id
                        ),
                        Err(store_err) => error!(
                            "Failed to mark item {} as failed: {:#}",
                            item.id, store_err
                        ),
                    }
                }
                return Err(e);
            }
        };

        match existing {
            Some(item) => self.readmit(item, metadata),
            None => self.create_pending(url, metadata),
        }
    }

    fn create_pending(
        &self,
        url: &str,
        metadata: TrackMetadata,
    ) -> Result<Admission, DownloadError> {
        let new_item = NewCatalogueItem {
            title: metadata.title.clone(),
            artist: metadata.artist.clone(),
            album: metadata.album.clone(),
            duration_seconds: metadata.duration_seconds,
            thumbnail_url: metadata.thumbnail_url.clone(),
            ..NewCatalogueItem::pending(url)
        };

        match self.store.create_item(&new_item) {
            Ok(item) => {
                info!("Queued item {} for {}", item.id, url);
                Ok(Admission::Queued(item))
            }
            Err(e) if e.downcast_ref::<UniqueViolation>().is_some() => {
                // A concurrent admission inserted the same URL first
                debug!("Concurrent admission for {}, reusing its record", url);
                match self.store.find_by_external_source(url)? {
                    Some(item) if item.status.is_busy_or_done() => Ok(Admission::Existing(item)),
                    Some(item) => self.readmit(item, metadata),
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn readmit(
        &self,
        item: CatalogueItem,
        metadata: TrackMetadata,
    ) -> Result<Admission, DownloadError> {
        let id = item.id;
        let refreshed = CatalogueItem {
            title: metadata.title,
            artist: metadata.artist,
            album: metadata.album,
            duration_seconds: metadata.duration_seconds,
            thumbnail_url: metadata.thumbnail_url,
            ..item
        };
        let reset = self.store.readmit(&refreshed)?;
        let current = self
            .store
            .get_item(id)?
            .ok_or(DownloadError::ItemVanished(id))?;
        if reset {
            info!("Re-queued item {}", id);
            Ok(Admission::Queued(current))
        } else {
            Ok(Admission::Existing(current))
        }
    }

    /// Runs the locked phase for an admitted item.
    pub async fn execute(&self, item_id: i64) -> JobOutcome {
        let _permit = self.gate.acquire().await;
        debug!("Execution lock acquired for item {}", item_id);

        let outcome = match self.run_locked(item_id).await {
            Ok(Some(item)) => {
                info!(
                    "Item {} downloaded to {}",
                    item.id,
                    item.file_path.as_deref().unwrap_or_default()
                );
                JobOutcome::Completed(item)
            }
            Ok(None) => JobOutcome::Skipped,
            Err(e) => {
                error!("Download of item {} failed: {}", item_id, e);
                if !matches!(e, DownloadError::ItemVanished(_)) {
                    self.record_failure(item_id, &e.to_string());
                }
                JobOutcome::Failed(e)
            }
        };

        debug!("Execution lock released for item {}", item_id);
        outcome
    }

    async fn run_locked(&self, item_id: i64) -> Result<Option<CatalogueItem>, DownloadError> {
        let item = self
            .store
            .get_item(item_id)?
            .ok_or(DownloadError::ItemVanished(item_id))?;
        let Some(url) = item.external_source else {
            warn!("Item {} has no source URL, nothing to download", item_id);
            return Ok(None);
        };

        if !self.store.claim_for_download(item_id)? {
            info!(
                "Item {} was claimed or completed by another job, skipping",
                item_id
            );
            return Ok(None);
        }

        let request = FetchRequest {
            output_template: self.materializer.output_template(item_id),
            audio_format: self.audio_format.clone(),
            audio_quality: self.audio_quality.clone(),
        };
        self.fetcher.fetch(&url, &request).await?;

        let file_path = self.materializer.materialize(item_id).await?;
        self.store.mark_complete(item_id, &file_path)?;

        Ok(Some(
            self.store
                .get_item(item_id)?
                .ok_or(DownloadError::ItemVanished(item_id))?,
        ))
    }

    fn spawn_job(self: &Arc<Self>, item_id: i64) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let job = tokio::spawn(async move { coordinator.execute(item_id).await });

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            match job.await {
                Ok(outcome) => debug!("Job for item {} finished: {:?}", item_id, outcome),
                Err(e) => {
                    error!("Job for item {} panicked: {}", item_id, e);
                    coordinator.record_abort(item_id);
                }
            }
        })
    }

    /// Marks an item whose job died without recording an outcome.
    fn record_abort(&self, item_id: i64) {
        match self.store.get_item(item_id) {
            Ok(Some(item)) if item.status != DownloadStatus::Complete => {
                self.record_failure(item_id, ABORTED_JOB_MESSAGE)
            }
            Ok(_) => {}
            Err(e) => error!("Failed to load item {} after abort: {:#}", item_id, e),
        }
    }

    fn record_failure(&self, item_id: i64, message: &str) {
        if let Err(e) = self.store.mark_failed(item_id, message) {
            error!("Failed to mark item {} as failed: {:#}", item_id, e);
        }
    }
}
