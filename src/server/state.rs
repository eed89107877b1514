use axum::extract::FromRef;

use crate::catalogue_store::CatalogueStore;
use crate::download_manager::{DownloadCoordinator, FileMaterializer};
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedCatalogueStore = Arc<dyn CatalogueStore>;
pub type GuardedCoordinator = Arc<DownloadCoordinator>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub catalogue_store: GuardedCatalogueStore,
    pub coordinator: GuardedCoordinator,
    pub materializer: FileMaterializer,
}

impl FromRef<ServerState> for GuardedCatalogueStore {
    fn from_ref(input: &ServerState) -> Self {
        input.catalogue_store.clone()
    }
}

impl FromRef<ServerState> for GuardedCoordinator {
    fn from_ref(input: &ServerState) -> Self {
        input.coordinator.clone()
    }
}

impl FromRef<ServerState> for FileMaterializer {
    fn from_ref(input: &ServerState) -> Self {
        input.materializer.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
