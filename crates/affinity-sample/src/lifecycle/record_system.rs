use crate::clients::RecordClient;
use crate::store::{MemoryStore, StoreConfig, Volume};
use affinity_actor::{ActorOptions, Registry};
use tracing::{info, warn};

/// Orchestrates the store actors for one database path.
#[derive(Clone)]
pub struct RecordSystem {
    path: String,
    volume: Volume,
    registry: Registry<MemoryStore>,
}

impl RecordSystem {
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_options(path, ActorOptions::default())
    }

    pub fn with_options(path: impl Into<String>, options: ActorOptions) -> Self {
        let path = path.into();
        info!(path = %path, "Record system created");
        Self {
            path,
            volume: Volume::new(),
            registry: Registry::with_options(options),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn registry(&self) -> &Registry<MemoryStore> {
        &self.registry
    }

    /// Client for the shared read-write store actor.
    pub fn client(&self) -> RecordClient {
        self.client_for(StoreConfig::new(self.volume.clone()))
    }

    /// Client for the shared read-only store actor.
    pub fn reader(&self) -> RecordClient {
        self.client_for(StoreConfig::new(self.volume.clone()).read_only())
    }

    fn client_for(&self, config: StoreConfig) -> RecordClient {
        RecordClient::new(self.registry.get_instance(self.path.clone(), config))
    }

    /// Blocks until every released store actor has drained and closed.
    pub fn settle(&self) {
        self.registry.join_retired();
    }

    /// Waits for released actors to finish tearing down.
    ///
    /// Actors still referenced by a live client are left running; they are torn down when
    /// their last client is released.
    pub async fn shutdown(self) {
        let live = self.registry.len();
        if live > 0 {
            warn!(path = %self.path, live, "Shutting down with clients still alive");
        }
        let registry = self.registry.clone();
        if tokio::task::spawn_blocking(move || registry.join_retired())
            .await
            .is_err()
        {
            warn!(path = %self.path, "Teardown wait panicked");
        }
        info!(path = %self.path, records = self.volume.len(), "Record system shut down");
    }
}
