//! Business logic services.

pub mod cleanup;
pub mod history;
pub mod memory;
pub mod session;
pub mod stage;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use crate::config::ImportSettings;
use crate::db::UploadRepository;
use crate::import::{FileIngestor, HeaderDetector};

pub use cleanup::{CleanupConfig, start_cleanup_task};
pub use history::{HistoryCache, HistoryEntry, UploadHistoryStore};
pub use memory::{MemoryObjectStore, MemoryUploadRepository};
pub use session::{SessionRegistry, UploadSession};
pub use stage::{PersistenceError, StageWorkflow};
pub use storage::{ObjectStore, Storage};

/// Shared state behind the HTTP handlers.
///
/// Built once from the two backends; cloning is cheap.
#[derive(Clone)]
pub struct ImportServices {
    pub store: Arc<dyn ObjectStore>,
    pub repo: Arc<dyn UploadRepository>,
    pub sessions: Arc<SessionRegistry>,
    pub workflow: StageWorkflow,
    pub history: UploadHistoryStore,
    pub settings: ImportSettings,
}

impl ImportServices {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        repo: Arc<dyn UploadRepository>,
        settings: ImportSettings,
    ) -> Self {
        let cache = HistoryCache::new(Duration::from_secs(settings.history_cache_ttl_secs));
        let ingestor = FileIngestor::new(HeaderDetector::new(settings.header_scan_rows));

        Self {
            sessions: Arc::new(SessionRegistry::new(ingestor, settings.preview_rows)),
            workflow: StageWorkflow::new(store.clone(), repo.clone(), cache.clone()),
            history: UploadHistoryStore::new(
                store.clone(),
                repo.clone(),
                cache,
                settings.history_limit,
            ),
            store,
            repo,
            settings,
        }
    }

    /// Spawn the periodic sweeper for idle sessions and stuck uploads.
    pub fn start_cleanup(&self) -> tokio::task::JoinHandle<()> {
        start_cleanup_task(
            self.sessions.clone(),
            self.repo.clone(),
            self.workflow.clone(),
            CleanupConfig::from(&self.settings),
        )
    }
}
