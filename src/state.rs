use crate::access::AccessPolicy;
use crate::config::AppConfig;
use crate::services::locks::RecordLocks;
use crate::storage::StorageMedium;
use crate::store::MetadataStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub storage: Arc<dyn StorageMedium>,
    pub access: Arc<dyn AccessPolicy>,
    pub locks: Arc<RecordLocks>,
    pub config: Arc<AppConfig>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn MetadataStore>,
        storage: Arc<dyn StorageMedium>,
        access: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            store,
            storage,
            access,
            locks: Arc::new(RecordLocks::default()),
            config: Arc::new(config),
            start_time: chrono::Utc::now(),
        }
    }
}
