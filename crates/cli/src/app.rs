use crate::error::CliError;
use async_trait::async_trait;
use connectors::{content::SledContentStore, generation::HttpGenerationClient};
use engine_config::settings::validated::ValidatedSettings;
use engine_core::{
    error::GenerationError,
    generation::GenerationService,
    lock::sled_lock::SledLockManager,
    metrics::Metrics,
    state::sled_store::SledJobStore,
};
use engine_runtime::{
    coordinator::{CoordinatorConfig, JobCoordinator},
    sequencer::PhaseSequencer,
};
use model::{
    item::{GeneratedContent, RawResultsPage, RemoteJobStatus, WorkItem},
    pagination::cursor::Cursor,
};
use std::sync::Arc;
use tracing::info;

/// Everything a command needs, opened against one state directory.
pub struct App {
    pub settings: ValidatedSettings,
    pub coordinator: Arc<JobCoordinator>,
    pub sequencer: PhaseSequencer,
}

impl App {
    pub fn open(settings: ValidatedSettings) -> Result<Self, CliError> {
        let store = SledJobStore::open(settings.db_path())?;
        let db = store.db().clone();
        let locks = SledLockManager::new(&db)?;
        let content = SledContentStore::new(&db)?;

        let service: Arc<dyn GenerationService> = match &settings.api {
            Some(api) => Arc::new(HttpGenerationClient::new(
                api.url.clone(),
                api.key.clone(),
                api.timeout,
            )?),
            None => Arc::new(UnconfiguredService),
        };

        let config = CoordinatorConfig {
            batch_policy: settings.batch_policy.clone(),
            max_item_attempts: settings.max_item_attempts,
            lock_ttl: settings.lock_ttl,
            ..CoordinatorConfig::default()
        };
        let coordinator = Arc::new(JobCoordinator::with_config(
            Arc::new(store),
            service,
            Arc::new(content),
            Arc::new(locks),
            Metrics::new(),
            config,
        ));
        info!(db = %settings.db_path().display(), "State store opened");

        Ok(Self {
            sequencer: PhaseSequencer::new(coordinator.clone()),
            coordinator,
            settings,
        })
    }
}

/// Stands in for the remote service when none is configured, so local
/// commands keep working and remote ones fail with a clear message.
struct UnconfiguredService;

impl UnconfiguredService {
    fn error() -> GenerationError {
        GenerationError::Configuration(
            "no generation service configured (set BULKGEN_API_URL and BULKGEN_API_KEY)".into(),
        )
    }
}

#[async_trait]
impl GenerationService for UnconfiguredService {
    async fn create_job(&self, _name: &str, _items: &[WorkItem]) -> Result<String, GenerationError> {
        Err(Self::error())
    }

    async fn get_job_status(&self, _job_id: &str) -> Result<RemoteJobStatus, GenerationError> {
        Err(Self::error())
    }

    async fn get_job_results(
        &self,
        _job_id: &str,
        _cursor: &Cursor,
        _limit: usize,
    ) -> Result<RawResultsPage, GenerationError> {
        Err(Self::error())
    }

    async fn ack_job_items(&self, _job_id: &str, _item_ids: &[String]) -> Result<(), GenerationError> {
        Err(Self::error())
    }

    async fn cancel_job(&self, _job_id: &str) -> Result<(), GenerationError> {
        Err(Self::error())
    }

    async fn generate_item(&self, _item: &WorkItem) -> Result<GeneratedContent, GenerationError> {
        Err(Self::error())
    }
}
