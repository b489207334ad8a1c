mod coordinator;

use crate::coordinator::{CoordinatorConfig, JobCoordinator};
use connectors::{content::MemoryContentStore, generation::InMemoryGenerationService};
use engine_core::{
    lock::memory::MemoryLockManager, metrics::Metrics, retry::RetryPolicy,
    state::memory::MemoryJobStore,
};
use model::{
    job::JobSpec,
    target::{Location, PageTarget},
};
use std::{sync::Arc, time::Duration};

pub(crate) struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub service: Arc<InMemoryGenerationService>,
    pub content: Arc<MemoryContentStore>,
    pub locks: Arc<MemoryLockManager>,
    pub coordinator: Arc<JobCoordinator>,
}

pub(crate) fn harness(service: InMemoryGenerationService) -> Harness {
    harness_with(service, MemoryContentStore::new())
}

pub(crate) fn harness_with(
    service: InMemoryGenerationService,
    content: MemoryContentStore,
) -> Harness {
    let store = Arc::new(MemoryJobStore::new());
    let service = Arc::new(service);
    let content = Arc::new(content);
    let locks = Arc::new(MemoryLockManager::new());

    let config = CoordinatorConfig {
        remote_retry: RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
        ..CoordinatorConfig::default()
    };
    let coordinator = Arc::new(JobCoordinator::with_config(
        store.clone(),
        service.clone(),
        content.clone(),
        locks.clone(),
        Metrics::new(),
        config,
    ));

    Harness {
        store,
        service,
        content,
        locks,
        coordinator,
    }
}

pub(crate) fn leaf_spec(cities: &[&str]) -> JobSpec {
    JobSpec::new(
        "water heater repair",
        cities
            .iter()
            .map(|city| PageTarget::leaf("Water Heater Repair", &Location::new(*city, "TX")))
            .collect(),
    )
}
