#![allow(dead_code)]

use connectors::{
    content::{MemoryContentStore, SledContentStore},
    generation::InMemoryGenerationService,
};
use engine_core::{
    content::ContentStore,
    lock::{LockManager, memory::MemoryLockManager, sled_lock::SledLockManager},
    metrics::Metrics,
    retry::RetryPolicy,
    state::{JobStore, memory::MemoryJobStore, sled_store::SledJobStore},
};
use engine_runtime::{
    coordinator::{CoordinatorConfig, JobCoordinator},
    sequencer::PhaseSequencer,
};
use model::{
    job::JobSpec,
    target::{Location, PageTarget},
};
use std::{path::Path, sync::Arc, time::Duration};

pub mod engine;
pub mod utils;

const SERVICE: &str = "Repair";

/// A coordinator wired to in-process collaborators that tests can script.
struct Stack {
    store: Arc<dyn JobStore>,
    service: Arc<InMemoryGenerationService>,
    content: Arc<dyn ContentStore>,
    coordinator: Arc<JobCoordinator>,
}

impl Stack {
    fn sequencer(&self) -> PhaseSequencer {
        PhaseSequencer::new(self.coordinator.clone())
    }
}

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        remote_retry: RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
        ..CoordinatorConfig::default()
    }
}

fn build(
    store: Arc<dyn JobStore>,
    service: InMemoryGenerationService,
    content: Arc<dyn ContentStore>,
    locks: Arc<dyn LockManager>,
) -> Stack {
    let service = Arc::new(service);
    let coordinator = Arc::new(JobCoordinator::with_config(
        store.clone(),
        service.clone(),
        content.clone(),
        locks,
        Metrics::new(),
        config(),
    ));
    Stack {
        store,
        service,
        content,
        coordinator,
    }
}

fn memory_stack(service: InMemoryGenerationService, content: Arc<MemoryContentStore>) -> Stack {
    build(
        Arc::new(MemoryJobStore::new()),
        service,
        content,
        Arc::new(MemoryLockManager::new()),
    )
}

/// Job store, lock table and content store share one sled database under `dir`.
fn sled_stack(dir: &Path, service: InMemoryGenerationService) -> Stack {
    let store = SledJobStore::open(dir.join("db")).expect("open sled");
    let db = store.db().clone();
    build(
        Arc::new(store),
        service,
        Arc::new(SledContentStore::new(&db).expect("content tree")),
        Arc::new(SledLockManager::new(&db).expect("lock tree")),
    )
}

fn leaf_spec(name: &str, cities: &[&str]) -> JobSpec {
    JobSpec::new(
        name,
        cities
            .iter()
            .map(|city| PageTarget::leaf(SERVICE, &Location::new(*city, "TX")))
            .collect(),
    )
}
