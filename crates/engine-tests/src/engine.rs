#[cfg(test)]
mod tests {
    use crate::{
        SERVICE, leaf_spec, memory_stack, sled_stack,
        utils::{assert_counters_consistent, assert_rows, load, poll_until_settled, wait_for_status},
    };
    use connectors::{content::MemoryContentStore, generation::InMemoryGenerationService};
    use engine_config::report::export::{ExportFormat, export_to_path};
    use engine_core::content::ContentStore;
    use engine_processing::import_gate::ImportOutcome;
    use engine_runtime::{
        actor::poller::{BackgroundPoller, PollerConfig},
        coordinator::SingleOptions,
    };
    use model::{
        job::{JobStatus, RowStatus},
        target::{Location, PageTarget},
    };
    use std::{sync::Arc, time::Duration};
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    const CITIES: [&str; 3] = ["Dallas", "Austin", "Waco"];

    // Two callers polling the same job at once must never create an
    // artifact twice, however their imports interleave.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_polls_create_each_artifact_once() {
        let content = Arc::new(MemoryContentStore::new().with_upsert_delay(Duration::from_millis(25)));
        let stack = memory_stack(InMemoryGenerationService::new().with_auto_complete(), content.clone());
        let (job_id, _) = stack
            .coordinator
            .create_and_submit(leaf_spec("race", &CITIES))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            stack.coordinator.poll(&job_id),
            stack.coordinator.poll(&job_id)
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(content.artifact_count(), 3);
        assert_eq!(content.upsert_count(), 3);

        poll_until_settled(&stack, &job_id, 5).await;
        let job = stack.coordinator.status(&job_id).await.unwrap();
        assert_rows(&job, RowStatus::Success);
        assert_counters_consistent(&job);
        assert_eq!(content.artifact_count(), 3);
        assert_eq!(content.upsert_count(), 3);
    }

    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_single_generation_creates_one_artifact() {
        let content = Arc::new(MemoryContentStore::new().with_upsert_delay(Duration::from_millis(25)));
        let stack = memory_stack(InMemoryGenerationService::new(), content.clone());
        let target = PageTarget::leaf(SERVICE, &Location::new("Dallas", "TX"));

        let (a, b) = tokio::join!(
            stack.coordinator.generate_single(target.clone(), SingleOptions::default()),
            stack.coordinator.generate_single(target.clone(), SingleOptions::default())
        );
        let outcomes = [a.unwrap().outcome, b.unwrap().outcome];
        assert_eq!(
            outcomes.iter().filter(|o| **o == ImportOutcome::Success).count(),
            1
        );
        assert_eq!(content.artifact_count(), 1);

        // A later request sees the artifact and skips generation entirely.
        let calls = stack.service.generate_calls();
        let again = stack
            .coordinator
            .generate_single(target, SingleOptions::default())
            .await
            .unwrap();
        assert_eq!(again.outcome, ImportOutcome::AlreadyExisted);
        assert_eq!(stack.service.generate_calls(), calls);
    }

    #[traced_test]
    #[tokio::test]
    async fn failed_upsert_releases_lock_for_redelivery() {
        let content = Arc::new(MemoryContentStore::new());
        let stack = memory_stack(InMemoryGenerationService::new().with_auto_complete(), content.clone());
        let (job_id, _) = stack
            .coordinator
            .create_and_submit(leaf_spec("flaky store", &["Dallas"]))
            .await
            .unwrap();

        content.fail_next_upserts(1);
        let first = stack.coordinator.poll(&job_id).await.unwrap();
        assert_eq!(first.acknowledged, 0);
        assert_eq!(first.tally.retry_pending, 1);
        assert_eq!(first.tally.lock_contended, 0);

        // The redelivered item takes the lock straight away.
        let second = stack.coordinator.poll(&job_id).await.unwrap();
        assert_eq!(second.tally.lock_contended, 0);
        assert_eq!(second.tally.imported, 1);
        assert_eq!(second.status, JobStatus::Complete);
        assert_eq!(content.artifact_count(), 1);
    }

    // The background poller and a foreground caller run the same step, so
    // they leave identical rows behind.
    #[traced_test]
    #[tokio::test]
    async fn background_and_foreground_polls_agree() {
        let foreground = memory_stack(
            InMemoryGenerationService::new().with_auto_complete(),
            Arc::new(MemoryContentStore::new()),
        );
        let background = memory_stack(
            InMemoryGenerationService::new().with_auto_complete(),
            Arc::new(MemoryContentStore::new()),
        );

        let (fg_id, _) = foreground
            .coordinator
            .create_and_submit(leaf_spec("same", &CITIES))
            .await
            .unwrap();
        let (bg_id, _) = background
            .coordinator
            .create_and_submit(leaf_spec("same", &CITIES))
            .await
            .unwrap();

        let fg_job = poll_until_settled(&foreground, &fg_id, 5).await;

        let config = PollerConfig {
            interval: Duration::from_millis(10),
            ..PollerConfig::default()
        };
        let poller = BackgroundPoller::spawn(background.coordinator.clone(), config, CancellationToken::new())
            .await
            .unwrap();
        poller.schedule(bg_id.clone(), Duration::ZERO).await.unwrap();
        assert!(wait_for_status(&background, &bg_id, JobStatus::Complete).await);
        poller.shutdown().await.unwrap();

        let bg_job = load(&background, &bg_id).await;
        assert_eq!(fg_job.counters, bg_job.counters);
        let statuses = |job: &model::job::Job| {
            job.rows
                .iter()
                .map(|r| (r.canonical_key.clone(), r.status))
                .collect::<Vec<_>>()
        };
        assert_eq!(statuses(&fg_job), statuses(&bg_job));
    }

    #[traced_test]
    #[tokio::test]
    async fn sled_backed_job_survives_reopen() {
        let dir = tempdir().unwrap();

        let job_id = {
            let stack = sled_stack(dir.path(), InMemoryGenerationService::new().with_auto_complete());
            let (job_id, _) = stack
                .coordinator
                .create_and_submit(leaf_spec("durable", &CITIES))
                .await
                .unwrap();
            let job = poll_until_settled(&stack, &job_id, 5).await;
            assert!(job.is_drained());
            job_id
        };

        let stack = sled_stack(dir.path(), InMemoryGenerationService::new());
        let job = load(&stack, &job_id).await;
        assert_eq!(job.status, JobStatus::Complete);
        assert_rows(&job, RowStatus::Success);
        assert_counters_consistent(&job);
        assert_eq!(stack.coordinator.recent(5).await.unwrap(), vec![job_id.clone()]);

        let rows = stack.coordinator.export(&job_id).await.unwrap();
        assert_eq!(rows.len(), 3);
        let path = dir.path().join("exports").join(format!("{job_id}.csv"));
        export_to_path(&rows, ExportFormat::Csv, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 4);
        assert!(written.lines().skip(1).all(|line| line.contains("success")));

        for row in &job.rows {
            let record = stack
                .content
                .find_by_canonical_key(&row.canonical_key)
                .await
                .unwrap()
                .expect("artifact persisted");
            assert_eq!(Some(record.artifact_ref), row.artifact_ref);
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn sled_backed_second_job_reuses_artifacts() {
        let dir = tempdir().unwrap();
        let stack = sled_stack(dir.path(), InMemoryGenerationService::new().with_auto_complete());

        let (first, _) = stack
            .coordinator
            .create_and_submit(leaf_spec("one", &CITIES))
            .await
            .unwrap();
        poll_until_settled(&stack, &first, 5).await;

        let (second, _) = stack
            .coordinator
            .create_and_submit(leaf_spec("two", &CITIES))
            .await
            .unwrap();
        let job = poll_until_settled(&stack, &second, 5).await;
        assert_rows(&job, RowStatus::Skipped);

        let first_job = load(&stack, &first).await;
        let second_job = stack.coordinator.status(&second).await.unwrap();
        let refs = |job: &model::job::Job| {
            job.rows
                .iter()
                .map(|r| r.artifact_ref.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(refs(&first_job), refs(&second_job));
        assert_eq!(
            stack.coordinator.recent(10).await.unwrap(),
            vec![second.clone(), first.clone()]
        );
    }
}
