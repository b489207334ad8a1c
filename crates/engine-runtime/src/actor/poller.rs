use crate::{
    actor::{
        Actor, ActorContext, ActorRef,
        backoff::{NextPoll, PollBackoff},
        messages::PollerMsg,
        scheduler::PollScheduler,
        spawn::spawn_actor,
    },
    coordinator::JobCoordinator,
    error::ActorError,
};
use async_trait::async_trait;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between polls while a job keeps making progress.
    pub interval: Duration,
    /// Consecutive failed steps after which a job is dropped from the background loop.
    pub give_up_after: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub mailbox_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            give_up_after: 5,
            base_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            mailbox_capacity: 100,
        }
    }
}

/// Fallback driver: polls scheduled jobs until they stop needing follow-up.
pub struct PollerActor {
    coordinator: Arc<JobCoordinator>,
    scheduler: Option<PollScheduler>,
    cancel_token: CancellationToken,
    backoff: PollBackoff,
    /// Jobs with a tick in flight.
    pending: HashSet<String>,
}

impl PollerActor {
    pub fn new(
        coordinator: Arc<JobCoordinator>,
        config: &PollerConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            scheduler: None,
            cancel_token,
            backoff: PollBackoff::new(
                config.interval,
                config.give_up_after,
                config.base_backoff,
                config.max_backoff,
            ),
            pending: HashSet::new(),
        }
    }

    fn schedule(&mut self, job_id: String, delay: Duration) {
        let Some(scheduler) = &self.scheduler else {
            warn!(job_id = %job_id, "Poller has no actor reference yet, dropping schedule");
            return;
        };
        if !self.pending.insert(job_id.clone()) {
            debug!(job_id = %job_id, "Poll already scheduled");
            return;
        }
        scheduler.schedule(job_id, delay);
    }

    async fn run_step(&mut self, job_id: &str) -> Option<NextPoll> {
        match self.coordinator.poll(job_id).await {
            Ok(report) if report.error.is_some() => {
                self.coordinator.metrics().increment_failures(1);
                Some(self.backoff.on_failure(job_id))
            }
            Ok(report) => {
                // Safety net for rows whose bookkeeping lagged behind their artifact.
                if let Err(e) = self.coordinator.status(job_id).await {
                    warn!(job_id, error = %e, "Background reconcile failed");
                }
                if report.needs_followup {
                    Some(self.backoff.on_success(job_id))
                } else {
                    info!(job_id, status = %report.status, "Background polling finished");
                    self.backoff.forget(job_id);
                    None
                }
            }
            Err(e) => {
                self.coordinator.metrics().increment_failures(1);
                error!(job_id, error = %e, "Background poll failed");
                if e.is_configuration() {
                    self.backoff.forget(job_id);
                    return Some(NextPoll::GiveUp);
                }
                Some(self.backoff.on_failure(job_id))
            }
        }
    }
}

#[async_trait]
impl Actor<PollerMsg> for PollerActor {
    async fn on_start(&mut self, ctx: &ActorContext) -> Result<(), ActorError> {
        info!(actor = ctx.name(), "Poller actor started");
        Ok(())
    }

    async fn handle(&mut self, msg: PollerMsg, ctx: &ActorContext) -> Result<(), ActorError> {
        match msg {
            PollerMsg::SetActorRef(actor_ref) => {
                self.scheduler = Some(PollScheduler::new(actor_ref, self.cancel_token.clone()));
            }

            PollerMsg::Schedule { job_id, delay } => {
                if self.cancel_token.is_cancelled() {
                    return Ok(());
                }
                debug!(actor = ctx.name(), job_id = %job_id, delay_ms = delay.as_millis() as u64, "Scheduling poll");
                self.schedule(job_id, delay);
            }

            PollerMsg::Tick { job_id } => {
                if !self.pending.remove(&job_id) || self.cancel_token.is_cancelled() {
                    return Ok(());
                }

                match self.run_step(&job_id).await {
                    Some(NextPoll::After(delay)) => self.schedule(job_id, delay),
                    Some(NextPoll::GiveUp) => {
                        warn!(actor = ctx.name(), job_id = %job_id, "Giving up on background polling");
                    }
                    None => {}
                }
            }

            PollerMsg::Unschedule { job_id } => {
                self.pending.remove(&job_id);
                self.backoff.forget(&job_id);
            }

            PollerMsg::Stop => {
                info!(actor = ctx.name(), "Stopping poller");
                self.cancel_token.cancel();
                self.pending.clear();
                // Drops the self-reference so the mailbox can close.
                self.scheduler = None;
            }
        }
        Ok(())
    }

    async fn on_stop(&mut self, ctx: &ActorContext) -> Result<(), ActorError> {
        info!(
            actor = ctx.name(),
            handled = ctx.handled(),
            uptime_ms = ctx.uptime().as_millis() as u64,
            "Poller actor stopped"
        );
        Ok(())
    }
}

/// Owning handle for a running [`PollerActor`].
pub struct BackgroundPoller {
    poller_ref: ActorRef<PollerMsg>,
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl BackgroundPoller {
    pub async fn spawn(
        coordinator: Arc<JobCoordinator>,
        config: PollerConfig,
        cancel_token: CancellationToken,
    ) -> Result<Self, ActorError> {
        let actor = PollerActor::new(coordinator, &config, cancel_token.clone());
        let (poller_ref, handle) = spawn_actor("poller", config.mailbox_capacity, actor);

        poller_ref
            .send(PollerMsg::SetActorRef(poller_ref.clone()))
            .await?;

        Ok(Self {
            poller_ref,
            handle,
            cancel_token,
        })
    }

    pub async fn schedule(&self, job_id: impl Into<String>, delay: Duration) -> Result<(), ActorError> {
        self.poller_ref
            .send(PollerMsg::Schedule {
                job_id: job_id.into(),
                delay,
            })
            .await
    }

    pub async fn unschedule(&self, job_id: impl Into<String>) -> Result<(), ActorError> {
        self.poller_ref
            .send(PollerMsg::Unschedule {
                job_id: job_id.into(),
            })
            .await
    }

    pub async fn stop(&self) {
        self.cancel_token.cancel();
        if let Err(e) = self.poller_ref.send(PollerMsg::Stop).await {
            error!(error = ?e, "Failed to send stop to poller");
        }
    }

    /// Stops the poller and waits for its task to exit.
    pub async fn shutdown(self) -> Result<(), ActorError> {
        self.stop().await;
        let Self { poller_ref, handle, .. } = self;
        drop(poller_ref);
        handle
            .await
            .map_err(|e| ActorError::Internal(e.to_string()))
    }

    pub fn poller_ref(&self) -> &ActorRef<PollerMsg> {
        &self.poller_ref
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
