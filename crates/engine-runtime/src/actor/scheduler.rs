use crate::actor::{ActorRef, messages::PollerMsg};
use std::time::Duration;
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Delivers delayed `Tick` messages back to the poller.
pub struct PollScheduler {
    actor_ref: ActorRef<PollerMsg>,
    cancel_token: CancellationToken,
}

impl PollScheduler {
    pub fn new(actor_ref: ActorRef<PollerMsg>, cancel_token: CancellationToken) -> Self {
        Self {
            actor_ref,
            cancel_token,
        }
    }

    /// Sends `Tick { job_id }` after `delay`, unless the token is cancelled first.
    pub fn schedule(&self, job_id: String, delay: Duration) -> JoinHandle<()> {
        let actor_ref = self.actor_ref.clone();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_token.cancelled() => {}
                _ = time::sleep(delay) => {
                    if actor_ref.send(PollerMsg::Tick { job_id: job_id.clone() }).await.is_err() {
                        debug!(job_id = %job_id, "Poller mailbox closed, dropping tick");
                    }
                }
            }
        })
    }
}
