use crate::actor::ActorRef;
use std::time::Duration;

/// Messages for the background poller.
#[derive(Debug)]
pub enum PollerMsg {
    /// Initialize the actor with its own reference for tick scheduling.
    SetActorRef(ActorRef<PollerMsg>),

    /// Poll `job_id` once `delay` has elapsed.
    Schedule { job_id: String, delay: Duration },

    /// A scheduled poll is due.
    Tick { job_id: String },

    /// Forget a job; pending ticks for it are dropped.
    Unschedule { job_id: String },

    /// Graceful shutdown.
    Stop,
}
