pub mod actor;
pub mod backoff;
pub mod messages;
pub mod poller;
pub mod scheduler;
pub mod spawn;

pub use actor::{Actor, ActorContext, ActorRef};
