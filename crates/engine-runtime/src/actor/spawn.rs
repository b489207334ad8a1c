use crate::actor::{Actor, ActorContext, ActorRef};
use std::fmt::Debug;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error};

/// Starts `actor` on its own task and returns its mailbox.
///
/// The task finishes after every [`ActorRef`] has been dropped, or right away
/// when `on_start` fails.
pub fn spawn_actor<M, A>(
    name: &'static str,
    mailbox_capacity: usize,
    actor: A,
) -> (ActorRef<M>, JoinHandle<()>)
where
    A: Actor<M>,
    M: Send + Debug + 'static,
{
    let (actor_ref, mailbox) = ActorRef::channel(name, mailbox_capacity);
    let handle = tokio::spawn(run(actor, mailbox, ActorContext::new(name)));
    (actor_ref, handle)
}

async fn run<M, A>(mut actor: A, mut mailbox: mpsc::Receiver<M>, mut ctx: ActorContext)
where
    A: Actor<M>,
    M: Send + Debug + 'static,
{
    if let Err(e) = actor.on_start(&ctx).await {
        error!(actor = ctx.name(), error = %e, "Actor failed to start");
        return;
    }

    while let Some(msg) = mailbox.recv().await {
        ctx.record_message();
        if let Err(e) = actor.handle(msg, &ctx).await {
            error!(actor = ctx.name(), error = %e, "Message handling failed");
        }
    }

    debug!(actor = ctx.name(), handled = ctx.handled(), "Mailbox closed");
    if let Err(e) = actor.on_stop(&ctx).await {
        error!(actor = ctx.name(), error = %e, "Actor failed to stop cleanly");
    }
}
