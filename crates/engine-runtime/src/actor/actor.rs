use crate::error::ActorError;
use async_trait::async_trait;
use std::{
    fmt::Debug,
    time::{Duration, Instant},
};
use tokio::sync::mpsc;

/// Bookkeeping the run loop keeps for one actor and lends to its callbacks.
#[derive(Debug)]
pub struct ActorContext {
    name: &'static str,
    started_at: Instant,
    handled: u64,
}

impl ActorContext {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            started_at: Instant::now(),
            handled: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Messages handled so far, failed ones included.
    pub fn handled(&self) -> u64 {
        self.handled
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub(crate) fn record_message(&mut self) {
        self.handled += 1;
    }
}

/// State owned by a single task and driven by messages of type `M`.
///
/// Messages are handled one at a time in arrival order. A failing `handle`
/// is logged and the loop moves on to the next message.
#[async_trait]
pub trait Actor<M>: Send + 'static
where
    M: Send + Debug + 'static,
{
    async fn on_start(&mut self, _ctx: &ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    async fn handle(&mut self, msg: M, ctx: &ActorContext) -> Result<(), ActorError>;

    /// Runs once the last [`ActorRef`] is gone and the mailbox is drained.
    async fn on_stop(&mut self, _ctx: &ActorContext) -> Result<(), ActorError> {
        Ok(())
    }
}

/// Sending half of an actor's mailbox.
#[derive(Debug)]
pub struct ActorRef<M> {
    name: &'static str,
    tx: mpsc::Sender<M>,
}

// Manual impl: a derive would demand `M: Clone`.
impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

impl<M> ActorRef<M>
where
    M: Send + Debug + 'static,
{
    /// Opens a bounded mailbox and returns both ends.
    pub(crate) fn channel(name: &'static str, capacity: usize) -> (Self, mpsc::Receiver<M>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { name, tx }, rx)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits for mailbox space. Fails only when the actor has stopped.
    pub async fn send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.send(msg).await.map_err(|_| ActorError::MailboxClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
