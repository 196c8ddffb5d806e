//! Pipe - one gatherer, processor and sender run together
//!
//! Shutdown is staged: cancellation stops the gatherer and processor
//! first, then the sender drains its input and open batches, and the queue
//! is flushed and closed last. Over a volatile queue the gatherer and
//! processor first hand every accepted event downstream, since nothing
//! would replay it. A fatal error in any front stage cancels the rest of
//! this pipe only.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{Gatherer, PipelineError, Processor, Result, Sender};

pub struct Pipe {
    name: String,
    gatherer: Arc<Gatherer>,
    processor: Arc<Processor>,
    sender: Arc<Sender>,
}

impl Pipe {
    pub fn new(gatherer: Arc<Gatherer>, processor: Arc<Processor>, sender: Arc<Sender>) -> Self {
        Self {
            name: gatherer.pipe().to_string(),
            gatherer,
            processor,
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gatherer(&self) -> &Arc<Gatherer> {
        &self.gatherer
    }

    pub fn sender(&self) -> &Arc<Sender> {
        &self.sender
    }

    /// Run until `cancel` fires or a stage fails fatally
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let front_cancel = cancel.child_token();
        let sender_cancel = CancellationToken::new();

        let mut senders = JoinSet::new();
        self.sender.start(&mut senders, sender_cancel.clone())?;

        let mut front = JoinSet::new();
        let outputs = self
            .gatherer
            .take_outputs()
            .ok_or(PipelineError::Unavailable("gatherer output"))?;
        let drain = !self.gatherer.queue().is_durable();
        self.processor.start(outputs, &mut front, front_cancel.clone(), drain);
        self.gatherer.start(&mut front, front_cancel.clone())?;
        info!(pipe = %self.name, "pipe running");

        let mut failure = None;
        while let Some(joined) = front.join_next().await {
            let outcome = joined.map_err(|e| PipelineError::Task(e.to_string())).and_then(|r| r);
            if let Err(e) = outcome {
                error!(pipe = %self.name, error = %e, "pipe stage failed");
                front_cancel.cancel();
                failure.get_or_insert(e);
            }
        }

        sender_cancel.cancel();
        while let Some(joined) = senders.join_next().await {
            if let Err(e) = joined {
                error!(pipe = %self.name, error = %e, "sender task failed");
            }
        }

        if let Err(e) = self.gatherer.close() {
            error!(pipe = %self.name, error = %e, "failed to close queue");
            failure.get_or_insert(e);
        }
        info!(pipe = %self.name, "pipe stopped");
        failure.map_or(Ok(()), Err)
    }
}
