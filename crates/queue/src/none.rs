//! Pass-through partition for request/response pipes

use satellite_protocol::{Event, Offset, SequenceEvent};

use crate::error::{QueueError, Result};
use crate::Partition;

/// Stores nothing: every enqueue is `Full`, every dequeue is `Empty`
#[derive(Debug, Default)]
pub struct NonePartition {
    index: usize,
}

impl NonePartition {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl Partition for NonePartition {
    fn index(&self) -> usize {
        self.index
    }

    fn enqueue(&self, _event: &Event) -> Result<()> {
        Err(QueueError::Full)
    }

    fn dequeue(&self) -> Result<SequenceEvent> {
        Err(QueueError::Empty)
    }

    fn ack(&self, _offset: &Offset) -> Result<()> {
        Ok(())
    }

    fn is_full(&self) -> bool {
        true
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
