//! Queue calls off the async workers
//!
//! Durable partitions touch the disk on enqueue and dequeue and may block
//! while a segment is mapped in, so those calls run on the blocking pool.
//! Volatile queues never block and are called inline.

use std::sync::Arc;

use satellite_protocol::{Event, SequenceEvent};
use satellite_queue::{Partition, Queue, QueueError};

async fn run_blocking<T, F>(f: F) -> satellite_queue::Result<T>
where
    F: FnOnce() -> satellite_queue::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        // Runtime shutting down
        Err(_) => Err(QueueError::Closed),
    }
}

/// Route one event into `queue`, returning the partition it landed in
pub(crate) async fn enqueue(queue: &Arc<Queue>, event: Event) -> satellite_queue::Result<usize> {
    if !queue.is_durable() {
        return queue.enqueue(&event);
    }
    let queue = Arc::clone(queue);
    run_blocking(move || queue.enqueue(&event)).await
}

/// Pop the next event of `partition`
pub(crate) async fn dequeue(partition: &Arc<dyn Partition>) -> satellite_queue::Result<SequenceEvent> {
    if !partition.is_durable() {
        return partition.dequeue();
    }
    let partition = Arc::clone(partition);
    run_blocking(move || partition.dequeue()).await
}
