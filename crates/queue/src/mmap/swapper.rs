//! Partition maintenance thread
//!
//! One OS thread per mmap partition serialises swap decisions and runs the
//! periodic flush. Producers and the consumer talk to it over a channel:
//!
//! - `Abandoned(id)`: the consumer moved past `id`; flush and unmap it
//! - `Pressure`: a mapper is blocked at the cap; free at least one slot
//! - `Flush`: the producer hit the flush ceiling
//! - `Close`: exit the loop

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Abandoned(u64),
    Pressure,
    Flush,
    Close,
}

pub(crate) fn spawn(
    name: String,
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    flush_period: Duration,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(name)
        .spawn(move || run(&shared, &commands, flush_period))
}

fn run(shared: &Shared, commands: &Receiver<Command>, flush_period: Duration) {
    let mut last_flush = Instant::now();
    loop {
        let wait = flush_period.saturating_sub(last_flush.elapsed());
        match commands.recv_timeout(wait) {
            Ok(Command::Abandoned(segment_id)) => {
                if segment_id != shared.writing_segment()
                    && let Err(e) = shared.ring.unmap(segment_id)
                {
                    warn!(partition = shared.index, segment_id, error = %e, "failed to unmap abandoned segment");
                }
            }
            Ok(Command::Pressure) => sweep(shared),
            Ok(Command::Flush) => {
                flush(shared);
                last_flush = Instant::now();
            }
            Ok(Command::Close) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if last_flush.elapsed() >= flush_period {
            flush(shared);
            last_flush = Instant::now();
        }
    }
    debug!(partition = shared.index, "queue maintenance thread stopped");
}

fn flush(shared: &Shared) {
    if let Err(e) = shared.flush() {
        error!(partition = shared.index, error = %e, "periodic queue flush failed");
    }
}

/// Unmap segments that neither cursor is on, oldest-passed first, until
/// the ring is below its cap.
fn sweep(shared: &Shared) {
    let ring = &shared.ring;
    if ring.mapped_count() < ring.max_mapped() {
        return;
    }
    let reading = shared.reading_segment();
    let writing = shared.writing_segment();

    let mut victims: Vec<u64> = ring
        .mapped_ids()
        .into_iter()
        .filter(|id| *id != reading && *id != writing)
        .collect();
    // Segments behind the reader first, then the rest by age
    victims.sort_by_key(|id| (*id >= reading, *id));

    for id in victims {
        if ring.mapped_count() < ring.max_mapped() {
            break;
        }
        match ring.unmap(id) {
            Ok(_) => {}
            Err(e) => warn!(partition = shared.index, segment_id = id, error = %e, "failed to swap out segment"),
        }
    }
}
