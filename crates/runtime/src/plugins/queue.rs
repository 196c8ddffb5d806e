//! Queue plugins

use std::sync::Arc;

use satellite_config::PluginConfig;
use satellite_queue::{MemoryQueueConfig, MmapQueueConfig, Queue};

use super::typed;
use crate::error::Result;
use crate::registry::{BuildContext, Category, PluginFactory};

pub struct MmapQueueFactory;

impl PluginFactory<Arc<Queue>> for MmapQueueFactory {
    fn name(&self) -> &'static str {
        "mmap-queue"
    }

    fn description(&self) -> &'static str {
        "Durable partitioned queue backed by a ring of memory-mapped segment files. \
         Each partition keeps its own meta.dat with writing, watermark, committed and \
         reading offsets; events survive restarts until acknowledged."
    }

    fn default_config(&self) -> &'static str {
        r#"
partition: 1
# Segment file size, rounded up to a page multiple
segment_size: 262144
# Segments mapped at once per partition
max_in_mem_segments: 10
queue_capacity_segments: 2000
# Background flush period in milliseconds
flush_period: 1000
# Unflushed records that force a flush
flush_ceiling: 10000
max_event_size: 20480
queue_dir: satellite-mmap-queue
"#
    }

    fn create(&self, config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<Arc<Queue>> {
        let cfg: MmapQueueConfig = typed(Category::Queue, self.name(), config)?;
        Ok(Arc::new(Queue::mmap(ctx.pipe, &cfg, Some(ctx.metrics.as_ref()))?))
    }
}

pub struct MemoryQueueFactory;

impl PluginFactory<Arc<Queue>> for MemoryQueueFactory {
    fn name(&self) -> &'static str {
        "memory-queue"
    }

    fn description(&self) -> &'static str {
        "Volatile partitioned queue held in memory. Faster than mmap-queue but loses \
         buffered events on restart."
    }

    fn default_config(&self) -> &'static str {
        r#"
partition: 1
# Events buffered per partition
event_buffer_size: 5000
"#
    }

    fn create(&self, config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<Arc<Queue>> {
        let cfg: MemoryQueueConfig = typed(Category::Queue, self.name(), config)?;
        Ok(Arc::new(Queue::memory(ctx.pipe, &cfg, Some(ctx.metrics.as_ref()))?))
    }
}

pub struct NoneQueueFactory;

impl PluginFactory<Arc<Queue>> for NoneQueueFactory {
    fn name(&self) -> &'static str {
        "none-queue"
    }

    fn description(&self) -> &'static str {
        "Stores nothing: every enqueue reports a full queue. For request/response \
         pipes whose receivers only serve sync event types."
    }

    fn create(&self, _config: &PluginConfig, ctx: &BuildContext<'_>) -> Result<Arc<Queue>> {
        Ok(Arc::new(Queue::none(ctx.pipe)))
    }
}
