//! Queue offsets
//!
//! An offset names a position inside one partition of a queue. Durable
//! queues use `(segment_id, byte_offset)`; volatile queues carry no position.

use std::fmt;

/// Byte-exact location inside a segmented ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Monotonically increasing logical segment id
    pub segment_id: u64,
    /// Byte offset inside the segment
    pub byte_offset: u64,
}

impl Position {
    /// Create a new position
    #[inline]
    pub const fn new(segment_id: u64, byte_offset: u64) -> Self {
        Self {
            segment_id,
            byte_offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_id, self.byte_offset)
    }
}

/// Partition-scoped queue offset
///
/// Offsets are totally ordered within a partition. Comparing offsets from
/// different partitions is meaningless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset {
    /// Owning partition index
    pub partition: usize,
    /// Position for durable queues, `None` for volatile ones
    pub position: Option<Position>,
}

impl Offset {
    /// Offset with a durable position
    #[inline]
    pub const fn durable(partition: usize, position: Position) -> Self {
        Self {
            partition,
            position: Some(position),
        }
    }

    /// Offset without a position (volatile queues)
    #[inline]
    pub const fn volatile(partition: usize) -> Self {
        Self {
            partition,
            position: None,
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "p{}@{}", self.partition, pos),
            None => write!(f, "p{}@-", self.partition),
        }
    }
}
