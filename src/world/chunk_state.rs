/// Chunk lifecycle states
///
/// A chunk is readable only in `Ready`, `Saving` and `QueuedUnload`; every
/// other state means the chunk is absent from the live map and reads fall
/// back to air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChunkState {
    /// Not known to the manager
    #[default]
    Empty,
    /// Waiting in the load queue
    QueuedLoad,
    /// A worker is reading the persistent store or inflating a cached blob
    Loading,
    /// A worker is running the terrain generator
    Generating,
    /// Being lit against its neighbours before insertion
    Lighting,
    Ready,
    /// Pinned while a save job runs
    Saving,
    QueuedUnload,
    /// Being removed from the live map
    Unloading,
    /// The last load attempt failed; the next request retries
    Error,
}

impl ChunkState {
    /// Blocks of the chunk can be read
    pub fn is_resident(self) -> bool {
        matches!(self, ChunkState::Ready | ChunkState::Saving | ChunkState::QueuedUnload)
    }

    /// A load for this chunk is queued or running
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            ChunkState::QueuedLoad | ChunkState::Loading | ChunkState::Generating | ChunkState::Lighting
        )
    }
}

/// Load queue priority; lower sorts first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadPriority {
    /// The observer's own column
    Critical,
    /// The ring around the observer
    High,
    /// Within simulation distance, or requested by a read
    Normal,
    /// Within load distance
    Low,
}

impl LoadPriority {
    /// Priority of a chunk at Chebyshev `distance` from the observer
    pub fn for_distance(distance: u32, simulation_distance: u32) -> Self {
        match distance {
            0 => LoadPriority::Critical,
            1 => LoadPriority::High,
            d if d <= simulation_distance => LoadPriority::Normal,
            _ => LoadPriority::Low,
        }
    }
}
