/// World events
///
/// Subsystems report what changed as `WorldEvent` values; the world buffers
/// them during a tick and hands them to registered listeners on the world
/// thread, in the order they were produced. Block changes are delivered as
/// soon as the write returns.
use crate::physics::TriggerEvent;
use crate::time::{DayPhase, PhaseChange};
use crate::weather::{WeatherChange, WeatherKind};
use crate::world::{BlockId, BlockPos, ChunkPos};

/// Something observable happened in the world
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldEvent {
    ChunkReady(ChunkPos),
    ChunkUnloaded(ChunkPos),
    BlockChanged {
        pos: BlockPos,
        old: BlockId,
        new: BlockId,
    },
    WeatherChanged(WeatherChange),
    TimePhase(PhaseChange),
    Trigger(TriggerEvent),
}

impl WorldEvent {
    /// Short name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            WorldEvent::ChunkReady(_) => "chunk_ready",
            WorldEvent::ChunkUnloaded(_) => "chunk_unload",
            WorldEvent::BlockChanged { .. } => "block_change",
            WorldEvent::WeatherChanged(_) => "weather_change",
            WorldEvent::TimePhase(_) => "time_phase",
            WorldEvent::Trigger(_) => "trigger",
        }
    }
}

/// Chunk streaming notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkNotice {
    Ready(ChunkPos),
    Unloaded(ChunkPos),
}

pub type BlockListener = Box<dyn FnMut(BlockPos, BlockId, BlockId) + Send>;
pub type WeatherListener = Box<dyn FnMut(WeatherKind, WeatherKind) + Send>;
pub type ChunkListener = Box<dyn FnMut(ChunkNotice) + Send>;
pub type TimeListener = Box<dyn FnMut(DayPhase, DayPhase) + Send>;
pub type TriggerListener = Box<dyn FnMut(TriggerEvent) + Send>;

/// Identifies a registered listener so it can be removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Event dispatch statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    pub dispatched: u64,
    pub queued: usize,
    pub listeners: usize,
}

/// Listener registry plus the queue of events not yet delivered
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    block: Vec<(ListenerId, BlockListener)>,
    weather: Vec<(ListenerId, WeatherListener)>,
    chunk: Vec<(ListenerId, ChunkListener)>,
    time: Vec<(ListenerId, TimeListener)>,
    trigger: Vec<(ListenerId, TriggerListener)>,
    queue: Vec<WorldEvent>,
    dispatched: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("queue", &self.queue)
            .field("dispatched", &self.dispatched)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    pub fn on_block_change(&mut self, listener: BlockListener) -> ListenerId {
        let id = self.allocate();
        self.block.push((id, listener));
        id
    }

    pub fn on_weather_change(&mut self, listener: WeatherListener) -> ListenerId {
        let id = self.allocate();
        self.weather.push((id, listener));
        id
    }

    pub fn on_chunk(&mut self, listener: ChunkListener) -> ListenerId {
        let id = self.allocate();
        self.chunk.push((id, listener));
        id
    }

    pub fn on_time_phase(&mut self, listener: TimeListener) -> ListenerId {
        let id = self.allocate();
        self.time.push((id, listener));
        id
    }

    pub fn on_trigger(&mut self, listener: TriggerListener) -> ListenerId {
        let id = self.allocate();
        self.trigger.push((id, listener));
        id
    }

    /// Remove a listener of any kind; returns whether it existed
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listener_count();
        self.block.retain(|(l, _)| *l != id);
        self.weather.retain(|(l, _)| *l != id);
        self.chunk.retain(|(l, _)| *l != id);
        self.time.retain(|(l, _)| *l != id);
        self.trigger.retain(|(l, _)| *l != id);
        self.listener_count() != before
    }

    pub fn listener_count(&self) -> usize {
        self.block.len() + self.weather.len() + self.chunk.len() + self.time.len() + self.trigger.len()
    }

    /// Buffer an event for the next `dispatch`
    pub fn push(&mut self, event: WorldEvent) {
        self.queue.push(event);
    }

    pub fn pending(&self) -> &[WorldEvent] {
        &self.queue
    }

    /// Deliver one event now
    pub fn deliver(&mut self, event: WorldEvent) {
        self.dispatched += 1;
        match event {
            WorldEvent::ChunkReady(pos) => {
                for (_, listener) in self.chunk.iter_mut() {
                    listener(ChunkNotice::Ready(pos));
                }
            }
            WorldEvent::ChunkUnloaded(pos) => {
                for (_, listener) in self.chunk.iter_mut() {
                    listener(ChunkNotice::Unloaded(pos));
                }
            }
            WorldEvent::BlockChanged { pos, old, new } => {
                for (_, listener) in self.block.iter_mut() {
                    listener(pos, old, new);
                }
            }
            WorldEvent::WeatherChanged(change) => {
                for (_, listener) in self.weather.iter_mut() {
                    listener(change.old, change.new);
                }
            }
            WorldEvent::TimePhase(change) => {
                for (_, listener) in self.time.iter_mut() {
                    listener(change.old, change.new);
                }
            }
            WorldEvent::Trigger(trigger) => {
                for (_, listener) in self.trigger.iter_mut() {
                    listener(trigger);
                }
            }
        }
    }

    /// Deliver every buffered event in order; returns how many were sent
    pub fn dispatch(&mut self) -> usize {
        let events = std::mem::take(&mut self.queue);
        let count = events.len();
        for event in events {
            log::trace!("[EventBus] Dispatching {}", event.event_type());
            self.deliver(event);
        }
        count
    }

    pub fn stats(&self) -> EventStats {
        EventStats {
            dispatched: self.dispatched,
            queued: self.queue.len(),
            listeners: self.listener_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_events_reach_matching_listeners_in_order() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.on_chunk(Box::new(move |notice| sink.lock().expect("lock").push(notice)));
        let blocks = Arc::new(Mutex::new(0));
        let block_sink = blocks.clone();
        bus.on_block_change(Box::new(move |_, _, _| *block_sink.lock().expect("lock") += 1));

        bus.push(WorldEvent::ChunkReady(ChunkPos::new(1, 2)));
        bus.push(WorldEvent::ChunkUnloaded(ChunkPos::new(3, 4)));
        assert_eq!(bus.dispatch(), 2);

        assert_eq!(
            *seen.lock().expect("lock"),
            vec![
                ChunkNotice::Ready(ChunkPos::new(1, 2)),
                ChunkNotice::Unloaded(ChunkPos::new(3, 4))
            ]
        );
        assert_eq!(*blocks.lock().expect("lock"), 0);
        assert_eq!(bus.stats().dispatched, 2);
    }

    #[test]
    fn test_removed_listener_is_silent() {
        let mut bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        let id = bus.on_block_change(Box::new(move |_, _, _| *sink.lock().expect("lock") += 1));
        assert!(bus.remove(id));
        assert!(!bus.remove(id));
        bus.deliver(WorldEvent::BlockChanged {
            pos: BlockPos::new(0, 0, 0),
            old: BlockId::AIR,
            new: BlockId::STONE,
        });
        assert_eq!(*count.lock().expect("lock"), 0);
    }
}
