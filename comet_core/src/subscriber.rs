//! Parked subscriber records and their arena.

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

/// Handle identifying a pooled subscriber.
///
/// Carries the arena index plus a generation stamp. The transport holds a
/// key for as long as its response body lives; once the engine detaches the
/// subscriber the generation is bumped and the key goes stale, so a late
/// disconnect notification is a no-op rather than an aliased detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberKey {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

/// A parked long-poll request awaiting delivery.
#[derive(Debug)]
pub(crate) struct Subscriber {
    /// Owning channel slot.
    pub(crate) channel: usize,
    /// Ticks since parking.
    pub(crate) idle: i32,
    /// Client-provided echo sequence for noop frames.
    pub(crate) noop_seq: u32,
    /// JSONP callback name.
    pub(crate) callback: String,
    /// Chunk sink of the started HTTP response. Dropping it ends the
    /// response on the transport side.
    pub(crate) frames: UnboundedSender<Bytes>,

    // per-channel list links (arena indices)
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,
}

/// Generation-stamped arena of subscriber records.
#[derive(Debug, Default)]
pub(crate) struct SubscriberPool {
    cells: Vec<Cell>,
    free: Vec<usize>,
}

#[derive(Debug)]
struct Cell {
    generation: u64,
    sub: Option<Subscriber>,
}

impl SubscriberPool {
    /// Store a record and return its key.
    pub(crate) fn insert(&mut self, sub: Subscriber) -> SubscriberKey {
        if let Some(index) = self.free.pop() {
            let cell = &mut self.cells[index];
            debug_assert!(cell.sub.is_none());
            cell.sub = Some(sub);
            SubscriberKey { index, generation: cell.generation }
        } else {
            let index = self.cells.len();
            self.cells.push(Cell { generation: 0, sub: Some(sub) });
            SubscriberKey { index, generation: 0 }
        }
    }

    /// Remove the record at `index`, invalidating outstanding keys.
    ///
    /// # Panics
    ///
    /// Panics if the cell is already empty.
    pub(crate) fn remove(&mut self, index: usize) -> Subscriber {
        let cell = &mut self.cells[index];
        let sub = cell.sub.take().expect("removing an empty subscriber cell");
        cell.generation += 1;
        self.free.push(index);
        sub
    }

    /// Look up a key; stale generations miss.
    pub(crate) fn get(&self, key: SubscriberKey) -> Option<&Subscriber> {
        let cell = self.cells.get(key.index)?;
        if cell.generation != key.generation {
            return None;
        }
        cell.sub.as_ref()
    }

    /// Record at a known-live index.
    ///
    /// # Panics
    ///
    /// Panics on a dangling index.
    pub(crate) fn at(&self, index: usize) -> &Subscriber {
        self.cells[index].sub.as_ref().expect("dangling subscriber index")
    }

    /// Mutable record at a known-live index.
    ///
    /// # Panics
    ///
    /// Panics on a dangling index.
    pub(crate) fn at_mut(&mut self, index: usize) -> &mut Subscriber {
        self.cells[index].sub.as_mut().expect("dangling subscriber index")
    }

    /// Number of live records.
    pub(crate) fn len(&self) -> usize {
        self.cells.len() - self.free.len()
    }
}
