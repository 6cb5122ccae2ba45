use indexmap::IndexMap;
use slab::Slab;

use super::*;

/// Storage for streams.
///
/// Streams are kept in a slab and addressed through [`StreamRef`]. Each slot
/// carries a generation so a handle to a stream whose slot was reused is
/// detected instead of silently aliasing the new occupant.
#[derive(Debug)]
pub(crate) struct Store {
    slab: Slab<Entry>,
    ids: IndexMap<StreamId, usize>,
    next_generation: u64,
}

#[derive(Debug)]
struct Entry {
    generation: u64,
    stream: Stream,
}

/// Handle to a stream owned by a [`Session`](crate::Session).
///
/// A handle stays valid until the stream's final `Closed` event has been
/// observed, or until the stream is cancelled or reset by its owner.
/// Operations through a stale handle fail with
/// [`Error::StreamClosed`](crate::Error::StreamClosed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamRef {
    index: usize,
    generation: u64,
}

impl Store {
    pub fn new() -> Self {
        Store {
            slab: Slab::new(),
            ids: IndexMap::new(),
            next_generation: 0,
        }
    }

    pub fn insert(&mut self, stream: Stream) -> StreamRef {
        let generation = self.next_generation;
        self.next_generation += 1;

        let index = self.slab.insert(Entry { generation, stream });
        StreamRef { index, generation }
    }

    pub fn get(&self, key: StreamRef) -> Option<&Stream> {
        match self.slab.get(key.index) {
            Some(entry) if entry.generation == key.generation => Some(&entry.stream),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: StreamRef) -> Option<&mut Stream> {
        match self.slab.get_mut(key.index) {
            Some(entry) if entry.generation == key.generation => Some(&mut entry.stream),
            _ => None,
        }
    }

    pub fn contains(&self, key: StreamRef) -> bool {
        self.get(key).is_some()
    }

    pub fn find_by_id(&self, id: StreamId) -> Option<StreamRef> {
        let index = *self.ids.get(&id)?;
        let entry = self.slab.get(index)?;
        Some(StreamRef {
            index,
            generation: entry.generation,
        })
    }

    /// Bind `id` to the stream. The stream must not already have one.
    pub fn set_id(&mut self, key: StreamRef, id: StreamId) {
        if let Some(stream) = self.get_mut(key) {
            debug_assert!(stream.id.is_zero());
            stream.id = id;
            self.ids.insert(id, key.index);
        }
    }

    pub fn remove_id(&mut self, id: StreamId) {
        self.ids.swap_remove(&id);
    }

    /// Free the slot. Any id mapping must already be gone.
    pub fn remove(&mut self, key: StreamRef) -> Option<Stream> {
        if !self.contains(key) {
            return None;
        }

        let entry = self.slab.remove(key.index);
        debug_assert!(entry.stream.id.is_zero() || !self.ids.contains_key(&entry.stream.id));
        Some(entry.stream)
    }

    /// A snapshot of every stored stream.
    ///
    /// Handlers that close streams while walking the set iterate over the
    /// snapshot, so the store itself is never mutated under an iterator.
    pub fn refs(&self) -> Vec<StreamRef> {
        self.slab
            .iter()
            .map(|(index, entry)| StreamRef {
                index,
                generation: entry.generation,
            })
            .collect()
    }

    /// Streams with an id, in ascending id order.
    pub fn refs_by_id(&self) -> Vec<(StreamId, StreamRef)> {
        let mut ids: Vec<(StreamId, StreamRef)> = self
            .ids
            .iter()
            .filter_map(|(id, index)| {
                let entry = self.slab.get(*index)?;
                Some((
                    *id,
                    StreamRef {
                        index: *index,
                        generation: entry.generation,
                    },
                ))
            })
            .collect();
        ids.sort_by_key(|(id, _)| *id);
        ids
    }

    #[cfg(test)]
    pub fn num_ids(&self) -> usize {
        self.ids.len()
    }
}
