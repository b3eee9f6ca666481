//! Cursors that re-enter the map on every step.
//!
//! Each step asks the map for its current size and then for the entry at the
//! cursor position, and both calls compact pending tombstones. Removing
//! through the cursor plants a tombstone behind the position and steps back
//! by one, so the next compaction slides the following entry under the cursor.
//!
//! A cursor holds the map mutably for its whole lifetime, which makes its own
//! `remove` the only mutation possible while it is alive.

use crate::{Error, SortedSparseMap};

/// Forward, single-pass cursor over live keys. See [`SortedSparseMap::iterate_keys`].
pub struct KeyCursor<'a, V> {
    map: &'a mut SortedSparseMap<V>,
    index: usize,
    can_remove: bool,
}

impl<'a, V> KeyCursor<'a, V> {
    pub(crate) fn new(map: &'a mut SortedSparseMap<V>) -> Self {
        Self {
            map,
            index: 0,
            can_remove: false,
        }
    }

    /// Compacts the map.
    pub fn has_next(&mut self) -> bool {
        self.index < self.map.size()
    }

    pub fn try_next(&mut self) -> Result<i64, Error> {
        if !self.has_next() {
            return Err(Error::Exhausted);
        }
        let key = self.map.try_key_at(self.index)?;
        self.index += 1;
        self.can_remove = true;
        Ok(key)
    }

    /// Remove the entry last returned by `next`, handing back its value.
    ///
    /// # Panics
    ///
    /// If `next` has not been called since the last removal.
    pub fn remove(&mut self) -> V {
        self.try_remove().unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_remove(&mut self) -> Result<V, Error> {
        remove_previous(self.map, &mut self.index, &mut self.can_remove)
    }
}

impl<V> Iterator for KeyCursor<'_, V> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        self.try_next().ok()
    }
}

/// Forward, single-pass cursor over live values. See [`SortedSparseMap::iterate_values`].
///
/// Values are lent out one step at a time, so this is not an [`Iterator`].
pub struct ValueCursor<'a, V> {
    map: &'a mut SortedSparseMap<V>,
    index: usize,
    can_remove: bool,
}

impl<'a, V> ValueCursor<'a, V> {
    pub(crate) fn new(map: &'a mut SortedSparseMap<V>) -> Self {
        Self {
            map,
            index: 0,
            can_remove: false,
        }
    }

    /// Compacts the map.
    pub fn has_next(&mut self) -> bool {
        self.index < self.map.size()
    }

    pub fn next_value(&mut self) -> Option<&V> {
        self.try_next().ok()
    }

    pub fn try_next(&mut self) -> Result<&V, Error> {
        if !self.has_next() {
            return Err(Error::Exhausted);
        }
        let index = self.index;
        self.index += 1;
        self.can_remove = true;
        self.map.try_value_at(index)
    }

    /// Remove the entry last returned by `next_value`, handing back its value.
    ///
    /// # Panics
    ///
    /// If `next_value` has not been called since the last removal.
    pub fn remove(&mut self) -> V {
        self.try_remove().unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_remove(&mut self) -> Result<V, Error> {
        remove_previous(self.map, &mut self.index, &mut self.can_remove)
    }
}

fn remove_previous<V>(
    map: &mut SortedSparseMap<V>,
    index: &mut usize,
    can_remove: &mut bool,
) -> Result<V, Error> {
    if !*can_remove {
        return Err(Error::IteratorState);
    }
    *can_remove = false;
    *index -= 1;
    map.try_remove_at(*index)?.ok_or(Error::IteratorState)
}
