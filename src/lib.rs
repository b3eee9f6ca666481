//! # sparse-longmap
//!
//! A compact ordered map from `i64` keys to values.
//!
//! Keys live in one sorted array and values in a parallel one; lookups are a
//! binary search. Removal does not shift anything: it leaves a tombstone in
//! the value slot, and the arrays are compacted in a single pass the next time
//! an operation needs positions to mean "n-th live entry".
//!
//! ## Example
//!
//! ```rust
//! use sparse_longmap::{Put, SortedSparseMap};
//!
//! let mut map: SortedSparseMap<&str> = SortedSparseMap::new();
//! assert_eq!(map.put(5, "a"), Put::Inserted(0));
//! assert_eq!(map.put(1, "b"), Put::Inserted(0));
//! assert_eq!(map.put(5, "c"), Put::Updated(1));
//!
//! assert_eq!(map.remove(1), Some("b"));
//! assert_eq!(map.get(1), None);
//! assert_eq!(map.size(), 1);
//! assert_eq!(map.key_at(0), 5);
//! assert_eq!(map.value_at(0), &"c");
//! ```
//!
//! The map is not synchronized. Callers sharing it across threads must hold
//! their own lock across any sequence that has to be atomic (for example
//! `size()` followed by `key_at()`).

#![forbid(unsafe_code)]

use std::fmt;
use std::mem;

mod cursor;
mod error;

pub use cursor::{KeyCursor, ValueCursor};
pub use error::Error;

// =============================================================================
// Configuration
// =============================================================================

const MIN_SIZE_EXPONENT: u32 = 4;
const MAX_SIZE_EXPONENT: u32 = 32;
/// Bytes assumed to be eaten by the allocator header of every array.
const ALLOC_OVERHEAD: usize = 12;
const KEY_WIDTH: usize = mem::size_of::<i64>();
/// Initial capacity of maps created through [`SortedSparseMap::named`].
const DEFAULT_NAMED_CAPACITY: usize = 10;

// =============================================================================
// Capacity sizing
// =============================================================================

/// Smallest "ideal" byte size (`2^k - 12`) that holds `need` bytes.
///
/// Sizes past `2^31` are returned unchanged.
pub fn ideal_byte_size(need: usize) -> usize {
    for exp in MIN_SIZE_EXPONENT..MAX_SIZE_EXPONENT {
        let ideal = (1usize << exp) - ALLOC_OVERHEAD;
        if need <= ideal {
            return ideal;
        }
    }
    need
}

/// Number of `i64` slots to allocate for at least `need` entries.
///
/// Always `>= need`, and roughly doubles from one step to the next.
pub fn ideal_key_capacity(need: usize) -> usize {
    match need.checked_mul(KEY_WIDTH) {
        Some(bytes) => (ideal_byte_size(bytes) / KEY_WIDTH).max(need),
        None => need,
    }
}

// =============================================================================
// Binary search
// =============================================================================

/// Search `keys[..size]` (ascending) for `target`.
///
/// `Ok(index)` if found, otherwise `Err(insertion_point)`. This is the sign
/// encoded `-(insertion_point) - 1` of the classic array search, split into
/// the two cases.
pub fn search(keys: &[i64], size: usize, target: i64) -> Result<usize, usize> {
    let mut lo = 0usize;
    let mut hi = size;

    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let mid_val = keys[mid];

        if mid_val < target {
            lo = mid + 1;
        } else if mid_val > target {
            hi = mid;
        } else {
            return Ok(mid);
        }
    }

    Err(lo)
}

// =============================================================================
// Slots and put outcome
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
enum Slot<V> {
    /// Never used, or released by compaction or `clear`.
    Empty,
    /// Logically deleted; the key in the same position is kept for ordering.
    Tombstone,
    Occupied(V),
}

impl<V> Slot<V> {
    #[inline]
    fn as_value(&self) -> Option<&V> {
        match self {
            Slot::Occupied(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    fn is_tombstone(&self) -> bool {
        matches!(self, Slot::Tombstone)
    }
}

/// Outcome of [`SortedSparseMap::put`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Put {
    /// A new mapping was created at this index.
    Inserted(usize),
    /// An existing mapping at this index had its value replaced.
    Updated(usize),
}

impl Put {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Put::Inserted(index) | Put::Updated(index) => index,
        }
    }

    #[inline]
    pub fn is_inserted(self) -> bool {
        matches!(self, Put::Inserted(_))
    }

    /// Sign-encoded form: the index for an update, its bitwise complement for
    /// an insertion.
    pub fn encoded(self) -> isize {
        match self {
            Put::Updated(index) => index as isize,
            Put::Inserted(index) => !(index as isize),
        }
    }
}

// =============================================================================
// SortedSparseMap
// =============================================================================

/// Sorted-array map from `i64` keys to `V` with lazy removal.
///
/// Layout:
/// - `keys` / `values`: parallel backing arrays; their length is the capacity
/// - `size`: high-water mark of used slots, live and tombstoned
/// - `live`: count of occupied slots
/// - `has_tombstones`: dirty flag; set on removal, cleared by compaction
///
/// Keys in `[0, size)` are strictly ascending at all times, tombstones
/// included, so binary search stays valid between compactions.
#[derive(Clone)]
pub struct SortedSparseMap<V> {
    keys: Vec<i64>,
    values: Vec<Slot<V>>,
    size: usize,
    live: usize,
    has_tombstones: bool,
    debug_name: Option<String>,
}

impl<V> SortedSparseMap<V> {
    /// An empty map that allocates nothing until the first insertion.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// An empty map that can hold `capacity` entries without reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            0
        } else {
            ideal_key_capacity(capacity)
        };
        let mut values = Vec::with_capacity(capacity);
        values.resize_with(capacity, || Slot::Empty);
        Self {
            keys: vec![0; capacity],
            values,
            size: 0,
            live: 0,
            has_tombstones: false,
            debug_name: None,
        }
    }

    /// An empty map that traces every operation under `name` through `log`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_capacity(DEFAULT_NAMED_CAPACITY).with_debug_name(name)
    }

    /// Set the name used to tag trace output. An empty name disables tracing.
    pub fn with_debug_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.debug_name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn debug_name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }

    /// Number of live entries. Does not compact.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Length of the backing arrays.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    /// Whether removed entries may be waiting for compaction.
    ///
    /// Conservative: reviving a tombstone through `put` leaves the flag set
    /// until the next compacting call clears it.
    #[inline]
    pub fn has_tombstones(&self) -> bool {
        self.has_tombstones
    }

    /// Number of live entries, compacting first if needed.
    ///
    /// After this call, positions `0..size()` address live entries in key order.
    pub fn size(&mut self) -> usize {
        self.trace("BEFORE", format_args!("size()"));
        self.gc_if_dirty();
        self.trace(" AFTER", format_args!("size()"));
        self.size
    }

    // -------------------------------------------------------------------------
    // Lookup (never compacts)
    // -------------------------------------------------------------------------

    pub fn get(&self, key: i64) -> Option<&V> {
        self.trace("BEFORE", format_args!("get({key})"));
        let found = match search(&self.keys, self.size, key) {
            Ok(index) => self.values[index].as_value(),
            Err(_) => None,
        };
        self.trace(" AFTER", format_args!("get({key}) -> found={}", found.is_some()));
        found
    }

    pub fn get_or<'a>(&'a self, key: i64, default: &'a V) -> &'a V {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Map `key` to `value`, reporting where the entry ended up.
    ///
    /// `Updated` whenever the key already had a slot, including a tombstone
    /// under the same key; `Inserted` when a slot had to be claimed for it.
    ///
    /// The index is a position in the layout right after the call; it is
    /// only stable until the next removal is compacted away.
    pub fn put(&mut self, key: i64, value: V) -> Put {
        self.trace("BEFORE", format_args!("put({key})"));
        let (outcome, _) = self.put_entry(key, value);
        self.trace(" AFTER", format_args!("put({key}) -> {outcome:?}"));
        outcome
    }

    /// Map `key` to `value`, returning the previous value if there was one.
    pub fn insert(&mut self, key: i64, value: V) -> Option<V> {
        self.trace("BEFORE", format_args!("insert({key})"));
        let (_, old) = self.put_entry(key, value);
        self.trace(" AFTER", format_args!("insert({key})"));
        old
    }

    fn put_entry(&mut self, key: i64, value: V) -> (Put, Option<V>) {
        let mut index = match search(&self.keys, self.size, key) {
            Ok(index) => {
                return match mem::replace(&mut self.values[index], Slot::Occupied(value)) {
                    Slot::Occupied(old) => (Put::Updated(index), Some(old)),
                    _ => {
                        // Revived a tombstone left under the same key.
                        self.live += 1;
                        (Put::Updated(index), None)
                    }
                };
            }
            Err(index) => index,
        };

        if index < self.size && self.values[index].is_tombstone() {
            // keys[index - 1] < key < keys[index], so the slot can be taken over in place.
            self.keys[index] = key;
            self.values[index] = Slot::Occupied(value);
            self.live += 1;
            return (Put::Inserted(index), None);
        }

        if self.has_tombstones && self.size >= self.keys.len() {
            self.gc();
            // Compaction moved things around.
            index = search(&self.keys, self.size, key).unwrap_or_else(|insertion| insertion);
        }

        if self.size >= self.keys.len() {
            self.grow(self.size + 1);
        }

        if index < self.size {
            self.keys.copy_within(index..self.size, index + 1);
            // Slot `size` is empty; rotating brings it down to `index`.
            self.values[index..=self.size].rotate_right(1);
        }

        self.keys[index] = key;
        self.values[index] = Slot::Occupied(value);
        self.size += 1;
        self.live += 1;
        (Put::Inserted(index), None)
    }

    /// Insert assuming `key` is larger than every key present.
    ///
    /// O(1) amortized in that case; otherwise falls back to [`put`](Self::put).
    pub fn append(&mut self, key: i64, value: V) {
        if self.size != 0 && key <= self.keys[self.size - 1] {
            self.put(key, value);
            return;
        }

        self.trace("BEFORE", format_args!("append({key})"));

        if self.has_tombstones && self.size >= self.keys.len() {
            self.gc();
        }

        let pos = self.size;
        if pos >= self.keys.len() {
            self.grow(pos + 1);
        }

        self.keys[pos] = key;
        self.values[pos] = Slot::Occupied(value);
        self.size = pos + 1;
        self.live += 1;

        self.trace(" AFTER", format_args!("append({key})"));
    }

    /// Remove the mapping for `key`, returning its value.
    ///
    /// Leaves a tombstone; nothing is shifted.
    pub fn remove(&mut self, key: i64) -> Option<V> {
        self.trace("BEFORE", format_args!("remove({key})"));
        let removed = match search(&self.keys, self.size, key) {
            Ok(index) => self.tombstone(index),
            Err(_) => None,
        };
        self.trace(" AFTER", format_args!("remove({key})"));
        removed
    }

    /// Like [`remove`](Self::remove), discarding the value.
    pub fn delete(&mut self, key: i64) {
        self.remove(key);
    }

    /// Remove whatever lives at `index` in the current layout.
    ///
    /// Does not compact, so `index` refers to the layout as left by the last
    /// compacting call; `None` if that slot is already a tombstone.
    ///
    /// # Panics
    ///
    /// If `index` is not below the current size.
    pub fn remove_at(&mut self, index: usize) -> Option<V> {
        self.try_remove_at(index).unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_remove_at(&mut self, index: usize) -> Result<Option<V>, Error> {
        self.check_index(index)?;
        self.trace("BEFORE", format_args!("remove_at({index})"));
        let removed = self.tombstone(index);
        self.trace(" AFTER", format_args!("remove_at({index})"));
        Ok(removed)
    }

    fn tombstone(&mut self, index: usize) -> Option<V> {
        match mem::replace(&mut self.values[index], Slot::Tombstone) {
            Slot::Occupied(value) => {
                self.has_tombstones = true;
                self.live -= 1;
                Some(value)
            }
            other => {
                self.values[index] = other;
                None
            }
        }
    }

    /// Drop every entry. Capacity is kept.
    pub fn clear(&mut self) {
        self.trace("BEFORE", format_args!("clear()"));
        for slot in &mut self.values[..self.size] {
            *slot = Slot::Empty;
        }
        self.size = 0;
        self.live = 0;
        self.has_tombstones = false;
        self.trace(" AFTER", format_args!("clear()"));
    }

    // -------------------------------------------------------------------------
    // Positional access (compacts first)
    // -------------------------------------------------------------------------

    /// Key of the `index`-th live entry in ascending order.
    ///
    /// # Panics
    ///
    /// If `index >= size()`.
    pub fn key_at(&mut self, index: usize) -> i64 {
        self.try_key_at(index).unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_key_at(&mut self, index: usize) -> Result<i64, Error> {
        self.trace("BEFORE", format_args!("key_at({index})"));
        self.gc_if_dirty();
        self.check_index(index)?;
        let key = self.keys[index];
        self.trace(" AFTER", format_args!("key_at({index}) -> {key}"));
        Ok(key)
    }

    /// Value of the `index`-th live entry in ascending key order.
    ///
    /// # Panics
    ///
    /// If `index >= size()`.
    pub fn value_at(&mut self, index: usize) -> &V {
        self.try_value_at(index).unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_value_at(&mut self, index: usize) -> Result<&V, Error> {
        self.trace("BEFORE", format_args!("value_at({index})"));
        self.gc_if_dirty();
        self.check_index(index)?;
        self.trace(" AFTER", format_args!("value_at({index})"));
        let size = self.size;
        self.values[index]
            .as_value()
            .ok_or(Error::IndexOutOfBounds { index, size })
    }

    /// Replace the value of the `index`-th live entry.
    ///
    /// # Panics
    ///
    /// If `index >= size()`.
    pub fn set_value_at(&mut self, index: usize, value: V) {
        self.try_set_value_at(index, value)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_set_value_at(&mut self, index: usize, value: V) -> Result<(), Error> {
        self.trace("BEFORE", format_args!("set_value_at({index})"));
        self.gc_if_dirty();
        self.check_index(index)?;
        self.values[index] = Slot::Occupied(value);
        self.trace(" AFTER", format_args!("set_value_at({index})"));
        Ok(())
    }

    /// Position of `key` among live entries, or `Err(insertion_point)`.
    pub fn index_of_key(&mut self, key: i64) -> Result<usize, usize> {
        self.trace("BEFORE", format_args!("index_of_key({key})"));
        self.gc_if_dirty();
        let found = search(&self.keys, self.size, key);
        self.trace(" AFTER", format_args!("index_of_key({key}) -> {found:?}"));
        found
    }

    /// Position of the first live entry equal to `value`.
    ///
    /// Linear scan; several keys may map to equal values.
    pub fn index_of_value(&mut self, value: &V) -> Option<usize>
    where
        V: PartialEq,
    {
        self.trace("BEFORE", format_args!("index_of_value()"));
        self.gc_if_dirty();
        let found = self.values[..self.size]
            .iter()
            .position(|slot| slot.as_value() == Some(value));
        self.trace(" AFTER", format_args!("index_of_value() -> {found:?}"));
        found
    }

    fn check_index(&self, index: usize) -> Result<(), Error> {
        if index < self.size {
            Ok(())
        } else {
            Err(Error::IndexOutOfBounds {
                index,
                size: self.size,
            })
        }
    }

    // -------------------------------------------------------------------------
    // Growth and compaction
    // -------------------------------------------------------------------------

    fn grow(&mut self, need: usize) {
        let capacity = ideal_key_capacity(need);
        if let Some(name) = &self.debug_name {
            log::debug!("#{name} grow {} -> {capacity}", self.keys.len());
        }
        self.keys.resize(capacity, 0);
        self.values.resize_with(capacity, || Slot::Empty);
    }

    #[inline]
    fn gc_if_dirty(&mut self) {
        if self.has_tombstones {
            self.gc();
        }
    }

    /// Squeeze tombstones out of `[0, size)`, keeping order.
    fn gc(&mut self) {
        let before = self.size;
        let mut out = 0usize;

        for i in 0..self.size {
            match self.values[i] {
                Slot::Occupied(_) => {
                    if i != out {
                        self.keys[out] = self.keys[i];
                        // `out` already holds Empty.
                        self.values.swap(out, i);
                    }
                    out += 1;
                }
                Slot::Tombstone | Slot::Empty => self.values[i] = Slot::Empty,
            }
        }

        debug_assert_eq!(out, self.live);
        self.has_tombstones = false;
        self.size = out;

        if let Some(name) = &self.debug_name {
            log::debug!("#{name} gc {before} -> {out}");
        }
    }

    // -------------------------------------------------------------------------
    // Iteration
    // -------------------------------------------------------------------------

    /// Live entries in ascending key order. Does not compact.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            keys: self.keys[..self.size].iter(),
            values: self.values[..self.size].iter(),
            remaining: self.live,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, value)| value)
    }

    /// Compacting cursor over keys that supports removal while iterating.
    pub fn iterate_keys(&mut self) -> KeyCursor<'_, V> {
        self.trace("", format_args!("iterate_keys()"));
        KeyCursor::new(self)
    }

    /// Compacting cursor over values that supports removal while iterating.
    pub fn iterate_values(&mut self) -> ValueCursor<'_, V> {
        self.trace("", format_args!("iterate_values()"));
        ValueCursor::new(self)
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    /// Full internal state with values rendered by type name only.
    pub fn to_debug_string_simple(&self) -> String {
        Dump {
            map: self,
            render: |_, f| f.write_str(std::any::type_name::<V>()),
        }
        .to_string()
    }

    /// Full internal state: size, tombstone flag, every key slot and every
    /// value slot, including unused capacity.
    pub fn to_debug_string(&self) -> String
    where
        V: fmt::Debug,
    {
        Dump {
            map: self,
            render: |value, f| write!(f, "{value:?}"),
        }
        .to_string()
    }

    #[inline]
    fn trace(&self, stage: &str, op: fmt::Arguments<'_>) {
        if let Some(name) = &self.debug_name {
            if log::log_enabled!(log::Level::Trace) {
                log::trace!("#{name} {stage} {op}: {}", self.to_debug_string_simple());
            }
        }
    }
}

impl<V> Default for SortedSparseMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for SortedSparseMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V: fmt::Display> fmt::Display for SortedSparseMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}")
    }
}

impl<V> Extend<(i64, V)> for SortedSparseMap<V> {
    fn extend<I: IntoIterator<Item = (i64, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.append(key, value);
        }
    }
}

impl<V> FromIterator<(i64, V)> for SortedSparseMap<V> {
    fn from_iter<I: IntoIterator<Item = (i64, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<'a, V> IntoIterator for &'a SortedSparseMap<V> {
    type Item = (i64, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

struct Dump<'a, V> {
    map: &'a SortedSparseMap<V>,
    render: fn(&V, &mut fmt::Formatter<'_>) -> fmt::Result,
}

impl<V> fmt::Display for Dump<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.map;
        write!(f, "\n{{")?;
        write!(f, "\n\tsize={},", map.size)?;
        write!(f, "\n\thas_tombstones={},", map.has_tombstones)?;
        write!(f, "\n\tkeys=\n\t[")?;
        for (i, key) in map.keys.iter().enumerate() {
            if i != 0 {
                f.write_str(",")?;
            }
            write!(f, "\n\t\t{key}")?;
        }
        write!(f, "\n\t],")?;
        write!(f, "\n\tvalues=\n\t[")?;
        for (i, slot) in map.values.iter().enumerate() {
            if i != 0 {
                f.write_str(",")?;
            }
            f.write_str("\n\t\t")?;
            match slot {
                Slot::Empty => f.write_str("EMPTY")?,
                Slot::Tombstone => f.write_str("DELETED")?,
                Slot::Occupied(value) => (self.render)(value, f)?,
            }
        }
        write!(f, "\n\t]")?;
        write!(f, "\n}}")
    }
}

/// Borrowing iterator over live entries, skipping tombstones.
pub struct Iter<'a, V> {
    keys: std::slice::Iter<'a, i64>,
    values: std::slice::Iter<'a, Slot<V>>,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (i64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for (key, slot) in (&mut self.keys).zip(&mut self.values) {
            if let Slot::Occupied(value) = slot {
                self.remaining -= 1;
                return Some((*key, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}


#[cfg(test)]
mod proptests;
