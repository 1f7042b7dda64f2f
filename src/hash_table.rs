//! The open-addressing table.
//!
//! Storage is a single allocation holding the control bytes (`capacity`
//! slots plus [`GROUP_SIZE`] mirrored bytes) followed by the entry array.
//! Probing is linear from `hash % capacity`, reading control bytes a group at
//! a time but applying the per-slot rules in slot order.

use alloc::alloc::dealloc;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::string::ToString;
use core::alloc::Layout;
use core::borrow::Borrow;
use core::fmt::Debug;
use core::fmt::Display;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use core::slice;

use crate::control::DELETED;
use crate::control::EMPTY;
use crate::control::GROUP_SIZE;
use crate::control::Group;
use crate::control::is_full;
use crate::error::TryReserveError;
use crate::hashing::KeyHash;
use crate::hashing::fingerprint;

/// Capacity used when the caller passes a capacity hint of zero.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Numerator and denominator of the 0.75 load factor.
const LOAD_FACTOR: (u128, u128) = (3, 4);

const GROWTH_FACTOR: usize = 2;

#[inline(always)]
fn target_load_factor(capacity: usize) -> usize {
    ((capacity as u128 * LOAD_FACTOR.0) / LOAD_FACTOR.1) as usize
}

/// Smallest aligned capacity whose load limit admits `len` entries.
#[inline]
fn capacity_for(len: usize) -> Option<usize> {
    let raw = (len as u128 * LOAD_FACTOR.1).div_ceil(LOAD_FACTOR.0);
    let raw = usize::try_from(raw).ok()?;
    raw.max(GROUP_SIZE).checked_next_multiple_of(GROUP_SIZE)
}

/// A stored key/value pair with the hash computed when it was inserted.
struct Entry<K, V> {
    hash: u64,
    key: K,
    value: V,
}

#[derive(Debug)]
struct DataLayout {
    layout: Layout,
    entries_offset: usize,
}

impl DataLayout {
    fn new<K, V>(capacity: usize) -> Result<Self, TryReserveError> {
        let ctrl_len = capacity
            .checked_add(GROUP_SIZE)
            .ok_or(TryReserveError::CapacityOverflow)?;
        let ctrl_layout =
            Layout::array::<u8>(ctrl_len).map_err(|_| TryReserveError::CapacityOverflow)?;
        let entries_layout = Layout::array::<Entry<K, V>>(capacity)
            .map_err(|_| TryReserveError::CapacityOverflow)?;

        let (layout, entries_offset) = ctrl_layout
            .extend(entries_layout)
            .map_err(|_| TryReserveError::CapacityOverflow)?;

        Ok(DataLayout {
            layout,
            entries_offset,
        })
    }

    /// Allocates storage for `capacity` slots with every control byte set to
    /// [`EMPTY`].
    fn allocate<K, V>(capacity: usize) -> Result<(Self, NonNull<u8>), TryReserveError> {
        let layout = Self::new::<K, V>(capacity)?;

        // SAFETY: The layout always covers at least GROUP_SIZE control bytes, so
        // its size is non-zero. Only the control bytes are initialized here;
        // entries stay uninitialized until their control byte says otherwise.
        unsafe {
            let raw_alloc = alloc::alloc::alloc(layout.layout);
            let Some(alloc) = NonNull::new(raw_alloc) else {
                return Err(TryReserveError::AllocError {
                    layout: layout.layout,
                });
            };
            core::ptr::write_bytes(raw_alloc, EMPTY, capacity + GROUP_SIZE);

            Ok((layout, alloc))
        }
    }
}

/// Debug statistics for hash table analysis.
///
/// Available in tests or with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of live entries
    pub populated: usize,
    /// Number of slots
    pub capacity: usize,
    /// Live entries allowed before the next insert grows the table
    pub max_load: usize,
    /// Slots holding a tombstone
    pub tombstones: usize,
    /// Slots that are still empty
    pub empty_slots: usize,
    /// populated / capacity
    pub load_factor: f64,
    /// tombstones / capacity
    pub tombstone_ratio: f64,
    /// Whether the trailing control bytes match the first group
    pub mirror_consistent: bool,
    /// Bytes in the table's allocation
    pub total_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} slots ({:.2}% load factor, grows past {})",
            self.populated,
            self.capacity,
            self.load_factor * 100.0,
            self.max_load
        );
        println!(
            "Tombstones: {} ({:.2}%), empty: {}",
            self.tombstones,
            self.tombstone_ratio * 100.0,
            self.empty_slots
        );
        println!("Mirror consistent: {}", self.mirror_consistent);
        println!("Total Allocated: {} bytes", self.total_bytes);
    }
}

/// Distance, in slots, of each live entry from its home slot.
///
/// Available in tests or with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHistogram {
    /// `buckets[d]` counts entries stored `d` slots past their home slot.
    pub buckets: alloc::vec::Vec<usize>,
}

#[cfg(any(test, feature = "stats"))]
impl ProbeHistogram {
    /// Longest probe distance of any live entry.
    pub fn max_probe(&self) -> usize {
        self.buckets.len().saturating_sub(1)
    }

    /// Mean probe distance over all live entries.
    pub fn mean(&self) -> f64 {
        let total: usize = self.buckets.iter().sum();
        if total == 0 {
            return 0.0;
        }
        let weighted: usize = self
            .buckets
            .iter()
            .enumerate()
            .map(|(distance, count)| distance * count)
            .sum();
        weighted as f64 / total as f64
    }

    /// Pretty-prints the histogram as a horizontal bar chart.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = self.buckets.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("Probe histogram: empty");
            return;
        }

        const WIDTH: usize = 50;
        println!("Probe length histogram (mean {:.2}):", self.mean());
        for (distance, &count) in self.buckets.iter().enumerate() {
            let bar = (count * WIDTH).div_ceil(max);
            println!(
                "{distance:>4} | {:<width$} {count}",
                "#".repeat(bar),
                width = WIDTH
            );
        }
    }
}

/// An open-addressing hash table with control-byte fingerprints and
/// tombstone deletion.
///
/// `HashTable<K, V>` maps keys implementing [`KeyHash`] to values. Each slot
/// carries one control byte: [`EMPTY`], [`DELETED`], or a 7-bit fingerprint
/// of the key's hash, which rejects most mismatching slots before the cached
/// hash and the key itself are compared.
///
/// The table grows to twice its capacity before an insert would take it past
/// a 0.75 load factor. Removals leave tombstones, which are reused by later
/// inserts and purged when the table is rebuilt.
///
/// ## Performance Characteristics
///
/// - **Memory**: 1 control byte per slot plus 16 bytes of mirrored padding,
///   plus the size of `(K, V)` plus a u64 for the cached hash per slot.
/// - **Worst case**: a lookup or insert probes every slot once; a growing
///   insert re-inserts every live entry.
///
/// ## Example
///
/// ```rust
/// use ctrl_table::HashTable;
///
/// let mut table = HashTable::with_capacity(16);
/// table.put("alice", 31);
/// table.put("bob", 27);
///
/// assert_eq!(table.get("alice"), Some(&31));
/// assert!(table.remove("bob"));
/// assert_eq!(table.get("bob"), None);
/// assert_eq!(table.len(), 1);
/// ```
pub struct HashTable<K, V> {
    layout: DataLayout,
    alloc: NonNull<u8>,

    capacity: usize,
    populated: usize,
    tombstones: usize,
    max_pop: usize,

    _phantom: PhantomData<Entry<K, V>>,
}

// SAFETY: The table owns its keys and values exclusively; the raw allocation
// is never shared between tables.
unsafe impl<K: Send, V: Send> Send for HashTable<K, V> {}

// SAFETY: Shared references only permit reads of the keys and values.
unsafe impl<K: Sync, V: Sync> Sync for HashTable<K, V> {}

enum Probe {
    /// The key lives in this slot.
    Found(usize),
    /// The key is absent; this is where it should land.
    Vacant(usize),
    /// Every slot holds a different live key.
    Saturated,
}

impl<K, V> Debug for HashTable<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> Clone for HashTable<K, V>
where
    K: Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        let (layout, alloc) =
            DataLayout::allocate::<K, V>(self.capacity).unwrap_or_else(|err| err.raise());
        let mut new_table = Self {
            layout,
            alloc,
            capacity: self.capacity,
            populated: 0,
            tombstones: 0,
            max_pop: self.max_pop,
            _phantom: PhantomData,
        };

        // Slots keep their positions, so no key is rehashed. A control byte is
        // only copied once its entry is written, which keeps `new_table`
        // droppable if a clone panics.
        for (index, (&tag, entry)) in self
            .ctrl()
            .iter()
            .zip(self.entries())
            .enumerate()
        {
            if is_full(tag) {
                // SAFETY: Full control bytes mark initialized entries.
                let entry = unsafe { entry.assume_init_ref() };
                new_table.entries_mut()[index].write(Entry {
                    hash: entry.hash,
                    key: entry.key.clone(),
                    value: entry.value.clone(),
                });
                new_table.set_ctrl(index, tag);
                new_table.populated += 1;
            } else if tag == DELETED {
                new_table.set_ctrl(index, DELETED);
                new_table.tombstones += 1;
            }
        }

        debug_assert_eq!(new_table.populated, self.populated);
        new_table
    }
}

impl<K, V> Drop for HashTable<K, V> {
    fn drop(&mut self) {
        self.drop_entries();

        // SAFETY: `alloc` was allocated with `layout` and is not used again.
        unsafe {
            dealloc(self.alloc.as_ptr(), self.layout.layout);
        }
    }
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates a table with [`DEFAULT_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a table with at least `capacity` slots.
    ///
    /// The slot count is rounded up to the next multiple of 16. A hint of zero
    /// selects [`DEFAULT_CAPACITY`]. Note that the table grows once it is
    /// three quarters full, so `capacity` slots hold `capacity * 3 / 4`
    /// entries without reallocating.
    ///
    /// # Panics
    ///
    /// Panics if the rounded capacity overflows or the allocation layout is
    /// invalid.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ctrl_table::HashTable;
    /// #
    /// let table: HashTable<u64, u64> = HashTable::with_capacity(100);
    /// assert_eq!(table.capacity(), 112);
    ///
    /// let table: HashTable<u64, u64> = HashTable::with_capacity(0);
    /// assert_eq!(table.capacity(), 1024);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
                .checked_next_multiple_of(GROUP_SIZE)
                .unwrap_or_else(|| TryReserveError::CapacityOverflow.raise())
        };

        let (layout, alloc) =
            DataLayout::allocate::<K, V>(capacity).unwrap_or_else(|err| err.raise());

        Self {
            layout,
            alloc,
            capacity,
            populated: 0,
            tombstones: 0,
            max_pop: target_load_factor(capacity),
            _phantom: PhantomData,
        }
    }

    #[inline(always)]
    fn ctrl(&self) -> &[u8] {
        // SAFETY: The allocation starts with `capacity + GROUP_SIZE` initialized
        // control bytes.
        unsafe { slice::from_raw_parts(self.alloc.as_ptr(), self.capacity + GROUP_SIZE) }
    }

    #[inline(always)]
    fn entries(&self) -> &[MaybeUninit<Entry<K, V>>] {
        // SAFETY: The entry array of `capacity` slots starts at `entries_offset`,
        // which the layout aligns for `Entry<K, V>`.
        unsafe {
            slice::from_raw_parts(
                self.alloc.as_ptr().add(self.layout.entries_offset).cast(),
                self.capacity,
            )
        }
    }

    #[inline(always)]
    fn entries_mut(&mut self) -> &mut [MaybeUninit<Entry<K, V>>] {
        self.split_mut().1
    }

    /// Borrows the control bytes and the entries at the same time. The two
    /// regions of the allocation never overlap.
    #[inline(always)]
    fn split_mut(&mut self) -> (&mut [u8], &mut [MaybeUninit<Entry<K, V>>]) {
        // SAFETY: See `ctrl` and `entries`; the regions are disjoint, and the
        // returned borrows are tied to `&mut self`.
        unsafe {
            (
                slice::from_raw_parts_mut(self.alloc.as_ptr(), self.capacity + GROUP_SIZE),
                slice::from_raw_parts_mut(
                    self.alloc.as_ptr().add(self.layout.entries_offset).cast(),
                    self.capacity,
                ),
            )
        }
    }

    /// Writes a control byte, keeping the mirrored padding in sync.
    #[inline(always)]
    fn set_ctrl(&mut self, index: usize, tag: u8) {
        let capacity = self.capacity;
        let ctrl = self.split_mut().0;
        ctrl[index] = tag;
        if index < GROUP_SIZE {
            ctrl[capacity + index] = tag;
        }
    }

    #[inline(always)]
    fn home_index(&self, hash: u64) -> usize {
        (hash % self.capacity as u64) as usize
    }

    #[inline(always)]
    fn wrap(&self, index: usize) -> usize {
        if index >= self.capacity {
            index - self.capacity
        } else {
            index
        }
    }

    /// Compares the entry in a full slot against a hash and key.
    ///
    /// # Safety
    ///
    /// `index` must be below `capacity` and its control byte must be a
    /// fingerprint.
    #[inline(always)]
    unsafe fn entry_matches<Q>(&self, index: usize, hash: u64, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        // SAFETY: Caller guarantees the slot is in bounds and initialized.
        let entry = unsafe { self.entries().get_unchecked(index).assume_init_ref() };
        entry.hash == hash && entry.key.borrow() == key
    }

    /// Probes for `key` in lookup/removal mode.
    fn find_index<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let tag = fingerprint(hash);
        let ctrl = self.ctrl().as_ptr();
        let mut pos = self.home_index(hash);
        let mut scanned = 0;

        while scanned < self.capacity {
            // SAFETY: `pos < capacity` and the control array extends GROUP_SIZE
            // bytes past `capacity`.
            let group = unsafe { Group::load(ctrl.add(pos)) };
            // The final group may reach slots already visited at the start.
            let window = (self.capacity - scanned).min(GROUP_SIZE);
            let empty = group.match_empty().below(window).lowest_set_bit();
            let limit = empty.unwrap_or(window);

            for bit in group.match_byte(tag).below(limit) {
                let index = self.wrap(pos + bit);
                // SAFETY: `index < capacity` and it holds a fingerprint.
                if unsafe { self.entry_matches(index, hash, key) } {
                    return Some(index);
                }
            }

            if empty.is_some() {
                return None;
            }

            scanned += window;
            pos = self.wrap(pos + window);
        }

        None
    }

    /// Probes for `key` in insertion mode.
    ///
    /// Tombstones are remembered but never stop the scan: a live copy of the
    /// key may sit past them. The earliest tombstone wins over the empty slot
    /// that ends the scan.
    fn find_insert_slot(&self, hash: u64, key: &K) -> Probe
    where
        K: Eq,
    {
        let tag = fingerprint(hash);
        let ctrl = self.ctrl().as_ptr();
        let mut pos = self.home_index(hash);
        let mut scanned = 0;
        let mut first_deleted = None;

        while scanned < self.capacity {
            // SAFETY: `pos < capacity` and the control array extends GROUP_SIZE
            // bytes past `capacity`.
            let group = unsafe { Group::load(ctrl.add(pos)) };
            let window = (self.capacity - scanned).min(GROUP_SIZE);
            let empty = group.match_empty().below(window).lowest_set_bit();
            let limit = empty.unwrap_or(window);

            for bit in group.match_byte(tag).below(limit) {
                let index = self.wrap(pos + bit);
                // SAFETY: `index < capacity` and it holds a fingerprint.
                if unsafe { self.entry_matches(index, hash, key) } {
                    return Probe::Found(index);
                }
            }

            if first_deleted.is_none() {
                first_deleted = group
                    .match_deleted()
                    .below(limit)
                    .lowest_set_bit()
                    .map(|bit| self.wrap(pos + bit));
            }

            if let Some(bit) = empty {
                return Probe::Vacant(first_deleted.unwrap_or(self.wrap(pos + bit)));
            }

            scanned += window;
            pos = self.wrap(pos + window);
        }

        first_deleted.map_or(Probe::Saturated, Probe::Vacant)
    }

    /// Stores a new entry in a slot that is empty or a tombstone.
    ///
    /// # Safety
    ///
    /// `index` must be below `capacity` and must not hold a live entry.
    #[inline]
    unsafe fn occupy(&mut self, index: usize, tag: u8, entry: Entry<K, V>) {
        debug_assert!(!is_full(self.ctrl()[index]));
        if self.ctrl()[index] == DELETED {
            self.tombstones -= 1;
        }
        self.entries_mut()[index].write(entry);
        self.set_ctrl(index, tag);
        self.populated += 1;
    }

    /// Moves the entry out of a full slot and leaves a tombstone.
    ///
    /// # Safety
    ///
    /// `index` must be below `capacity` and must hold a live entry.
    #[inline]
    unsafe fn vacate(&mut self, index: usize) -> Entry<K, V> {
        debug_assert!(is_full(self.ctrl()[index]));
        self.set_ctrl(index, DELETED);
        self.populated -= 1;
        self.tombstones += 1;
        // SAFETY: Caller guarantees the slot was full; its control byte now says
        // otherwise, so the entry is read exactly once.
        unsafe { self.entries().get_unchecked(index).assume_init_read() }
    }

    /// Removes the next live entry at or after `*cursor`.
    fn vacate_next(&mut self, cursor: &mut usize) -> Option<(K, V)> {
        while *cursor < self.capacity {
            let index = *cursor;
            *cursor += 1;
            if is_full(self.ctrl()[index]) {
                // SAFETY: The slot is in bounds and full.
                let entry = unsafe { self.vacate(index) };
                return Some((entry.key, entry.value));
            }
        }
        None
    }

    fn drop_entries(&mut self) {
        if !mem::needs_drop::<Entry<K, V>>() || self.populated == 0 {
            return;
        }

        let (ctrl, entries) = self.split_mut();
        for (tag, entry) in ctrl.iter().zip(entries.iter_mut()) {
            if is_full(*tag) {
                // SAFETY: Full control bytes mark initialized entries, and the
                // caller resets or frees the control bytes afterwards.
                unsafe { entry.assume_init_drop() };
            }
        }
    }

    /// Returns the number of live entries.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ctrl_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(16);
    /// assert_eq!(table.len(), 0);
    ///
    /// table.put(1u64, "one");
    /// table.put(1u64, "uno");
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of slots. Always a multiple of 16.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of tombstones left by removals since the table was
    /// last rebuilt or cleared.
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Removes all entries, keeping the allocated capacity.
    ///
    /// Every control byte goes back to [`EMPTY`], so tombstones are discarded
    /// too.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ctrl_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(32);
    /// table.put(1u32, 'a');
    /// table.put(2u32, 'b');
    /// table.remove(&2);
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.tombstones(), 0);
    /// assert_eq!(table.capacity(), 32);
    /// ```
    pub fn clear(&mut self) {
        crate::trace_event!(
            capacity = self.capacity,
            populated = self.populated,
            tombstones = self.tombstones,
            "clearing table"
        );

        self.drop_entries();
        self.split_mut().0.fill(EMPTY);
        self.populated = 0;
        self.tombstones = 0;
    }

    /// Returns an iterator over `(&K, &V)` pairs in slot order.
    ///
    /// The order depends on hashes and capacity and is not meaningful.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.ctrl().iter().zip(self.entries().iter()),
            remaining: self.populated,
        }
    }

    /// Returns an iterator over `(&K, &mut V)` pairs in slot order.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let remaining = self.populated;
        let (ctrl, entries) = self.split_mut();
        IterMut {
            inner: ctrl.iter().zip(entries.iter_mut()),
            remaining,
        }
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over the values.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, value)| value)
    }

    /// Returns an iterator over mutable references to the values.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> + '_ {
        self.iter_mut().map(|(_, value)| value)
    }

    /// Removes and yields every entry.
    ///
    /// When the iterator is dropped the table is cleared, including entries
    /// that were not yet yielded. Capacity is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ctrl_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(16);
    /// table.put(1u8, 10);
    /// table.put(2u8, 20);
    ///
    /// let mut drained: Vec<(u8, i32)> = table.drain().collect();
    /// drained.sort();
    /// assert_eq!(drained, [(1, 10), (2, 20)]);
    /// assert!(table.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            table: self,
            cursor: 0,
        }
    }

    /// Exports every live entry keyed by the `Display` rendering of its key.
    ///
    /// Intended for diagnostics and tests. Distinct keys that render to the
    /// same text collapse into one map entry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ctrl_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(16);
    /// table.put(7i32, "seven");
    /// table.put(-1i32, "minus one");
    ///
    /// let export = table.export_by_display();
    /// assert_eq!(export.get("7"), Some(&&"seven"));
    /// assert_eq!(export.get("-1"), Some(&&"minus one"));
    /// ```
    pub fn export_by_display(&self) -> BTreeMap<String, &V>
    where
        K: Display,
    {
        self.iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    /// Returns the control bytes, including the mirrored padding.
    ///
    /// Available in tests or with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn control_bytes(&self) -> &[u8] {
        self.ctrl()
    }

    /// Computes the probe-distance histogram of the live entries.
    ///
    /// Available in tests or with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> ProbeHistogram {
        let mut buckets = alloc::vec::Vec::new();
        for (index, (&tag, entry)) in self.ctrl().iter().zip(self.entries()).enumerate() {
            if !is_full(tag) {
                continue;
            }
            // SAFETY: Full control bytes mark initialized entries.
            let hash = unsafe { entry.assume_init_ref().hash };
            let home = self.home_index(hash);
            let distance = (index + self.capacity - home) % self.capacity;
            if buckets.len() <= distance {
                buckets.resize(distance + 1, 0);
            }
            buckets[distance] += 1;
        }
        ProbeHistogram { buckets }
    }

    /// Returns occupancy and memory statistics.
    ///
    /// Available in tests or with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let ctrl = self.ctrl();
        let empty_slots = ctrl[..self.capacity]
            .iter()
            .filter(|&&tag| tag == EMPTY)
            .count();
        let mirror_consistent = ctrl[..GROUP_SIZE] == ctrl[self.capacity..];

        DebugStats {
            populated: self.populated,
            capacity: self.capacity,
            max_load: self.max_pop,
            tombstones: self.tombstones,
            empty_slots,
            load_factor: self.populated as f64 / self.capacity as f64,
            tombstone_ratio: self.tombstones as f64 / self.capacity as f64,
            mirror_consistent,
            total_bytes: self.layout.layout.size(),
        }
    }
}

impl<K, V> HashTable<K, V>
where
    K: KeyHash,
{
    /// Inserts a key/value pair, returning the previous value if the key was
    /// already present.
    ///
    /// If one more entry would take the table past its load factor, the table
    /// first grows to twice its capacity. An existing key keeps its slot and
    /// only the value is replaced.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ctrl_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(16);
    /// assert_eq!(table.put("k".to_string(), 1), None);
    /// assert_eq!(table.put("k".to_string(), 2), Some(1));
    /// assert_eq!(table.get("k"), Some(&2));
    /// ```
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let hash = key.key_hash();
        self.put_hashed(hash, key, value)
    }

    fn put_hashed(&mut self, hash: u64, key: K, value: V) -> Option<V> {
        let tag = fingerprint(hash);

        if self.populated + 1 > self.max_pop {
            self.grow(self.capacity.saturating_mul(GROWTH_FACTOR));
        }

        let home = self.home_index(hash);
        // SAFETY: `home < capacity`, and it is only compared when full.
        if self.ctrl()[home] == tag && unsafe { self.entry_matches(home, hash, &key) } {
            return Some(self.replace_value(home, value));
        }

        loop {
            match self.find_insert_slot(hash, &key) {
                Probe::Found(index) => return Some(self.replace_value(index, value)),
                Probe::Vacant(index) => {
                    // SAFETY: The probe only reports empty or tombstoned slots as
                    // vacant.
                    unsafe { self.occupy(index, tag, Entry { hash, key, value }) };
                    return None;
                }
                Probe::Saturated => {
                    let before = self.capacity;
                    self.grow(before.saturating_mul(GROWTH_FACTOR));
                    assert!(
                        self.capacity > before,
                        "table did not grow past {before} slots"
                    );
                }
            }
        }
    }

    #[inline]
    fn replace_value(&mut self, index: usize, value: V) -> V {
        // SAFETY: Only called with indices of full slots found by a probe.
        let entry = unsafe { self.entries_mut().get_unchecked_mut(index).assume_init_mut() };
        mem::replace(&mut entry.value, value)
    }

    /// Returns a reference to the value stored for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ctrl_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(16);
    /// table.put(b"raw".to_vec(), 3);
    ///
    /// assert_eq!(table.get(&b"raw"[..]), Some(&3));
    /// assert_eq!(table.get(&b"cooked"[..]), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: KeyHash + ?Sized,
    {
        if self.populated == 0 {
            return None;
        }

        let index = self.find_index(key.key_hash(), key)?;
        // SAFETY: `find_index` only returns full slots.
        Some(unsafe { &self.entries().get_unchecked(index).assume_init_ref().value })
    }

    /// Returns a mutable reference to the value stored for `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: KeyHash + ?Sized,
    {
        if self.populated == 0 {
            return None;
        }

        let index = self.find_index(key.key_hash(), key)?;
        // SAFETY: `find_index` only returns full slots.
        Some(unsafe {
            &mut self
                .entries_mut()
                .get_unchecked_mut(index)
                .assume_init_mut()
                .value
        })
    }

    /// Returns `true` if a live entry exists for `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: KeyHash + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Removes `key`, returning `true` if it was present.
    ///
    /// The slot becomes a tombstone, so the table never shrinks as a result
    /// of removals.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ctrl_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(16);
    /// table.put(42u64, ());
    ///
    /// assert!(table.remove(&42));
    /// assert!(!table.remove(&42));
    /// assert_eq!(table.tombstones(), 1);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: KeyHash + ?Sized,
    {
        self.take(key).is_some()
    }

    /// Removes `key` and returns its value.
    pub fn take<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: KeyHash + ?Sized,
    {
        if self.populated == 0 {
            return None;
        }

        let index = self.find_index(key.key_hash(), key)?;
        // SAFETY: `find_index` only returns full slots.
        let entry = unsafe { self.vacate(index) };
        Some(entry.value)
    }

    /// Reserves room for at least `additional` more entries without growing.
    ///
    /// # Panics
    ///
    /// Panics if the new capacity overflows. Allocation failure is reported
    /// through [`alloc::alloc::handle_alloc_error`].
    pub fn reserve(&mut self, additional: usize) {
        if let Err(err) = self.try_reserve(additional) {
            err.raise();
        }
    }

    /// Tries to reserve room for at least `additional` more entries.
    ///
    /// On error the table is unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ctrl_table::HashTable;
    /// # use ctrl_table::TryReserveError;
    /// #
    /// let mut table: HashTable<u64, u64> = HashTable::with_capacity(16);
    /// table.try_reserve(100).unwrap();
    /// assert!(table.capacity() * 3 / 4 >= 100);
    ///
    /// assert_eq!(
    ///     table.try_reserve(usize::MAX),
    ///     Err(TryReserveError::CapacityOverflow)
    /// );
    /// ```
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let required = self
            .populated
            .checked_add(additional)
            .ok_or(TryReserveError::CapacityOverflow)?;
        if required <= self.max_pop {
            return Ok(());
        }

        let capacity = capacity_for(required).ok_or(TryReserveError::CapacityOverflow)?;
        self.rebuild(capacity)
    }

    /// Rebuilds the table at the smallest capacity that holds the live
    /// entries, dropping every tombstone.
    ///
    /// Does nothing if the table is already that small and has no tombstones.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ctrl_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(1024);
    /// for i in 0..10u64 {
    ///     table.put(i, i);
    /// }
    /// table.remove(&3);
    ///
    /// table.shrink_to_fit();
    /// assert_eq!(table.capacity(), 16);
    /// assert_eq!(table.tombstones(), 0);
    /// assert_eq!(table.get(&9), Some(&9));
    /// ```
    pub fn shrink_to_fit(&mut self) {
        let capacity = capacity_for(self.populated)
            .unwrap_or_else(|| TryReserveError::CapacityOverflow.raise());
        if capacity < self.capacity || self.tombstones > 0 {
            crate::trace_event!(
                from = self.capacity,
                to = capacity,
                "shrinking table"
            );
            if let Err(err) = self.rebuild(capacity) {
                err.raise();
            }
        }
    }

    /// Grows to `max(requested, capacity * 2)` slots, rounded up to 16.
    #[cold]
    fn grow(&mut self, requested: usize) {
        let capacity = self
            .capacity
            .checked_mul(GROWTH_FACTOR)
            .map(|doubled| doubled.max(requested))
            .and_then(|capacity| capacity.checked_next_multiple_of(GROUP_SIZE))
            .unwrap_or_else(|| TryReserveError::CapacityOverflow.raise());

        if let Err(err) = self.rebuild(capacity) {
            err.raise();
        }
    }

    /// Moves every live entry into fresh storage of `capacity` slots.
    ///
    /// Entries go through the regular insert path with a freshly computed
    /// hash. If that path grows the table again, the nested rebuild migrates
    /// what has been moved so far and this one keeps feeding it from the old
    /// storage, which stays owned by this frame until the end.
    fn rebuild(&mut self, capacity: usize) -> Result<(), TryReserveError> {
        debug_assert!(capacity % GROUP_SIZE == 0);

        let (new_layout, new_alloc) = DataLayout::allocate::<K, V>(capacity)?;

        crate::trace_event!(
            old_capacity = self.capacity,
            new_capacity = capacity,
            populated = self.populated,
            tombstones = self.tombstones,
            "rebuilding table"
        );

        let old_layout = mem::replace(&mut self.layout, new_layout);
        let old_alloc = mem::replace(&mut self.alloc, new_alloc);
        let old_capacity = mem::replace(&mut self.capacity, capacity);
        self.max_pop = target_load_factor(capacity);
        self.populated = 0;
        self.tombstones = 0;

        // SAFETY: `old_alloc` was allocated with `old_layout` for `old_capacity`
        // slots. Each full slot is read exactly once, and the allocation is
        // freed without dropping anything else.
        unsafe {
            let old_ctrl = old_alloc.as_ptr();
            let old_entries = old_alloc
                .as_ptr()
                .add(old_layout.entries_offset)
                .cast::<Entry<K, V>>();

            for index in 0..old_capacity {
                if !is_full(*old_ctrl.add(index)) {
                    continue;
                }
                let Entry { key, value, .. } = old_entries.add(index).read();
                let previous = self.put(key, value);
                debug_assert!(previous.is_none());
            }

            dealloc(old_alloc.as_ptr(), old_layout.layout);
        }

        Ok(())
    }
}

impl<K, V> FromIterator<(K, V)> for HashTable<K, V>
where
    K: KeyHash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::new();
        table.extend(iter);
        table
    }
}

impl<K, V> Extend<(K, V)> for HashTable<K, V>
where
    K: KeyHash,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (key, value) in iter {
            self.put(key, value);
        }
    }
}

impl<'a, K, V> IntoIterator for &'a HashTable<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V> IntoIterator for &'a mut HashTable<K, V> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K, V> IntoIterator for HashTable<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            table: self,
            cursor: 0,
        }
    }
}

/// An iterator over the entries of a [`HashTable`].
///
/// This struct is created by [`HashTable::iter`].
pub struct Iter<'a, K, V> {
    inner: core::iter::Zip<slice::Iter<'a, u8>, slice::Iter<'a, MaybeUninit<Entry<K, V>>>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        for (&tag, entry) in self.inner.by_ref() {
            if is_full(tag) {
                self.remaining -= 1;
                // SAFETY: Full control bytes mark initialized entries.
                let entry = unsafe { entry.assume_init_ref() };
                return Some((&entry.key, &entry.value));
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of a [`HashTable`].
///
/// This struct is created by [`HashTable::iter_mut`].
pub struct IterMut<'a, K, V> {
    inner: core::iter::Zip<slice::Iter<'a, u8>, slice::IterMut<'a, MaybeUninit<Entry<K, V>>>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        for (&tag, entry) in self.inner.by_ref() {
            if is_full(tag) {
                self.remaining -= 1;
                // SAFETY: Full control bytes mark initialized entries.
                let entry = unsafe { entry.assume_init_mut() };
                return Some((&entry.key, &mut entry.value));
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// A draining iterator over the entries of a [`HashTable`].
///
/// This struct is created by [`HashTable::drain`].
pub struct Drain<'a, K, V> {
    table: &'a mut HashTable<K, V>,
    cursor: usize,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.table.vacate_next(&mut self.cursor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.populated, Some(self.table.populated))
    }
}

impl<K, V> Drop for Drain<'_, K, V> {
    fn drop(&mut self) {
        self.table.clear();
    }
}

/// An owning iterator over the entries of a [`HashTable`].
pub struct IntoIter<K, V> {
    table: HashTable<K, V>,
    cursor: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.table.vacate_next(&mut self.cursor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.populated, Some(self.table.populated))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
impl<K, V> FusedIterator for IntoIter<K, V> {}
