use std::hash::BuildHasher;

use parking_lot::{Condvar, Mutex, MutexGuard};
use rustc_hash::FxBuildHasher;
use smallvec::smallvec;
use tracing::{debug, trace};
use voucher_recipe::AttrKey;

use super::entry::{CacheEntry, EntryFlags, EntrySnapshot, NIL, TableStats};
use crate::config::VoucherConfig;
use crate::error::ManagerError;
use crate::value::{ValueFlags, ValueHandle, ValueIndex, ValueList};

struct TableState {
	entries: Vec<CacheEntry>,
	/// Chain heads. The count is fixed at construction so growth never rehashes.
	buckets: Box<[u32]>,
	free_head: u32,
	live: usize,
	growing: bool,
}

impl TableState {
	fn bucket_of(&self, value: ValueHandle) -> usize {
		FxBuildHasher.hash_one(value) as usize & (self.buckets.len() - 1)
	}

	fn entry(&self, index: u32) -> &CacheEntry {
		let len = self.entries.len();
		self.entries
			.get(index as usize)
			.unwrap_or_else(|| panic!("value index {index} out of range for table of {len} entries"))
	}

	fn entry_mut(&mut self, index: u32) -> &mut CacheEntry {
		let len = self.entries.len();
		self.entries
			.get_mut(index as usize)
			.unwrap_or_else(|| panic!("value index {index} out of range for table of {len} entries"))
	}

	fn find(&self, value: ValueHandle) -> Option<u32> {
		let mut cursor = self.buckets[self.bucket_of(value)];
		while cursor != NIL {
			let entry = self.entry(cursor);
			if entry.value == value {
				return Some(cursor);
			}
			cursor = entry.hash_next;
		}
		None
	}

	/// Takes an entry off the free list and links it into its bucket.
	fn insert(&mut self, value: ValueHandle, persist: bool) -> u32 {
		let index = self.free_head;
		let bucket = self.bucket_of(value);
		let head = self.buckets[bucket];
		let entry = self.entry_mut(index);
		assert!(entry.is_free(), "free list head {index} is not free");
		let next_free = entry.free_next;
		*entry = CacheEntry::live(value, persist, head);
		self.free_head = next_free;
		self.buckets[bucket] = index;
		self.live += 1;
		index
	}

	/// Unlinks an entry from its bucket and pushes it onto the free list.
	fn free(&mut self, index: u32) {
		let value = self.entry(index).value;
		let bucket = self.bucket_of(value);
		let next = self.entry(index).hash_next;
		if self.buckets[bucket] == index {
			self.buckets[bucket] = next;
		} else {
			let mut cursor = self.buckets[bucket];
			loop {
				assert!(cursor != NIL, "value index {index} missing from its hash chain");
				let link = self.entry(cursor).hash_next;
				if link == index {
					self.entry_mut(cursor).hash_next = next;
					break;
				}
				cursor = link;
			}
		}
		let free_head = self.free_head;
		*self.entry_mut(index) = CacheEntry::free(free_head);
		self.free_head = index;
		self.live -= 1;
	}
}

/// Deduplicating cache of the values of one attribute key.
///
/// Every distinct value handle occupies one entry whose index stays fixed for the entry's
/// lifetime, including across growth. Entry 0 holds the key's default value and is never
/// released.
pub struct ValueCacheTable {
	key: AttrKey,
	max_size: usize,
	state: Mutex<TableState>,
	grown: Condvar,
}

impl ValueCacheTable {
	/// Creates a table seeded with `default` at index 0.
	pub fn new(key: AttrKey, default: ValueHandle, config: &VoucherConfig) -> Self {
		let size = config.initial_table_size as usize;
		let entries = (0..size)
			.map(|i| CacheEntry::free(if i + 1 < size { (i + 1) as u32 } else { NIL }))
			.collect();
		let mut state = TableState {
			entries,
			buckets: vec![NIL; size].into_boxed_slice(),
			free_head: 0,
			live: 0,
			growing: false,
		};
		let index = state.insert(default, true);
		debug_assert_eq!(index, 0);
		Self {
			key,
			max_size: config.max_table_size as usize,
			state: Mutex::new(state),
			grown: Condvar::new(),
		}
	}

	pub fn key(&self) -> AttrKey {
		self.key
	}

	/// Returns the value handle stored at `index`.
	///
	/// # Panics
	///
	/// Panics if `index` is out of range or names a free entry. Indices only originate from
	/// this table, so either indicates corruption.
	pub fn lookup_by_index(&self, index: ValueIndex) -> ValueHandle {
		let state = self.state.lock();
		let entry = state.entry(index.0);
		assert!(!entry.is_free(), "value index {index} of key {} is free", self.key);
		entry.value
	}

	/// Returns the values to hand a manager for `index`. The default index yields none.
	pub fn lookup_values(&self, index: ValueIndex) -> ValueList {
		if index.is_default() {
			return ValueList::new();
		}
		smallvec![self.lookup_by_index(index)]
	}

	/// Takes a reference to the entry holding `value`, creating it if needed.
	///
	/// Consumes one manager grant of `value`: the grant count of the entry is incremented
	/// alongside its reference count.
	pub fn reference_by_value(&self, value: ValueHandle, flags: ValueFlags) -> ValueIndex {
		let mut state = self.state.lock();
		loop {
			if let Some(index) = state.find(value) {
				let entry = state.entry_mut(index);
				if !entry.is_persistent() {
					entry.refs += 1;
					entry.made += 1;
				}
				return ValueIndex(index);
			}
			if state.free_head == NIL {
				self.grow(&mut state);
				continue;
			}
			return ValueIndex(state.insert(value, flags.contains(ValueFlags::PERSIST)));
		}
	}

	/// Takes another reference to an entry already referenced by the caller.
	///
	/// No manager grant is involved, so the grant count is unchanged.
	pub fn reference_by_index(&self, index: ValueIndex) {
		if index.is_default() {
			return;
		}
		let mut state = self.state.lock();
		let entry = state.entry_mut(index.0);
		assert!(!entry.is_free(), "reference to free value index {index}");
		if entry.is_persistent() {
			return;
		}
		debug_assert!(entry.refs > 0, "reference by index to unreferenced entry {index}");
		entry.refs += 1;
	}

	/// Drops one reference to `index`.
	///
	/// When the last reference goes, `release_value` is called with the value and its grant
	/// count, without the table lock held. A grant count that moved while the callback ran
	/// means the value was referenced again concurrently; the outcome is reconciled and the
	/// release redriven if the entry is unreferenced again. The entry returns to the free list
	/// only after the manager confirms release of exactly the grants it was told about.
	///
	/// Returns the manager's failure status from the final callback, if any.
	pub fn release<F>(&self, index: ValueIndex, mut release_value: F) -> Result<(), ManagerError>
	where
		F: FnMut(ValueHandle, u32) -> Result<(), ManagerError>,
	{
		if index.is_default() {
			return Ok(());
		}
		let mut state = self.state.lock();
		{
			let entry = state.entry_mut(index.0);
			assert!(!entry.is_free(), "release of free value index {index}");
			if entry.is_persistent() {
				return Ok(());
			}
			assert!(entry.refs > 0, "release of unreferenced value index {index}");
			entry.refs -= 1;
			if entry.refs > 0 || entry.flags.contains(EntryFlags::RELEASING) {
				return Ok(());
			}
		}

		loop {
			let entry = state.entry_mut(index.0);
			entry.flags.insert(EntryFlags::RELEASING);
			let (value, made) = (entry.value, entry.made);

			let result = MutexGuard::unlocked(&mut state, || release_value(value, made));

			let entry = state.entry_mut(index.0);
			debug_assert!(entry.flags.contains(EntryFlags::RELEASING));
			if entry.made == made {
				if result.is_ok() {
					debug_assert_eq!(entry.refs, 0, "value index {index} referenced without a grant");
					state.free(index.0);
					return Ok(());
				}
				// A grant is in flight that has not reached the cache yet; its reference
				// will keep the entry alive.
				entry.flags.remove(EntryFlags::RELEASING);
				trace!(key = %self.key, %index, ?result, "value release deferred");
				return result;
			}

			if result.is_ok() {
				entry.made -= made;
			}
			entry.flags.remove(EntryFlags::RELEASING);
			if entry.refs > 0 {
				return result;
			}
			trace!(key = %self.key, %index, made = entry.made, "redriving value release");
		}
	}

	/// Doubles the table, preserving every index.
	///
	/// Only one grower runs at a time; a concurrent caller waits for it and returns so the
	/// caller can retry.
	fn grow(&self, state: &mut MutexGuard<'_, TableState>) {
		if state.growing {
			self.grown.wait(state);
			return;
		}
		let old_len = state.entries.len();
		let new_len = old_len * 2;
		if new_len > self.max_size {
			panic!("value cache table for key {} exhausted at {} entries (vouchers leaked?)", self.key, old_len);
		}
		state.growing = true;

		let mut fresh: Vec<CacheEntry> = MutexGuard::unlocked(state, || Vec::with_capacity(new_len));

		debug_assert_eq!(state.entries.len(), old_len);
		fresh.extend_from_slice(&state.entries);
		let tail = state.free_head;
		fresh.extend((old_len..new_len).map(|i| CacheEntry::free(if i + 1 < new_len { (i + 1) as u32 } else { tail })));
		state.entries = fresh;
		state.free_head = old_len as u32;
		state.growing = false;
		self.grown.notify_all();
		debug!(key = %self.key, old_len, new_len, "grew value cache table");
	}

	pub fn stats(&self) -> TableStats {
		let state = self.state.lock();
		TableStats {
			capacity: state.entries.len(),
			live: state.live,
			free: state.entries.len() - state.live,
		}
	}

	/// Returns a copy of the entry at `index`, or `None` if out of range.
	pub fn entry(&self, index: ValueIndex) -> Option<EntrySnapshot> {
		self.state.lock().entries.get(index.as_usize()).map(CacheEntry::snapshot)
	}
}

impl std::fmt::Debug for ValueCacheTable {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ValueCacheTable")
			.field("key", &self.key)
			.field("stats", &self.stats())
			.finish()
	}
}
