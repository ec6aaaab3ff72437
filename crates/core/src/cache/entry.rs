use crate::value::ValueHandle;

/// End of a hash chain or of the free list.
pub(super) const NIL: u32 = u32::MAX;

bitflags::bitflags! {
	/// State bits of a cache entry.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct EntryFlags: u8 {
		/// On the free list; the value is meaningless.
		const FREE = 1 << 0;
		/// Never released. Counts are not maintained.
		const PERSIST = 1 << 1;
		/// A manager release callback for this entry is running.
		const RELEASING = 1 << 2;
	}
}

#[derive(Clone, Copy, Debug)]
pub(super) struct CacheEntry {
	pub value: ValueHandle,
	/// References held by vouchers.
	pub refs: u32,
	/// Grants received from the manager since the last successful release.
	pub made: u32,
	pub flags: EntryFlags,
	pub hash_next: u32,
	pub free_next: u32,
}

impl CacheEntry {
	pub fn free(free_next: u32) -> Self {
		Self {
			value: ValueHandle::default(),
			refs: 0,
			made: 0,
			flags: EntryFlags::FREE,
			hash_next: NIL,
			free_next,
		}
	}

	pub fn live(value: ValueHandle, persist: bool, hash_next: u32) -> Self {
		Self {
			value,
			refs: 1,
			made: 1,
			flags: if persist { EntryFlags::PERSIST } else { EntryFlags::empty() },
			hash_next,
			free_next: NIL,
		}
	}

	#[inline]
	pub fn is_free(&self) -> bool {
		self.flags.contains(EntryFlags::FREE)
	}

	#[inline]
	pub fn is_persistent(&self) -> bool {
		self.flags.contains(EntryFlags::PERSIST)
	}

	pub fn snapshot(&self) -> EntrySnapshot {
		EntrySnapshot {
			value: self.value,
			refs: self.refs,
			made: self.made,
			flags: self.flags,
		}
	}
}

/// Point-in-time copy of a cache entry's bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntrySnapshot {
	pub value: ValueHandle,
	pub refs: u32,
	pub made: u32,
	pub flags: EntryFlags,
}

/// Point-in-time occupancy of a value cache table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableStats {
	/// Allocated entries, including the default.
	pub capacity: usize,
	/// Entries not on the free list, including the default.
	pub live: usize,
	/// Entries on the free list.
	pub free: usize,
}
