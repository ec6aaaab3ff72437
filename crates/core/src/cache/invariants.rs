#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc;

use parking_lot::Mutex;
use voucher_recipe::AttrKey;

use super::{EntryFlags, ValueCacheTable};
use crate::config::VoucherConfig;
use crate::error::ManagerError;
use crate::value::{ValueFlags, ValueHandle, ValueIndex};

const DEFAULT: ValueHandle = ValueHandle(0);

fn small_table() -> ValueCacheTable {
	let config = VoucherConfig {
		initial_table_size: 4,
		max_table_size: 1 << 16,
	};
	ValueCacheTable::new(AttrKey::TEST, DEFAULT, &config)
}

/// Manager-side grant bookkeeping: a value is released only when the caller names every
/// grant the manager has made of it.
struct Grants {
	count: Mutex<u32>,
	released: AtomicUsize,
}

impl Grants {
	fn new() -> Self {
		Self {
			count: Mutex::new(0),
			released: AtomicUsize::new(0),
		}
	}

	fn grant(&self) {
		*self.count.lock() += 1;
	}

	fn release(&self, made: u32) -> Result<(), ManagerError> {
		let mut count = self.count.lock();
		if *count != made {
			return Err(ManagerError::InUse);
		}
		*count = 0;
		self.released.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

/// Invariant: the default entry is persistent, never handed to the manager and never reused.
pub(crate) fn inv_default_entry_is_permanent() {
	let table = small_table();

	assert_eq!(table.reference_by_value(DEFAULT, ValueFlags::empty()), ValueIndex::DEFAULT);
	table.reference_by_index(ValueIndex::DEFAULT);
	table
		.release(ValueIndex::DEFAULT, |_, _| panic!("default value must never be released"))
		.unwrap();

	for round in 1..=20u64 {
		let index = table.reference_by_value(ValueHandle(round), ValueFlags::empty());
		assert_ne!(index, ValueIndex::DEFAULT);
		table.release(index, |_, _| Ok(())).unwrap();
	}

	let entry = table.entry(ValueIndex::DEFAULT).unwrap();
	assert_eq!(entry.value, DEFAULT);
	assert!(entry.flags.contains(EntryFlags::PERSIST));
	assert!(!entry.flags.contains(EntryFlags::FREE));
	assert_eq!(table.stats().live, 1);
}

#[cfg_attr(test, test)]
pub(crate) fn test_default_entry_is_permanent() {
	inv_default_entry_is_permanent()
}

/// Invariant: indices handed out before a growth resolve to the same values after it.
pub(crate) fn inv_growth_preserves_indices() {
	let table = small_table();
	let mut issued: Vec<(ValueHandle, ValueIndex)> = Vec::new();
	let mut capacity = table.stats().capacity;

	for raw in 100..160u64 {
		let value = ValueHandle(raw);
		issued.push((value, table.reference_by_value(value, ValueFlags::empty())));

		let now = table.stats().capacity;
		if now != capacity {
			capacity = now;
			for &(value, index) in &issued {
				assert_eq!(table.lookup_by_index(index), value, "index {index} moved during growth");
			}
		}
	}

	assert!(capacity >= 64);
	for &(value, index) in &issued {
		assert_eq!(table.reference_by_value(value, ValueFlags::empty()), index);
	}
}

#[cfg_attr(test, test)]
pub(crate) fn test_growth_preserves_indices() {
	inv_growth_preserves_indices()
}

/// Invariant: a release racing with a fresh grant of the same value never frees the entry
/// out from under the new reference.
///
/// The releasing thread is parked inside the manager callback *before* the manager decides,
/// while another thread obtains a new grant and installs it.
pub(crate) fn inv_release_races_re_reference() {
	let table = &small_table();
	let grants = &Grants::new();
	let value = ValueHandle(7);

	grants.grant();
	let index = table.reference_by_value(value, ValueFlags::empty());

	let (entered_tx, entered_rx) = mpsc::channel();
	let (resume_tx, resume_rx) = mpsc::channel::<()>();

	std::thread::scope(|s| {
		let releaser = s.spawn(move || {
			table.release(index, |_, made| {
				entered_tx.send(()).unwrap();
				resume_rx.recv().unwrap();
				grants.release(made)
			})
		});

		entered_rx.recv().unwrap();
		grants.grant();
		assert_eq!(table.reference_by_value(value, ValueFlags::empty()), index);
		resume_tx.send(()).unwrap();

		assert_eq!(releaser.join().unwrap(), Err(ManagerError::InUse));
	});

	let entry = table.entry(index).unwrap();
	assert_eq!(entry.refs, 1);
	assert_eq!(entry.made, 2);
	assert!(entry.flags.is_empty(), "entry left with flags {:?}", entry.flags);
	assert_eq!(grants.released.load(Ordering::SeqCst), 0);

	table.release(index, |_, made| grants.release(made)).unwrap();
	assert_eq!(grants.released.load(Ordering::SeqCst), 1);
	assert_eq!(table.stats().live, 1);
}

#[cfg_attr(test, test)]
pub(crate) fn test_release_races_re_reference() {
	inv_release_races_re_reference()
}

/// Invariant: a release whose callback succeeded while the value was granted, referenced and
/// dropped again is redriven rather than left behind.
pub(crate) fn inv_release_never_strands_entry() {
	let table = &small_table();
	let grants = &Grants::new();
	let calls = &AtomicU32::new(0);
	let value = ValueHandle(9);

	grants.grant();
	let index = table.reference_by_value(value, ValueFlags::empty());

	let (entered_tx, entered_rx) = mpsc::channel();
	let (resume_tx, resume_rx) = mpsc::channel::<()>();

	std::thread::scope(|s| {
		let releaser = s.spawn(move || {
			table.release(index, |_, made| {
				let result = grants.release(made);
				if calls.fetch_add(1, Ordering::SeqCst) == 0 {
					entered_tx.send(()).unwrap();
					resume_rx.recv().unwrap();
				}
				result
			})
		});

		entered_rx.recv().unwrap();
		// The manager already let go; a new grant recreates the same handle.
		grants.grant();
		assert_eq!(table.reference_by_value(value, ValueFlags::empty()), index);
		// Dropped while the first release is still in flight: no callback of its own.
		table.release(index, |_, _| panic!("release already in progress")).unwrap();
		resume_tx.send(()).unwrap();

		assert_eq!(releaser.join().unwrap(), Ok(()));
	});

	assert_eq!(calls.load(Ordering::SeqCst), 2, "release was not redriven");
	assert_eq!(grants.released.load(Ordering::SeqCst), 2);
	assert!(table.entry(index).unwrap().flags.contains(EntryFlags::FREE));
	assert_eq!(table.stats().live, 1);
}

#[cfg_attr(test, test)]
pub(crate) fn test_release_never_strands_entry() {
	inv_release_never_strands_entry()
}

/// Invariant: a release the manager accepted while a fresh grant was installed folds the
/// consumed grants away and leaves the entry live for the new reference.
pub(crate) fn inv_release_folds_with_live_reference() {
	let table = &small_table();
	let grants = &Grants::new();
	let value = ValueHandle(11);

	grants.grant();
	let index = table.reference_by_value(value, ValueFlags::empty());

	let (entered_tx, entered_rx) = mpsc::channel();
	let (resume_tx, resume_rx) = mpsc::channel::<()>();

	std::thread::scope(|s| {
		let releaser = s.spawn(move || {
			table.release(index, |_, made| {
				let result = grants.release(made);
				entered_tx.send(()).unwrap();
				resume_rx.recv().unwrap();
				result
			})
		});

		entered_rx.recv().unwrap();
		grants.grant();
		assert_eq!(table.reference_by_value(value, ValueFlags::empty()), index);
		resume_tx.send(()).unwrap();

		assert_eq!(releaser.join().unwrap(), Ok(()));
	});

	let entry = table.entry(index).unwrap();
	assert_eq!((entry.refs, entry.made), (1, 1));
	assert!(entry.flags.is_empty(), "entry left with flags {:?}", entry.flags);
	assert_eq!(grants.released.load(Ordering::SeqCst), 1);

	table.release(index, |_, made| grants.release(made)).unwrap();
	assert_eq!(grants.released.load(Ordering::SeqCst), 2);
	assert!(table.entry(index).unwrap().flags.contains(EntryFlags::FREE));
	assert_eq!(table.stats().live, 1);
}

#[cfg_attr(test, test)]
pub(crate) fn test_release_folds_with_live_reference() {
	inv_release_folds_with_live_reference()
}

/// Invariant: hammering one value from many threads leaves no references, grants or
/// in-progress releases behind.
pub(crate) fn inv_contended_release_settles() {
	let table = small_table();
	let grants = Grants::new();
	let value = ValueHandle(0x5eed);

	std::thread::scope(|s| {
		for _ in 0..8 {
			s.spawn(|| {
				for _ in 0..200 {
					grants.grant();
					let index = table.reference_by_value(value, ValueFlags::empty());
					let _ = table.release(index, |_, made| grants.release(made));
				}
			});
		}
	});

	assert_eq!(*grants.count.lock(), 0);
	assert_eq!(table.stats().live, 1);
	assert!(grants.released.load(Ordering::SeqCst) >= 1);
}

#[cfg_attr(test, test)]
pub(crate) fn test_contended_release_settles() {
	inv_contended_release_settles()
}

/// Invariant: concurrent inserts forcing repeated growth lose no entries.
pub(crate) fn inv_concurrent_growth() {
	let table = small_table();
	let per_thread = 64u64;

	let issued: Vec<HashMap<ValueHandle, ValueIndex>> = std::thread::scope(|s| {
		let workers: Vec<_> = (0..4u64)
			.map(|t| {
				let table = &table;
				s.spawn(move || {
					(0..per_thread)
						.map(|i| {
							let value = ValueHandle(1 + t * 1000 + i);
							(value, table.reference_by_value(value, ValueFlags::empty()))
						})
						.collect::<HashMap<_, _>>()
				})
			})
			.collect();
		workers.into_iter().map(|w| w.join().unwrap()).collect()
	});

	let mut seen = std::collections::HashSet::new();
	for map in &issued {
		for (&value, &index) in map {
			assert!(seen.insert(index), "index {index} handed out twice");
			assert_eq!(table.lookup_by_index(index), value);
		}
	}
	assert_eq!(table.stats().live, 1 + 4 * per_thread as usize);
}

#[cfg_attr(test, test)]
pub(crate) fn test_concurrent_growth() {
	inv_concurrent_growth()
}
