//! External voucher names.
//!
//! A voucher gets a name the first time one is made for it and keeps it for life. The table
//! maps live names to a voucher reference plus a count of user references to the name.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use voucher_recipe::VoucherName;

use crate::voucher::Voucher;

struct NameEntry {
	voucher: Voucher,
	urefs: u32,
}

pub(crate) struct NameTable {
	next: AtomicU32,
	names: Mutex<FxHashMap<VoucherName, NameEntry>>,
}

impl Default for NameTable {
	fn default() -> Self {
		Self {
			next: AtomicU32::new(1),
			names: Mutex::default(),
		}
	}
}

impl NameTable {
	fn allocate(&self) -> VoucherName {
		let raw = self.next.fetch_add(1, Ordering::Relaxed);
		VoucherName::from_raw(raw).unwrap_or_else(|| panic!("voucher name space exhausted"))
	}

	/// Binds (if needed) and returns the voucher's name, adding one user reference.
	pub(crate) fn make(&self, voucher: &Voucher) -> VoucherName {
		let name = *voucher.inner.name.get_or_init(|| self.allocate());
		self.names
			.lock()
			.entry(name)
			.and_modify(|entry| entry.urefs += 1)
			.or_insert_with(|| NameEntry {
				voucher: voucher.clone(),
				urefs: 1,
			});
		name
	}

	pub(crate) fn lookup(&self, name: VoucherName) -> Option<Voucher> {
		self.names.lock().get(&name).map(|entry| entry.voucher.clone())
	}

	/// Drops one user reference. Returns false if the name is not live.
	pub(crate) fn release(&self, name: VoucherName) -> bool {
		let removed = {
			let mut names = self.names.lock();
			let Some(entry) = names.get_mut(&name) else {
				return false;
			};
			entry.urefs -= 1;
			if entry.urefs > 0 {
				return true;
			}
			names.remove(&name)
		};
		// The voucher may be torn down here, which calls into managers.
		drop(removed);
		true
	}

	pub(crate) fn len(&self) -> usize {
		self.names.lock().len()
	}
}
