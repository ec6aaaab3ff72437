//! Content-addressed index of published vouchers.
//!
//! Entries are weak: the index never keeps a voucher alive, and a lookup that races with the
//! last release of a voucher fails to upgrade and treats the entry as absent. No voucher
//! reference is ever dropped while the index lock is held, since dropping the last one
//! re-enters [`DedupIndex::remove`].

use std::collections::hash_map::Entry;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::voucher::{SlotArray, Voucher, VoucherInner};

#[derive(Default)]
pub(crate) struct DedupIndex {
	map: RwLock<FxHashMap<SlotArray, Weak<VoucherInner>>>,
}

impl DedupIndex {
	/// Returns a new reference to the live voucher with these contents, if any.
	pub(crate) fn lookup(&self, slots: &SlotArray) -> Option<Voucher> {
		let inner = self.map.read().get(slots).and_then(Weak::upgrade)?;
		Some(Voucher { inner })
	}

	/// Publishes `candidate` unless an equal live voucher exists, in which case that voucher is
	/// returned and `candidate` is dropped after the lock is released.
	pub(crate) fn get_or_insert(&self, candidate: Arc<VoucherInner>) -> Voucher {
		if let Some(existing) = self.lookup(&candidate.slots) {
			return existing;
		}
		let existing = {
			let mut map = self.map.write();
			match map.entry(candidate.slots) {
				Entry::Occupied(mut slot) => match slot.get().upgrade() {
					Some(existing) => Some(existing),
					None => {
						slot.insert(Arc::downgrade(&candidate));
						None
					}
				},
				Entry::Vacant(slot) => {
					slot.insert(Arc::downgrade(&candidate));
					None
				}
			}
		};
		match existing {
			Some(inner) => Voucher { inner },
			None => Voucher { inner: candidate },
		}
	}

	/// Unpublishes `voucher` if the entry for `slots` still refers to it.
	pub(crate) fn remove(&self, slots: &SlotArray, voucher: *const VoucherInner) {
		let mut map = self.map.write();
		if let Some(weak) = map.get(slots) {
			if std::ptr::eq(weak.as_ptr(), voucher) {
				map.remove(slots);
			}
		}
	}

	pub(crate) fn len(&self) -> usize {
		self.map.read().len()
	}
}
