//! Voucher objects.
//!
//! A voucher is one [`ValueIndex`] per attribute key slot. [`VoucherBuilder`] is the private,
//! mutable form used while a recipe runs; [`Voucher`] is the published, immutable and shared
//! form. Both own one cache reference per non-default slot and release them when dropped.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::{trace, warn};
use voucher_recipe::{AttrKey, KEY_NUM, KeyIndex, VoucherName};

use crate::error::ManagerError;
use crate::system::Shared;
use crate::value::ValueIndex;

/// The per-key value indices of a voucher. Equality and hashing cover the array only.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SlotArray([ValueIndex; KEY_NUM]);

impl SlotArray {
	#[inline]
	pub fn get(&self, index: KeyIndex) -> ValueIndex {
		self.0[index.as_usize()]
	}

	#[inline]
	fn set(&mut self, index: KeyIndex, value: ValueIndex) {
		self.0[index.as_usize()] = value;
	}

	/// Iterates over slots holding a non-default value.
	pub fn iter_set(&self) -> impl Iterator<Item = (KeyIndex, ValueIndex)> + '_ {
		KeyIndex::all().map(|index| (index, self.get(index))).filter(|(_, value)| !value.is_default())
	}

	pub fn is_default(&self) -> bool {
		self.iter_set().next().is_none()
	}
}

impl fmt::Debug for SlotArray {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.iter_set().map(|(index, value)| (index.key().0, value.0))).finish()
	}
}

/// Drops one slot reference. A manager that reports the value still in use has an outstanding
/// grant that will settle the entry later.
fn release_value(shared: &Shared, index: KeyIndex, value: ValueIndex) {
	match shared.registry.release(index, value) {
		Ok(()) => {}
		Err(ManagerError::InUse) => trace!(key = %index.key(), %value, "value release deferred to outstanding grant"),
		Err(err) => warn!(key = %index.key(), %value, %err, "manager failed to release value"),
	}
}

fn release_slots(shared: &Shared, slots: &SlotArray) {
	for (index, value) in slots.iter_set() {
		release_value(shared, index, value);
	}
}

/// A voucher under construction, exclusively owned by the creating call.
pub(crate) struct VoucherBuilder {
	shared: Arc<Shared>,
	slots: SlotArray,
}

impl VoucherBuilder {
	pub(crate) fn new(shared: Arc<Shared>) -> Self {
		Self {
			shared,
			slots: SlotArray::default(),
		}
	}

	#[inline]
	pub(crate) fn slot(&self, index: KeyIndex) -> ValueIndex {
		self.slots.get(index)
	}

	/// Stores `value`, whose reference the caller hands over, and drops the previous one.
	pub(crate) fn replace_slot(&mut self, index: KeyIndex, value: ValueIndex) {
		let old = self.slots.get(index);
		self.slots.set(index, value);
		release_value(&self.shared, index, old);
	}

	/// Transfers the slot references out, leaving nothing for `Drop` to release.
	pub(crate) fn into_slots(mut self) -> SlotArray {
		std::mem::take(&mut self.slots)
	}
}

impl Drop for VoucherBuilder {
	fn drop(&mut self) {
		release_slots(&self.shared, &self.slots);
	}
}

pub(crate) struct VoucherInner {
	pub(crate) shared: Arc<Shared>,
	pub(crate) slots: SlotArray,
	pub(crate) name: OnceLock<VoucherName>,
}

impl Drop for VoucherInner {
	fn drop(&mut self) {
		self.shared.index.remove(&self.slots, self);
		release_slots(&self.shared, &self.slots);
	}
}

/// A published voucher.
///
/// Cloning takes another reference; dropping the last reference unpublishes the voucher and
/// releases its attribute values.
#[derive(Clone)]
pub struct Voucher {
	pub(crate) inner: Arc<VoucherInner>,
}

impl Voucher {
	/// Returns the value index stored for `key`, or `None` if `key` is not a concrete key.
	pub fn value_index(&self, key: AttrKey) -> Option<ValueIndex> {
		key.index().map(|index| self.inner.slots.get(index))
	}

	pub fn slots(&self) -> &SlotArray {
		&self.inner.slots
	}

	/// Number of outstanding references to this voucher.
	pub fn ref_count(&self) -> usize {
		Arc::strong_count(&self.inner)
	}

	/// Returns true if both handles refer to the same voucher object.
	pub fn ptr_eq(&self, other: &Voucher) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// The external name bound to this voucher, if one was ever made.
	pub fn name(&self) -> Option<VoucherName> {
		self.inner.name.get().copied()
	}

	pub(crate) fn shared(&self) -> &Arc<Shared> {
		&self.inner.shared
	}
}

impl PartialEq for Voucher {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}

impl Eq for Voucher {}

impl fmt::Debug for Voucher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Voucher")
			.field("slots", &self.inner.slots)
			.field("refs", &self.ref_count())
			.field("name", &self.name())
			.finish()
	}
}
