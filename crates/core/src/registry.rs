//! Key to manager bindings.
//!
//! Populated once while a [`crate::SystemBuilder`] runs and read-only afterwards, so lookups
//! take no lock.

use std::sync::Arc;

use voucher_recipe::{AttrKey, KEY_NUM, KeyIndex};

use crate::cache::ValueCacheTable;
use crate::config::VoucherConfig;
use crate::error::{ManagerError, RegisterError, Result, VoucherError};
use crate::manager::{AttrManager, ManagerFlags};
use crate::value::{ManagedValue, ValueHandle, ValueIndex, ValueList};

/// One registered key: its manager and its value cache.
pub struct KeyRegistration {
	key: AttrKey,
	manager: Arc<dyn AttrManager>,
	table: ValueCacheTable,
	flags: ManagerFlags,
}

impl KeyRegistration {
	pub fn key(&self) -> AttrKey {
		self.key
	}

	pub fn manager(&self) -> &dyn AttrManager {
		&*self.manager
	}

	pub fn table(&self) -> &ValueCacheTable {
		&self.table
	}

	pub fn flags(&self) -> ManagerFlags {
		self.flags
	}

	/// Caches a value the manager just granted.
	pub(crate) fn install(&self, value: ManagedValue) -> ValueIndex {
		self.table.reference_by_value(value.handle, value.flags)
	}

	pub(crate) fn values(&self, index: ValueIndex) -> ValueList {
		self.table.lookup_values(index)
	}

	/// Drops one reference, handing the value back to the manager if it was the last.
	pub(crate) fn release(&self, index: ValueIndex) -> Result<(), ManagerError> {
		self.table
			.release(index, |value, made| self.manager.release_value(self.key, value, made))
	}
}

impl std::fmt::Debug for KeyRegistration {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("KeyRegistration")
			.field("key", &self.key)
			.field("flags", &self.flags)
			.field("table", &self.table)
			.finish()
	}
}

/// Fixed table of registrations indexed by key slot.
#[derive(Debug)]
pub struct ManagerRegistry {
	slots: [Option<KeyRegistration>; KEY_NUM],
}

impl Default for ManagerRegistry {
	fn default() -> Self {
		Self {
			slots: std::array::from_fn(|_| None),
		}
	}
}

impl ManagerRegistry {
	pub(crate) fn register(
		&mut self,
		key: AttrKey,
		manager: Arc<dyn AttrManager>,
		default_value: ValueHandle,
		flags: ManagerFlags,
		config: &VoucherConfig,
	) -> Result<(), RegisterError> {
		let index = key.index().ok_or(RegisterError::InvalidKey(key))?;
		let slot = &mut self.slots[index.as_usize()];
		if slot.is_some() {
			return Err(RegisterError::AlreadyRegistered(key));
		}
		*slot = Some(KeyRegistration {
			key,
			manager,
			table: ValueCacheTable::new(key, default_value, config),
			flags,
		});
		Ok(())
	}

	#[inline]
	pub fn get(&self, index: KeyIndex) -> Option<&KeyRegistration> {
		self.slots[index.as_usize()].as_ref()
	}

	/// Resolves a concrete key to its registration.
	pub fn resolve(&self, key: AttrKey) -> Result<(KeyIndex, &KeyRegistration)> {
		let index = key.index().ok_or_else(|| VoucherError::invalid_key(key))?;
		let registration = self.get(index).ok_or_else(|| VoucherError::unregistered(key))?;
		Ok((index, registration))
	}

	/// Iterates over registered keys in slot order.
	pub fn iter(&self) -> impl Iterator<Item = (KeyIndex, &KeyRegistration)> + '_ {
		KeyIndex::all().filter_map(|index| self.get(index).map(|r| (index, r)))
	}

	/// Releases a slot reference held by a voucher.
	pub(crate) fn release(&self, index: KeyIndex, value: ValueIndex) -> Result<(), ManagerError> {
		if value.is_default() {
			return Ok(());
		}
		let registration = self
			.get(index)
			.unwrap_or_else(|| panic!("value {value} held for unregistered key {}", index.key()));
		registration.release(value)
	}

	/// Takes another reference to a slot value held by some voucher.
	pub(crate) fn reference(&self, index: KeyIndex, value: ValueIndex) {
		if value.is_default() {
			return;
		}
		let registration = self
			.get(index)
			.unwrap_or_else(|| panic!("value {value} held for unregistered key {}", index.key()));
		registration.table.reference_by_index(value);
	}
}
