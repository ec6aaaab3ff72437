//! Recipe command execution.
//!
//! One [`Executor`] runs one creation request. It owns the voucher under construction until
//! [`Executor::finish`] submits it to the dedup index; dropping the executor early releases
//! every reference the recipe accumulated, so a failed request leaves no trace.
//!
//! # Invariants
//!
//! - Construction is all-or-nothing.
//!   - Enforced in: [`Executor::apply`] callers propagate the first error and drop the executor.
//!   - Tested by: `exec::tests::test_failure_midway_releases_everything`
//!   - Failure symptom: Cache entries or manager grants leak after a rejected recipe.
//!
//! - `SetValueHandle` only runs for the key whose control authorized the request.
//!   - Enforced in: `Executor::set_value_handle`.
//!   - Tested by: `exec::tests::test_set_value_handle_requires_matching_control`
//!   - Failure symptom: Any caller can forge attribute values.

use std::sync::Arc;

use voucher_recipe::{AttrKey, KEY_NUM, KeyIndex, RecipeCommand};

use crate::error::{Result, VoucherError};
use crate::manager::AttrControl;
use crate::registry::KeyRegistration;
use crate::system::Shared;
use crate::value::{ManagedValue, ValueHandle, ValueIndex};
use crate::voucher::{Voucher, VoucherBuilder, VoucherInner};

/// One typed recipe item.
#[derive(Debug, Clone)]
pub struct RecipeStep {
	pub key: AttrKey,
	pub command: RecipeCommand,
	pub previous: Option<Voucher>,
	pub content: Vec<u8>,
}

impl RecipeStep {
	pub fn new(key: AttrKey, command: RecipeCommand, content: impl Into<Vec<u8>>) -> Self {
		Self {
			key,
			command,
			previous: None,
			content: content.into(),
		}
	}

	/// Copies every key (or one key) from `previous`.
	pub fn copy(key: AttrKey, previous: &Voucher) -> Self {
		Self::new(key, RecipeCommand::Copy, Vec::new()).with_previous(previous)
	}

	/// Resets every key (or one key) to its default.
	pub fn remove(key: AttrKey) -> Self {
		Self::new(key, RecipeCommand::Remove, Vec::new())
	}

	/// Installs a raw value handle. Requires the key's control.
	pub fn set_value_handle(key: AttrKey, value: ValueHandle) -> Self {
		Self::new(key, RecipeCommand::SetValueHandle, value.to_content().to_vec())
	}

	pub fn with_previous(mut self, previous: &Voucher) -> Self {
		self.previous = Some(previous.clone());
		self
	}
}

pub(crate) struct Executor<'a> {
	shared: Arc<Shared>,
	control: Option<&'a AttrControl>,
	builder: VoucherBuilder,
}

impl<'a> Executor<'a> {
	pub(crate) fn new(shared: &Arc<Shared>, control: Option<&'a AttrControl>) -> Result<Self> {
		if let Some(control) = control {
			if control.system() != shared.id {
				return Err(VoucherError::InvalidCapability(format!("control for key {} belongs to another system", control.key())));
			}
		}
		Ok(Self {
			shared: Arc::clone(shared),
			control,
			builder: VoucherBuilder::new(Arc::clone(shared)),
		})
	}

	/// Executes one recipe item against the voucher under construction.
	pub(crate) fn apply(&mut self, key: AttrKey, command: RecipeCommand, previous: Option<&Voucher>, content: &[u8]) -> Result<()> {
		if let Some(previous) = previous {
			if !Arc::ptr_eq(previous.shared(), &self.shared) {
				return Err(VoucherError::InvalidCapability("previous voucher belongs to another system".into()));
			}
		}
		if matches!(command, RecipeCommand::Copy | RecipeCommand::Remove) && !content.is_empty() {
			return Err(VoucherError::InvalidArgument(format!("{command:?} takes no content, got {} bytes", content.len())));
		}
		match command {
			RecipeCommand::Copy => {
				for index in Self::target_keys(key)? {
					self.copy(index, previous);
				}
				Ok(())
			}
			RecipeCommand::Remove => {
				for index in Self::target_keys(key)? {
					self.remove(index, previous);
				}
				Ok(())
			}
			RecipeCommand::SetValueHandle => self.set_value_handle(key, content),
			RecipeCommand::Redeem if key.is_wildcard() => {
				let shared = Arc::clone(&self.shared);
				for (index, registration) in shared.registry.iter() {
					self.replace_value(index, registration, command, previous, content)?;
				}
				Ok(())
			}
			_ => {
				let shared = Arc::clone(&self.shared);
				let (index, registration) = shared.registry.resolve(key)?;
				self.replace_value(index, registration, command, previous, content)
			}
		}
	}

	/// Publishes the finished voucher, or returns the existing one with the same contents.
	pub(crate) fn finish(self) -> Voucher {
		let candidate = Arc::new(VoucherInner {
			shared: Arc::clone(&self.shared),
			slots: self.builder.into_slots(),
			name: Default::default(),
		});
		self.shared.index.get_or_insert(candidate)
	}

	/// Slots a COPY or REMOVE item applies to.
	fn target_keys(key: AttrKey) -> Result<impl Iterator<Item = KeyIndex>> {
		let (skip, take) = if key.is_wildcard() {
			(0, KEY_NUM)
		} else {
			let index = key.index().ok_or_else(|| VoucherError::invalid_key(key))?;
			(index.as_usize(), 1)
		};
		Ok(KeyIndex::all().skip(skip).take(take))
	}

	fn copy(&mut self, index: KeyIndex, previous: Option<&Voucher>) {
		let Some(previous) = previous else {
			return;
		};
		let value = previous.slots().get(index);
		self.shared.registry.reference(index, value);
		self.builder.replace_slot(index, value);
	}

	fn remove(&mut self, index: KeyIndex, previous: Option<&Voucher>) {
		if let Some(previous) = previous {
			if self.builder.slot(index) != previous.slots().get(index) {
				return;
			}
		}
		self.builder.replace_slot(index, ValueIndex::DEFAULT);
	}

	fn set_value_handle(&mut self, key: AttrKey, content: &[u8]) -> Result<()> {
		if self.control.is_none_or(|control| control.key() != key) {
			return Err(VoucherError::InvalidCapability(format!("setting a value handle for key {key} requires that key's control")));
		}
		let shared = Arc::clone(&self.shared);
		let (index, registration) = shared.registry.resolve(key)?;
		let handle = ValueHandle::from_content(content)
			.ok_or_else(|| VoucherError::InvalidArgument(format!("value handle content must be 8 bytes, got {}", content.len())))?;
		let value = registration.install(ManagedValue::new(handle));
		self.builder.replace_slot(index, value);
		Ok(())
	}

	/// Asks the key's manager for a new value and installs it.
	fn replace_value(
		&mut self,
		index: KeyIndex,
		registration: &KeyRegistration,
		command: RecipeCommand,
		previous: Option<&Voucher>,
		content: &[u8],
	) -> Result<()> {
		let source = previous.map_or_else(|| self.builder.slot(index), |previous| previous.slots().get(index));
		let values = registration.values(source);
		let key = registration.key();
		let value = registration
			.manager()
			.get_value(key, command, &values, content)
			.map_err(VoucherError::manager(key))?;
		let installed = registration.install(value);
		self.builder.replace_slot(index, installed);
		Ok(())
	}
}
