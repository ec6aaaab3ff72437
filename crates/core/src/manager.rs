//! Attribute manager interface.
//!
//! A manager owns the meaning of one attribute key. The core only ever reaches it through
//! [`AttrManager`], always with no cache lock held, so implementations may block, allocate,
//! and create or drop vouchers from inside any callback.

use voucher_recipe::{AttrKey, RecipeCommand};

use crate::error::ManagerError;
use crate::value::{ManagedValue, ValueHandle};

/// Pluggable interpreter of one attribute key's values.
pub trait AttrManager: Send + Sync + 'static {
	/// Produces the value a recipe command resolves to.
	///
	/// `previous` holds the values the key had in the previous voucher (or in the voucher
	/// under construction when no previous voucher was named); it is empty when that value is
	/// the default. Each successful call is one *grant* of the returned handle.
	fn get_value(
		&self,
		key: AttrKey,
		command: RecipeCommand,
		previous: &[ValueHandle],
		content: &[u8],
	) -> Result<ManagedValue, ManagerError>;

	/// Releases `made` grants of `value`.
	///
	/// Must succeed only if `made` accounts for every grant the manager has issued for the
	/// value, and must change nothing on failure. A failure tells the cache that a grant is
	/// outstanding that it has not seen yet.
	fn release_value(&self, key: AttrKey, value: ValueHandle, made: u32) -> Result<(), ManagerError>;

	/// Renders values back into recipe form.
	fn extract_content(&self, key: AttrKey, values: &[ValueHandle]) -> Result<ExtractedContent, ManagerError>;

	/// Out-of-band command against the values of a voucher. Does not alter the voucher.
	fn command(&self, key: AttrKey, values: &[ValueHandle], command: u32, input: &[u8]) -> Result<Vec<u8>, ManagerError> {
		let _ = (key, values, command, input);
		Err(ManagerError::NotSupported)
	}
}

/// Recipe command and content that recreate a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
	pub command: RecipeCommand,
	pub content: Vec<u8>,
}

bitflags::bitflags! {
	/// Message-lifecycle hooks a manager takes part in.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct ManagerFlags: u32 {
		/// Receives [`RecipeCommand::SendPreprocess`] before a voucher is sent.
		const SEND_PREPROCESS = 1 << 0;
		/// Receives [`RecipeCommand::AutoRedeem`] when a voucher is received.
		const AUTO_REDEEM = 1 << 1;
	}
}

/// Capability for one registered key of one voucher system.
///
/// Returned once by registration. Authorizes `SetValueHandle` recipe items for its key and
/// raw value access through [`crate::VoucherSystem::get_values`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrControl {
	system: u64,
	key: AttrKey,
}

impl AttrControl {
	pub(crate) fn new(system: u64, key: AttrKey) -> Self {
		Self { system, key }
	}

	pub fn key(&self) -> AttrKey {
		self.key
	}

	pub(crate) fn system(&self) -> u64 {
		self.system
	}
}
