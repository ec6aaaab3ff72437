//! Rendering vouchers back into recipes and raw values.
//!
//! Every entry point asks the owning manager to describe the voucher's current value; keys at
//! their default value produce nothing. Buffer variants never write a partial item.

use voucher_recipe::{AttrKey, RecipeItem, RecipeWriter};

use crate::error::{Result, VoucherError};
use crate::manager::{AttrControl, ExtractedContent};
use crate::registry::KeyRegistration;
use crate::system::VoucherSystem;
use crate::value::ValueList;
use crate::voucher::Voucher;

impl VoucherSystem {
	/// The registration and current values of `key` in `voucher`, or `None` at the default.
	fn current_values(&self, voucher: &Voucher, key: AttrKey) -> Result<Option<(&KeyRegistration, ValueList)>> {
		self.check_owner(voucher)?;
		let (index, registration) = self.shared.registry.resolve(key)?;
		let value = voucher.slots().get(index);
		if value.is_default() {
			return Ok(None);
		}
		Ok(Some((registration, registration.values(value))))
	}

	fn extract(&self, voucher: &Voucher, key: AttrKey) -> Result<Option<ExtractedContent>> {
		let Some((registration, values)) = self.current_values(voucher, key)? else {
			return Ok(None);
		};
		let extracted = registration
			.manager()
			.extract_content(key, &values)
			.map_err(VoucherError::manager(key))?;
		Ok(Some(extracted))
	}

	/// Writes the content the manager of `key` renders for `voucher` into `out`.
	///
	/// Returns the number of bytes written, `0` when the key holds its default value.
	pub fn extract_attr_content(&self, voucher: &Voucher, key: AttrKey, out: &mut [u8]) -> Result<usize> {
		let Some(extracted) = self.extract(voucher, key)? else {
			return Ok(0);
		};
		let needed = extracted.content.len();
		let available = out.len();
		let dst = out.get_mut(..needed).ok_or(VoucherError::NoSpace { needed, available })?;
		dst.copy_from_slice(&extracted.content);
		Ok(needed)
	}

	/// Writes one encoded recipe item recreating `key`'s value into `out`.
	pub fn extract_attr_recipe(&self, voucher: &Voucher, key: AttrKey, out: &mut [u8]) -> Result<usize> {
		let mut writer = RecipeWriter::new(out);
		if let Some(extracted) = self.extract(voucher, key)? {
			writer.push(&RecipeItem::new(key, extracted.command, &extracted.content))?;
		}
		Ok(writer.written())
	}

	/// Writes a recipe recreating every non-default key of `voucher` into `out`.
	///
	/// Replaying the recipe through [`VoucherSystem::create`] yields `voucher` itself as long
	/// as every manager renders a command that regrants the same value.
	pub fn extract_all_attr_recipes(&self, voucher: &Voucher, out: &mut [u8]) -> Result<usize> {
		let mut writer = RecipeWriter::new(out);
		for (index, _) in voucher.slots().iter_set() {
			let key = index.key();
			if let Some(extracted) = self.extract(voucher, key)? {
				writer.push(&RecipeItem::new(key, extracted.command, &extracted.content))?;
			}
		}
		Ok(writer.written())
	}

	/// Like [`Self::extract_all_attr_recipes`], into a new buffer of exactly the needed size.
	pub fn extract_all_attr_recipes_to_vec(&self, voucher: &Voucher) -> Result<Vec<u8>> {
		let mut out = Vec::new();
		for (index, _) in voucher.slots().iter_set() {
			let key = index.key();
			if let Some(extracted) = self.extract(voucher, key)? {
				RecipeItem::new(key, extracted.command, &extracted.content).encode(&mut out);
			}
		}
		Ok(out)
	}

	/// Raw value handles of `voucher` for the key `control` governs.
	pub fn get_values(&self, control: &AttrControl, voucher: &Voucher) -> Result<ValueList> {
		self.check_control(control)?;
		Ok(self
			.current_values(voucher, control.key())?
			.map(|(_, values)| values)
			.unwrap_or_default())
	}

	/// Runs a manager-specific command against `voucher`'s values for `key`. The voucher is
	/// left unchanged.
	pub fn command(&self, voucher: &Voucher, key: AttrKey, command: u32, input: &[u8]) -> Result<Vec<u8>> {
		let (registration, values) = match self.current_values(voucher, key)? {
			Some(current) => current,
			None => (self.shared.registry.resolve(key)?.1, ValueList::new()),
		};
		registration
			.manager()
			.command(key, &values, command, input)
			.map_err(VoucherError::manager(key))
	}
}
