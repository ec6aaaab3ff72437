use std::fmt;

/// Number of attribute key slots carried by every voucher.
pub const KEY_NUM: usize = 8;

/// Attribute key as it appears in recipes and on the wire.
///
/// Valid keys are `1..=KEY_NUM`. `0` names no key and [`AttrKey::ALL`] is the wildcard that
/// applies a command to every slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrKey(pub u32);

impl AttrKey {
	/// No key. Never valid in a recipe.
	pub const NONE: Self = Self(0);
	/// Activity tracing.
	pub const ATM: Self = Self(1);
	/// Importance donation.
	pub const IMPORTANCE: Self = Self(2);
	/// Resource accounting.
	pub const BANK: Self = Self(3);
	/// Thread priority propagation.
	pub const PTHPRIORITY: Self = Self(4);
	/// Opaque user data.
	pub const USER_DATA: Self = Self(7);
	/// Reserved for tests.
	pub const TEST: Self = Self(8);
	/// Wildcard covering every key.
	pub const ALL: Self = Self(u32::MAX);

	/// Returns true for the wildcard key.
	#[inline]
	pub const fn is_wildcard(self) -> bool {
		self.0 == Self::ALL.0
	}

	/// Returns the slot index for a concrete key, or `None` for `NONE`, the wildcard and
	/// out-of-range keys.
	#[inline]
	pub const fn index(self) -> Option<KeyIndex> {
		if self.0 == 0 || self.0 as usize > KEY_NUM {
			None
		} else {
			Some(KeyIndex((self.0 - 1) as u8))
		}
	}
}

impl fmt::Display for AttrKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_wildcard() {
			f.write_str("ALL")
		} else {
			write!(f, "{}", self.0)
		}
	}
}

impl From<u32> for AttrKey {
	fn from(raw: u32) -> Self {
		Self(raw)
	}
}

/// Dense slot index of a concrete attribute key, always `< KEY_NUM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyIndex(u8);

impl KeyIndex {
	/// Returns the index as a `usize` suitable for array access.
	#[inline]
	pub const fn as_usize(self) -> usize {
		self.0 as usize
	}

	/// Returns the attribute key stored at this slot.
	#[inline]
	pub const fn key(self) -> AttrKey {
		AttrKey(self.0 as u32 + 1)
	}

	/// Iterates over every slot index in ascending order.
	pub fn all() -> impl Iterator<Item = KeyIndex> + Clone {
		(0..KEY_NUM as u8).map(KeyIndex)
	}
}
