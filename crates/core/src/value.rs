use std::fmt;

/// Opaque attribute value token produced by an attribute manager.
///
/// The core stores and compares handles but never interprets their bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ValueHandle(pub u64);

impl ValueHandle {
	/// Decodes a handle from the content of a `SetValueHandle` recipe item.
	pub fn from_content(content: &[u8]) -> Option<Self> {
		let bytes: [u8; 8] = content.try_into().ok()?;
		Some(Self(u64::from_le_bytes(bytes)))
	}

	/// Encodes the handle as `SetValueHandle` recipe content.
	pub fn to_content(self) -> [u8; 8] {
		self.0.to_le_bytes()
	}
}

impl fmt::Display for ValueHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#x}", self.0)
	}
}

/// Index of a cache entry inside one key's value cache table.
///
/// Index 0 is the key's default value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ValueIndex(pub u32);

impl ValueIndex {
	/// The default value of every key.
	pub const DEFAULT: Self = Self(0);

	#[inline]
	pub const fn is_default(self) -> bool {
		self.0 == 0
	}

	#[inline]
	pub(crate) const fn as_usize(self) -> usize {
		self.0 as usize
	}
}

impl fmt::Display for ValueIndex {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

bitflags::bitflags! {
	/// Flags a manager attaches to a value it hands out.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct ValueFlags: u32 {
		/// The cache entry is never released once created.
		const PERSIST = 1 << 0;
	}
}

/// A value returned by [`crate::AttrManager::get_value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManagedValue {
	pub handle: ValueHandle,
	pub flags: ValueFlags,
}

impl ManagedValue {
	pub fn new(handle: ValueHandle) -> Self {
		Self {
			handle,
			flags: ValueFlags::empty(),
		}
	}

	pub fn persistent(handle: ValueHandle) -> Self {
		Self {
			handle,
			flags: ValueFlags::PERSIST,
		}
	}
}

/// Most values a manager is handed for one key at a time.
pub const VALUE_MAX_NESTED: usize = 4;

/// Values of one key passed to manager callbacks.
pub type ValueList = smallvec::SmallVec<[ValueHandle; VALUE_MAX_NESTED]>;
