use std::num::NonZeroU32;

use crate::{AttrKey, RecipeCommand, RecipeError};

/// Size of an encoded item header in bytes.
pub const HEADER_LEN: usize = 16;

/// Caller-visible name of a voucher, as carried in the `previous_voucher` header field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoucherName(NonZeroU32);

impl VoucherName {
	/// Wraps a raw wire value. `0` means "no voucher" and yields `None`.
	#[inline]
	pub const fn from_raw(raw: u32) -> Option<Self> {
		match NonZeroU32::new(raw) {
			Some(n) => Some(Self(n)),
			None => None,
		}
	}

	/// Returns the raw wire value.
	#[inline]
	pub const fn get(self) -> u32 {
		self.0.get()
	}
}

/// One decoded recipe item borrowing its content from the source buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecipeItem<'a> {
	pub key: AttrKey,
	pub command: RecipeCommand,
	pub previous: Option<VoucherName>,
	pub content: &'a [u8],
}

impl<'a> RecipeItem<'a> {
	/// Creates an item without a previous voucher.
	pub fn new(key: AttrKey, command: RecipeCommand, content: &'a [u8]) -> Self {
		Self {
			key,
			command,
			previous: None,
			content,
		}
	}

	/// Sets the previous voucher name.
	pub fn with_previous(mut self, previous: Option<VoucherName>) -> Self {
		self.previous = previous;
		self
	}

	/// Returns the number of bytes this item occupies on the wire.
	#[inline]
	pub fn encoded_len(&self) -> usize {
		encoded_len(self.content.len())
	}

	/// Appends the encoded item to `out`.
	///
	/// # Panics
	///
	/// Panics if the content is longer than `u32::MAX` bytes.
	pub fn encode(&self, out: &mut Vec<u8>) {
		out.reserve(self.encoded_len());
		out.extend_from_slice(&self.header());
		out.extend_from_slice(self.content);
	}

	fn header(&self) -> [u8; HEADER_LEN] {
		let size = u32::try_from(self.content.len()).unwrap_or_else(|_| panic!("recipe content too large: {} bytes", self.content.len()));
		let mut header = [0u8; HEADER_LEN];
		header[0..4].copy_from_slice(&self.key.0.to_le_bytes());
		header[4..8].copy_from_slice(&self.command.code().to_le_bytes());
		header[8..12].copy_from_slice(&self.previous.map_or(0, VoucherName::get).to_le_bytes());
		header[12..16].copy_from_slice(&size.to_le_bytes());
		header
	}
}

/// Returns the wire size of an item carrying `content_len` content bytes.
#[inline]
pub const fn encoded_len(content_len: usize) -> usize {
	HEADER_LEN + content_len
}

/// Iterator over the items of a recipe buffer.
///
/// Yields at most one error, after which iteration stops.
#[derive(Clone, Debug)]
pub struct RecipeReader<'a> {
	buf: &'a [u8],
	offset: usize,
	failed: bool,
}

impl<'a> RecipeReader<'a> {
	pub fn new(buf: &'a [u8]) -> Self {
		Self {
			buf,
			offset: 0,
			failed: false,
		}
	}

	/// Byte offset of the next item.
	pub fn offset(&self) -> usize {
		self.offset
	}

	fn read_item(&mut self) -> Result<RecipeItem<'a>, RecipeError> {
		let rest = &self.buf[self.offset..];
		let Some((header, body)) = rest.split_first_chunk::<HEADER_LEN>() else {
			return Err(RecipeError::TruncatedHeader {
				offset: self.offset,
				remaining: rest.len(),
			});
		};
		let field = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
		let declared = field(12);
		let content = body.get(..declared as usize).ok_or(RecipeError::ContentOverrun {
			offset: self.offset,
			declared,
			remaining: body.len(),
		})?;
		self.offset += encoded_len(content.len());
		Ok(RecipeItem {
			key: AttrKey(field(0)),
			command: RecipeCommand::from_code(field(4)),
			previous: VoucherName::from_raw(field(8)),
			content,
		})
	}
}

impl<'a> Iterator for RecipeReader<'a> {
	type Item = Result<RecipeItem<'a>, RecipeError>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed || self.offset == self.buf.len() {
			return None;
		}
		let item = self.read_item();
		self.failed = item.is_err();
		Some(item)
	}
}

impl std::iter::FusedIterator for RecipeReader<'_> {}

/// Encodes recipe items into a fixed caller-supplied buffer.
#[derive(Debug)]
pub struct RecipeWriter<'a> {
	out: &'a mut [u8],
	written: usize,
}

impl<'a> RecipeWriter<'a> {
	pub fn new(out: &'a mut [u8]) -> Self {
		Self { out, written: 0 }
	}

	/// Appends one item, failing without writing anything if it does not fit.
	pub fn push(&mut self, item: &RecipeItem<'_>) -> Result<(), RecipeError> {
		let needed = item.encoded_len();
		let available = self.out.len() - self.written;
		if needed > available {
			return Err(RecipeError::NoSpace { needed, available });
		}
		let dst = &mut self.out[self.written..self.written + needed];
		dst[..HEADER_LEN].copy_from_slice(&item.header());
		dst[HEADER_LEN..].copy_from_slice(item.content);
		self.written += needed;
		Ok(())
	}

	/// Number of bytes written so far.
	pub fn written(&self) -> usize {
		self.written
	}
}
