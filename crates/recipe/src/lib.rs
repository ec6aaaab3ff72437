//! Attribute keys, recipe commands and the recipe wire format.
//!
//! A recipe is a sequence of construction commands consumed by the voucher executor. On the
//! wire each item is a fixed 16-byte little-endian header followed by the item's content:
//!
//! | Offset | Field | Meaning |
//! |--------|-------|---------|
//! | 0 | `key` | attribute key, or [`AttrKey::ALL`] for every key |
//! | 4 | `command` | [`RecipeCommand`] code |
//! | 8 | `previous_voucher` | [`VoucherName`] of a prior voucher, `0` for none |
//! | 12 | `content_size` | number of content bytes that follow |
//!
//! Items are concatenated without separators. Content bytes are opaque to this crate and are
//! interpreted only by the attribute manager registered for the item's key.

mod command;
mod error;
mod key;
mod wire;

pub use command::RecipeCommand;
pub use error::RecipeError;
pub use key::{AttrKey, KEY_NUM, KeyIndex};
pub use wire::{HEADER_LEN, RecipeItem, RecipeReader, RecipeWriter, VoucherName, encoded_len};
