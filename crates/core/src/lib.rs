//! Deduplicated attribute-value cache and immutable voucher pool.
//!
//! A voucher is an immutable, reference-counted bundle holding one value per attribute key.
//! Values belong to pluggable [`AttrManager`]s; the core keeps one [`ValueCacheTable`] per key
//! so identical values are stored once, and a dedup index so vouchers with identical contents
//! collapse onto one shared object.
//!
//! # Modules
//!
//! - [`cache`] - Per-key value cache with stable indices and the fenced release protocol
//! - `voucher` - Voucher objects and the private builder used during construction
//! - `dedup` - Content-addressed index of published vouchers
//! - `exec` - Recipe command interpreter
//! - `extract` - Rendering vouchers back into recipes
//! - `system` - [`VoucherSystem`] facade and the process-wide instance
//!
//! # Example flow
//!
//! ```ignore
//! let mut builder = VoucherSystem::builder(VoucherConfig::default())?;
//! let control = builder.register(AttrKey::USER_DATA, manager, ValueHandle(0), ManagerFlags::empty())?;
//! let system = builder.build();
//! let voucher = system.create_from_steps(&[RecipeStep::new(AttrKey::USER_DATA, RecipeCommand::USER_DATA_STORE, b"x".to_vec())], None)?;
//! ```

pub mod cache;
mod config;
mod dedup;
mod error;
mod exec;
mod extract;
mod manager;
mod names;
mod registry;
mod system;
mod value;
mod voucher;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_fixtures;

pub use cache::{EntryFlags, EntrySnapshot, TableStats, ValueCacheTable};
pub use config::VoucherConfig;
pub use error::{ConfigError, ManagerError, RegisterError, Result, VoucherError};
pub use exec::RecipeStep;
pub use manager::{AttrControl, AttrManager, ExtractedContent, ManagerFlags};
pub use registry::{KeyRegistration, ManagerRegistry};
pub use system::{SystemBuilder, VoucherSystem, global, install};
pub use value::{ManagedValue, VALUE_MAX_NESTED, ValueFlags, ValueHandle, ValueIndex, ValueList};
pub use voucher::{SlotArray, Voucher};
pub use voucher_recipe::{AttrKey, KEY_NUM, KeyIndex, RecipeCommand, RecipeError, RecipeItem, RecipeReader, RecipeWriter, VoucherName};
