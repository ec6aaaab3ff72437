//! The voucher system facade.
//!
//! [`VoucherSystem`] owns the manager registry, the per-key value caches, the dedup index and
//! the name table. Tests and embedders build private systems; a process that wants a single
//! shared instance publishes one with [`install`] and reaches it through [`global`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use smallvec::SmallVec;
use tracing::debug;
use voucher_recipe::{AttrKey, KEY_NUM, RecipeCommand, RecipeReader, VoucherName};

use crate::cache::{EntrySnapshot, TableStats};
use crate::config::VoucherConfig;
use crate::dedup::DedupIndex;
use crate::error::{ConfigError, RegisterError, Result, VoucherError};
use crate::exec::{Executor, RecipeStep};
use crate::manager::{AttrControl, AttrManager, ManagerFlags};
use crate::names::NameTable;
use crate::registry::ManagerRegistry;
use crate::value::{ValueHandle, ValueIndex};
use crate::voucher::Voucher;

static NEXT_SYSTEM_ID: AtomicU64 = AtomicU64::new(1);

/// State shared by a system and every voucher it created.
pub(crate) struct Shared {
	pub(crate) id: u64,
	pub(crate) config: VoucherConfig,
	pub(crate) registry: ManagerRegistry,
	pub(crate) index: DedupIndex,
	pub(crate) names: NameTable,
}

/// Collects manager registrations before the system goes live.
pub struct SystemBuilder {
	id: u64,
	config: VoucherConfig,
	registry: ManagerRegistry,
}

impl SystemBuilder {
	/// Binds `key` to `manager`, seeding the key's cache with `default_value` at index 0.
	///
	/// Returns the key's control, the only capability that can install raw value handles for
	/// the key or read them back.
	pub fn register<M: AttrManager>(
		&mut self,
		key: AttrKey,
		manager: Arc<M>,
		default_value: ValueHandle,
		flags: ManagerFlags,
	) -> Result<AttrControl, RegisterError> {
		self.registry.register(key, manager, default_value, flags, &self.config)?;
		debug!(%key, %default_value, ?flags, "registered attribute manager");
		Ok(AttrControl::new(self.id, key))
	}

	pub fn build(self) -> VoucherSystem {
		VoucherSystem {
			shared: Arc::new(Shared {
				id: self.id,
				config: self.config,
				registry: self.registry,
				index: DedupIndex::default(),
				names: NameTable::default(),
			}),
		}
	}
}

/// A live voucher system. Cloning yields another handle to the same system.
#[derive(Clone)]
pub struct VoucherSystem {
	pub(crate) shared: Arc<Shared>,
}

impl VoucherSystem {
	/// Starts a system with the given table sizing.
	pub fn builder(config: VoucherConfig) -> Result<SystemBuilder, ConfigError> {
		config.validate()?;
		Ok(SystemBuilder {
			id: NEXT_SYSTEM_ID.fetch_add(1, Ordering::Relaxed),
			config,
			registry: ManagerRegistry::default(),
		})
	}

	pub fn config(&self) -> &VoucherConfig {
		&self.shared.config
	}

	pub fn registry(&self) -> &ManagerRegistry {
		&self.shared.registry
	}

	/// Builds a voucher from an encoded recipe.
	///
	/// `previous_voucher` fields are resolved through the name table. `control` authorizes
	/// `SetValueHandle` items for its own key. Either the finished voucher is returned or
	/// nothing changes.
	pub fn create(&self, recipe: &[u8], control: Option<&AttrControl>) -> Result<Voucher> {
		self.execute(control, |executor| {
			for item in RecipeReader::new(recipe) {
				let item = item?;
				let previous = item.previous.map(|name| self.resolve_name(name)).transpose()?;
				executor.apply(item.key, item.command, previous.as_ref(), item.content)?;
			}
			Ok(())
		})
	}

	/// Builds a voucher from typed recipe steps.
	pub fn create_from_steps(&self, steps: &[RecipeStep], control: Option<&AttrControl>) -> Result<Voucher> {
		self.execute(control, |executor| {
			steps
				.iter()
				.try_for_each(|step| executor.apply(step.key, step.command, step.previous.as_ref(), &step.content))
		})
	}

	/// Derives the voucher to send: every key copied, then `SendPreprocess` for each manager
	/// that asked for it.
	pub fn send_preprocess(&self, voucher: &Voucher) -> Result<Voucher> {
		self.process(voucher, ManagerFlags::SEND_PREPROCESS, RecipeCommand::SendPreprocess)
	}

	/// Derives the voucher a receiver adopts: every key copied, then `AutoRedeem` for each
	/// manager that asked for it.
	pub fn receive_postprocess(&self, voucher: &Voucher) -> Result<Voucher> {
		self.process(voucher, ManagerFlags::AUTO_REDEEM, RecipeCommand::AutoRedeem)
	}

	fn process(&self, voucher: &Voucher, flag: ManagerFlags, command: RecipeCommand) -> Result<Voucher> {
		let keys: SmallVec<[AttrKey; KEY_NUM]> = self
			.shared
			.registry
			.iter()
			.filter(|(_, registration)| registration.flags().contains(flag))
			.map(|(_, registration)| registration.key())
			.collect();
		if keys.is_empty() {
			return Ok(voucher.clone());
		}
		self.execute(None, |executor| {
			executor.apply(AttrKey::ALL, RecipeCommand::Copy, Some(voucher), &[])?;
			keys.iter().try_for_each(|&key| executor.apply(key, command, None, &[]))
		})
	}

	fn execute<'c>(&self, control: Option<&'c AttrControl>, run: impl FnOnce(&mut Executor<'c>) -> Result<()>) -> Result<Voucher> {
		let mut executor = Executor::new(&self.shared, control)?;
		match run(&mut executor) {
			Ok(()) => Ok(executor.finish()),
			Err(err) => {
				debug!(%err, "voucher construction aborted");
				Err(err)
			}
		}
	}

	pub(crate) fn check_owner(&self, voucher: &Voucher) -> Result<()> {
		if Arc::ptr_eq(voucher.shared(), &self.shared) {
			Ok(())
		} else {
			Err(VoucherError::InvalidCapability("voucher belongs to another system".into()))
		}
	}

	pub(crate) fn check_control(&self, control: &AttrControl) -> Result<()> {
		if control.system() == self.shared.id {
			Ok(())
		} else {
			Err(VoucherError::InvalidCapability(format!("control for key {} belongs to another system", control.key())))
		}
	}

	fn resolve_name(&self, name: VoucherName) -> Result<Voucher> {
		self.shared
			.names
			.lookup(name)
			.ok_or_else(|| VoucherError::InvalidCapability(format!("no voucher named {}", name.get())))
	}

	/// Names `voucher` for use in encoded recipes, adding one user reference to the name.
	///
	/// The name table keeps the voucher alive until every user reference is released with
	/// [`Self::release_name`].
	pub fn make_name(&self, voucher: &Voucher) -> Result<VoucherName> {
		self.check_owner(voucher)?;
		Ok(self.shared.names.make(voucher))
	}

	/// Returns a new reference to the voucher bound to `name`.
	pub fn lookup_name(&self, name: VoucherName) -> Option<Voucher> {
		self.shared.names.lookup(name)
	}

	/// Drops one user reference to `name`.
	pub fn release_name(&self, name: VoucherName) -> Result<()> {
		if self.shared.names.release(name) {
			Ok(())
		} else {
			Err(VoucherError::InvalidCapability(format!("no voucher named {}", name.get())))
		}
	}

	pub fn table_stats(&self, key: AttrKey) -> Result<TableStats> {
		let (_, registration) = self.shared.registry.resolve(key)?;
		Ok(registration.table().stats())
	}

	/// Snapshot of one cache entry, `None` if the index is out of range.
	pub fn entry(&self, key: AttrKey, index: ValueIndex) -> Result<Option<EntrySnapshot>> {
		let (_, registration) = self.shared.registry.resolve(key)?;
		Ok(registration.table().entry(index))
	}

	/// Number of vouchers currently published in the dedup index.
	pub fn published_count(&self) -> usize {
		self.shared.index.len()
	}

	/// Number of live voucher names.
	pub fn name_count(&self) -> usize {
		self.shared.names.len()
	}
}

impl fmt::Debug for VoucherSystem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VoucherSystem")
			.field("id", &self.shared.id)
			.field("config", &self.shared.config)
			.field("registry", &self.shared.registry)
			.field("published", &self.published_count())
			.finish()
	}
}

static GLOBAL: OnceLock<VoucherSystem> = OnceLock::new();

/// Publishes `system` as the process-wide instance. Fails, handing the system back, if one
/// was already installed.
pub fn install(system: VoucherSystem) -> std::result::Result<(), VoucherSystem> {
	GLOBAL.set(system)
}

/// The process-wide system, if one was installed.
pub fn global() -> Option<&'static VoucherSystem> {
	GLOBAL.get()
}
