//! Shared test manager and system fixtures.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use voucher_recipe::{AttrKey, RecipeCommand};

use crate::config::VoucherConfig;
use crate::error::ManagerError;
use crate::exec::RecipeStep;
use crate::manager::{AttrControl, AttrManager, ExtractedContent, ManagerFlags};
use crate::system::VoucherSystem;
use crate::value::{ManagedValue, ValueHandle};
use crate::voucher::Voucher;

pub(crate) const DEFAULT: ValueHandle = ValueHandle(0);

/// Content that makes [`CountingManager::get_value`] fail.
pub(crate) const REJECT: &[u8] = b"reject";

/// Suffix [`CountingManager`] appends to content on `SendPreprocess`.
pub(crate) const SENT_SUFFIX: &[u8] = b"@sent";

/// Manager-defined `command` code that echoes the stored content.
pub(crate) const CMD_ECHO: u32 = 1;

pub(crate) fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_max_level(tracing::Level::TRACE)
		.try_init();
}

#[derive(Default)]
struct ManagerState {
	handles: FxHashMap<Vec<u8>, ValueHandle>,
	contents: FxHashMap<ValueHandle, Vec<u8>>,
	grants: FxHashMap<ValueHandle, u32>,
	released: Vec<ValueHandle>,
	get_value_calls: usize,
}

impl ManagerState {
	fn grant(&mut self, content: &[u8]) -> ValueHandle {
		let next = ValueHandle(self.handles.len() as u64 + 1);
		let handle = *self.handles.entry(content.to_vec()).or_insert(next);
		self.contents.entry(handle).or_insert_with(|| content.to_vec());
		*self.grants.entry(handle).or_default() += 1;
		handle
	}

	fn regrant(&mut self, handle: ValueHandle) -> ValueHandle {
		*self.grants.entry(handle).or_default() += 1;
		handle
	}
}

/// Interns content bytes into handles and counts every grant it makes, releasing a value
/// only when the cache names all of them.
#[derive(Default)]
pub(crate) struct CountingManager {
	state: Mutex<ManagerState>,
	stash: Mutex<Vec<Voucher>>,
}

impl CountingManager {
	/// Grants `content` outside any recipe, as a manager does before installing a raw handle.
	pub(crate) fn grant(&self, content: &[u8]) -> ValueHandle {
		self.state.lock().grant(content)
	}

	pub(crate) fn handle_of(&self, content: &[u8]) -> Option<ValueHandle> {
		self.state.lock().handles.get(content).copied()
	}

	/// Grants of `content` not yet released.
	pub(crate) fn grants(&self, content: &[u8]) -> u32 {
		let state = self.state.lock();
		state
			.handles
			.get(content)
			.and_then(|handle| state.grants.get(handle))
			.copied()
			.unwrap_or(0)
	}

	/// Grants of every value not yet released.
	pub(crate) fn outstanding(&self) -> u32 {
		self.state.lock().grants.values().sum()
	}

	pub(crate) fn released(&self) -> Vec<ValueHandle> {
		self.state.lock().released.clone()
	}

	pub(crate) fn release_count(&self, content: &[u8]) -> usize {
		let state = self.state.lock();
		let Some(handle) = state.handles.get(content) else {
			return 0;
		};
		state.released.iter().filter(|released| *released == handle).count()
	}

	pub(crate) fn get_value_calls(&self) -> usize {
		self.state.lock().get_value_calls
	}

	/// Holds `voucher` until the next successful release, which drops it from inside the
	/// callback.
	pub(crate) fn stash(&self, voucher: Voucher) {
		self.stash.lock().push(voucher);
	}

	pub(crate) fn clear_stash(&self) {
		let stashed = std::mem::take(&mut *self.stash.lock());
		drop(stashed);
	}
}

impl AttrManager for CountingManager {
	fn get_value(
		&self,
		_key: AttrKey,
		command: RecipeCommand,
		previous: &[ValueHandle],
		content: &[u8],
	) -> Result<ManagedValue, ManagerError> {
		let mut state = self.state.lock();
		state.get_value_calls += 1;
		match command {
			RecipeCommand::Redeem | RecipeCommand::AutoRedeem => Ok(match previous.first() {
				Some(&handle) => ManagedValue::new(state.regrant(handle)),
				None => ManagedValue::persistent(DEFAULT),
			}),
			RecipeCommand::SendPreprocess => {
				let Some(handle) = previous.first() else {
					return Ok(ManagedValue::persistent(DEFAULT));
				};
				let mut sent = state.contents.get(handle).cloned().ok_or(ManagerError::InvalidArgument)?;
				sent.extend_from_slice(SENT_SUFFIX);
				Ok(ManagedValue::new(state.grant(&sent)))
			}
			RecipeCommand::Manager(_) if content == REJECT => Err(ManagerError::InvalidArgument),
			RecipeCommand::Manager(_) => Ok(ManagedValue::new(state.grant(content))),
			_ => Err(ManagerError::NotSupported),
		}
	}

	fn release_value(&self, _key: AttrKey, value: ValueHandle, made: u32) -> Result<(), ManagerError> {
		{
			let mut state = self.state.lock();
			let granted = state.grants.get(&value).copied().unwrap_or(0);
			if granted != made {
				return Err(ManagerError::InUse);
			}
			state.grants.remove(&value);
			state.released.push(value);
		}
		self.clear_stash();
		Ok(())
	}

	fn extract_content(&self, _key: AttrKey, values: &[ValueHandle]) -> Result<ExtractedContent, ManagerError> {
		let state = self.state.lock();
		let content = values
			.first()
			.and_then(|handle| state.contents.get(handle))
			.ok_or(ManagerError::InvalidArgument)?;
		Ok(ExtractedContent {
			command: RecipeCommand::USER_DATA_STORE,
			content: content.clone(),
		})
	}

	fn command(&self, _key: AttrKey, values: &[ValueHandle], command: u32, input: &[u8]) -> Result<Vec<u8>, ManagerError> {
		if command != CMD_ECHO {
			return Err(ManagerError::NotSupported);
		}
		let state = self.state.lock();
		let mut out = values
			.first()
			.and_then(|handle| state.contents.get(handle))
			.cloned()
			.unwrap_or_default();
		out.extend_from_slice(input);
		Ok(out)
	}
}

/// A system with counting managers on [`AttrKey::USER_DATA`] and [`AttrKey::TEST`].
pub(crate) struct Fixture {
	pub(crate) system: VoucherSystem,
	pub(crate) user_data: Arc<CountingManager>,
	pub(crate) test: Arc<CountingManager>,
	pub(crate) user_data_control: AttrControl,
	pub(crate) test_control: AttrControl,
}

impl Fixture {
	pub(crate) fn new() -> Self {
		Self::with_flags(ManagerFlags::empty())
	}

	/// Both managers registered with `flags`.
	pub(crate) fn with_flags(flags: ManagerFlags) -> Self {
		init_tracing();
		let config = VoucherConfig {
			initial_table_size: 4,
			max_table_size: 1 << 12,
		};
		let user_data = Arc::new(CountingManager::default());
		let test = Arc::new(CountingManager::default());
		let mut builder = VoucherSystem::builder(config).unwrap();
		let user_data_control = builder.register(AttrKey::USER_DATA, Arc::clone(&user_data), DEFAULT, flags).unwrap();
		let test_control = builder.register(AttrKey::TEST, Arc::clone(&test), DEFAULT, flags).unwrap();
		Self {
			system: builder.build(),
			user_data,
			test,
			user_data_control,
			test_control,
		}
	}

	pub(crate) fn create(&self, steps: &[RecipeStep]) -> Voucher {
		self.system.create_from_steps(steps, None).unwrap()
	}
}

/// Stores `content` under `key`.
pub(crate) fn store(key: AttrKey, content: &[u8]) -> RecipeStep {
	RecipeStep::new(key, RecipeCommand::USER_DATA_STORE, content.to_vec())
}
