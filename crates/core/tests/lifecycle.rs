//! End-to-end voucher lifecycle through the public API with an out-of-crate manager.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use voucher_core::{
	AttrKey, AttrManager, ExtractedContent, ManagedValue, ManagerError, ManagerFlags, RecipeCommand, RecipeItem, RecipeStep, ValueHandle,
	VoucherConfig, VoucherError, VoucherSystem,
};

/// Counts importance assertions per process id. Content is the process id as a
/// little-endian `u32`; the handle is the process id itself.
#[derive(Default)]
struct ImportanceManager {
	assertions: Mutex<HashMap<u64, u32>>,
}

impl ImportanceManager {
	fn assertions(&self, pid: u32) -> u32 {
		self.assertions.lock().get(&u64::from(pid)).copied().unwrap_or(0)
	}
}

impl AttrManager for ImportanceManager {
	fn get_value(&self, _key: AttrKey, command: RecipeCommand, previous: &[ValueHandle], content: &[u8]) -> Result<ManagedValue, ManagerError> {
		let handle = match command {
			RecipeCommand::IMPORTANCE_SELF => {
				let pid: [u8; 4] = content.try_into().map_err(|_| ManagerError::InvalidArgument)?;
				ValueHandle(u64::from(u32::from_le_bytes(pid)))
			}
			RecipeCommand::Redeem | RecipeCommand::AutoRedeem => match previous.first() {
				Some(&handle) => handle,
				None => return Ok(ManagedValue::persistent(ValueHandle(0))),
			},
			_ => return Err(ManagerError::NotSupported),
		};
		*self.assertions.lock().entry(handle.0).or_default() += 1;
		Ok(ManagedValue::new(handle))
	}

	fn release_value(&self, _key: AttrKey, value: ValueHandle, made: u32) -> Result<(), ManagerError> {
		let mut assertions = self.assertions.lock();
		match assertions.get(&value.0) {
			Some(&count) if count == made => {
				assertions.remove(&value.0);
				Ok(())
			}
			_ => Err(ManagerError::InUse),
		}
	}

	fn extract_content(&self, _key: AttrKey, values: &[ValueHandle]) -> Result<ExtractedContent, ManagerError> {
		let handle = values.first().ok_or(ManagerError::InvalidArgument)?;
		let pid = u32::try_from(handle.0).map_err(|_| ManagerError::InvalidArgument)?;
		Ok(ExtractedContent {
			command: RecipeCommand::IMPORTANCE_SELF,
			content: pid.to_le_bytes().to_vec(),
		})
	}
}

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn system() -> (VoucherSystem, Arc<ImportanceManager>) {
	init_tracing();
	let config = VoucherConfig::from_toml("initial_table_size = 8\nmax_table_size = 64\n").unwrap();
	let manager = Arc::new(ImportanceManager::default());
	let mut builder = VoucherSystem::builder(config).unwrap();
	builder
		.register(AttrKey::IMPORTANCE, Arc::clone(&manager), ValueHandle(0), ManagerFlags::AUTO_REDEEM)
		.unwrap();
	(builder.build(), manager)
}

fn assert_self(pid: u32) -> Vec<u8> {
	let content = pid.to_le_bytes();
	let mut recipe = Vec::new();
	RecipeItem::new(AttrKey::IMPORTANCE, RecipeCommand::IMPORTANCE_SELF, &content).encode(&mut recipe);
	recipe
}

#[test]
fn voucher_round_trips_through_wire_names_and_extraction() {
	let (system, manager) = system();

	let voucher = system.create(&assert_self(42), None).unwrap();
	assert_eq!(system.create(&assert_self(42), None).unwrap(), voucher);
	assert_eq!(manager.assertions(42), 2);

	let name = system.make_name(&voucher).unwrap();
	let mut redeem = Vec::new();
	RecipeItem::new(AttrKey::ALL, RecipeCommand::Redeem, &[])
		.with_previous(Some(name))
		.encode(&mut redeem);
	let redeemed = system.create(&redeem, None).unwrap();
	assert_eq!(redeemed, voucher);

	let recipe = system.extract_all_attr_recipes_to_vec(&voucher).unwrap();
	assert_eq!(recipe, assert_self(42));

	let received = system.receive_postprocess(&voucher).unwrap();
	assert_eq!(received, voucher);

	drop((voucher, redeemed, received));
	assert!(manager.assertions(42) > 0, "name still holds the voucher");
	system.release_name(name).unwrap();

	assert_eq!(manager.assertions(42), 0);
	assert_eq!(system.published_count(), 0);
	assert_eq!(system.table_stats(AttrKey::IMPORTANCE).unwrap().live, 1);
}

#[test]
fn rejected_and_unauthorized_requests() {
	let (system, manager) = system();

	let err = system
		.create_from_steps(&[RecipeStep::new(AttrKey::IMPORTANCE, RecipeCommand::IMPORTANCE_SELF, vec![1, 2])], None)
		.unwrap_err();
	assert_eq!(
		err,
		VoucherError::Manager {
			key: AttrKey::IMPORTANCE,
			source: ManagerError::InvalidArgument,
		}
	);

	let err = system
		.create_from_steps(&[RecipeStep::set_value_handle(AttrKey::IMPORTANCE, ValueHandle(7))], None)
		.unwrap_err();
	assert!(matches!(err, VoucherError::InvalidCapability(_)));

	let err = system
		.create_from_steps(&[RecipeStep::new(AttrKey::BANK, RecipeCommand::Redeem, Vec::new())], None)
		.unwrap_err();
	assert!(matches!(err, VoucherError::InvalidArgument(_)));

	assert_eq!(manager.assertions.lock().len(), 0);
	assert_eq!(system.published_count(), 0);
}
