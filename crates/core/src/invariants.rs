//! System-level invariants.
//!
//! - Identical contents always resolve to one live voucher.
//!   - Enforced in: `DedupIndex::get_or_insert` (re-check under the write lock).
//!   - Tested by: `invariants::test_concurrent_creates_share_one_voucher`
//!   - Failure symptom: Two live vouchers compare equal by content but not by identity.
//!
//! - A lookup never revives a voucher whose last reference is being dropped.
//!   - Enforced in: `DedupIndex::lookup` (weak upgrade), `VoucherInner::drop`.
//!   - Tested by: `invariants::test_create_drop_churn_settles`
//!   - Failure symptom: Use of a torn-down voucher, or grants never returned to the manager.
//!
//! - Rejected recipes leave no cache references or manager grants behind.
//!   - Enforced in: `VoucherBuilder::drop`.
//!   - Tested by: `invariants::test_rejected_recipes_leave_no_trace`
//!   - Failure symptom: Cache tables grow without bound under failing requests.

use std::sync::Barrier;

use voucher_recipe::AttrKey;

use crate::exec::RecipeStep;
use crate::test_fixtures::{Fixture, REJECT, store};
use crate::voucher::Voucher;

const THREADS: usize = 8;

fn assert_settled(fx: &Fixture) {
	assert_eq!(fx.user_data.outstanding(), 0);
	assert_eq!(fx.test.outstanding(), 0);
	assert_eq!(fx.system.published_count(), 0);
	for key in [AttrKey::USER_DATA, AttrKey::TEST] {
		let stats = fx.system.table_stats(key).unwrap();
		assert_eq!(stats.live, 1, "key {key} kept entries: {stats:?}");
	}
}

/// Invariant: concurrent creators of the same contents all receive the same voucher.
pub(crate) fn inv_concurrent_creates_share_one_voucher() {
	let fx = &Fixture::new();
	let barrier = &Barrier::new(THREADS);

	let vouchers: Vec<Voucher> = std::thread::scope(|s| {
		let handles: Vec<_> = (0..THREADS)
			.map(|_| {
				s.spawn(move || {
					barrier.wait();
					fx.create(&[store(AttrKey::USER_DATA, b"same"), store(AttrKey::TEST, b"same")])
				})
			})
			.collect();
		handles.into_iter().map(|h| h.join().unwrap()).collect()
	});

	assert!(vouchers.iter().all(|v| v.ptr_eq(&vouchers[0])));
	assert_eq!(vouchers[0].ref_count(), THREADS);
	assert_eq!(fx.system.published_count(), 1);
	assert_eq!(fx.user_data.grants(b"same"), THREADS as u32);

	drop(vouchers);
	assert_eq!(fx.user_data.release_count(b"same"), 1);
	assert_settled(fx);
}

#[cfg_attr(test, test)]
pub(crate) fn test_concurrent_creates_share_one_voucher() {
	inv_concurrent_creates_share_one_voucher()
}

/// Invariant: vouchers repeatedly created and dropped from many threads settle with every
/// grant returned.
pub(crate) fn inv_create_drop_churn_settles() {
	let fx = &Fixture::new();
	let barrier = &Barrier::new(THREADS);

	std::thread::scope(|s| {
		for thread in 0..THREADS {
			s.spawn(move || {
				barrier.wait();
				for round in 0..200u32 {
					let content = [(round % 3) as u8];
					let steps = [store(AttrKey::USER_DATA, &content), store(AttrKey::TEST, &[(thread % 2) as u8])];
					let voucher = fx.create(&steps);
					let copy = fx.create(&[RecipeStep::copy(AttrKey::ALL, &voucher)]);
					assert!(copy.ptr_eq(&voucher));
				}
			});
		}
	});

	assert_settled(fx);
}

#[cfg_attr(test, test)]
pub(crate) fn test_create_drop_churn_settles() {
	inv_create_drop_churn_settles()
}

/// Invariant: a recipe rejected at any item leaves no references behind.
pub(crate) fn inv_rejected_recipes_leave_no_trace() {
	let fx = Fixture::new();
	let keep = fx.create(&[store(AttrKey::USER_DATA, b"keep")]);

	for fail_at in 0..4 {
		let mut steps = vec![
			RecipeStep::copy(AttrKey::ALL, &keep),
			store(AttrKey::TEST, b"t"),
			store(AttrKey::USER_DATA, b"u"),
			store(AttrKey::TEST, b"t2"),
		];
		steps[fail_at] = store(AttrKey::TEST, REJECT);
		assert!(fx.system.create_from_steps(&steps, None).is_err());
	}

	assert_eq!(keep.ref_count(), 1);
	let index = keep.value_index(AttrKey::USER_DATA).unwrap();
	let entry = fx.system.entry(AttrKey::USER_DATA, index).unwrap().unwrap();
	assert_eq!((entry.refs, entry.made), (1, 1));
	assert_eq!(fx.system.published_count(), 1);

	drop(keep);
	assert_settled(&fx);
}

#[cfg_attr(test, test)]
pub(crate) fn test_rejected_recipes_leave_no_trace() {
	inv_rejected_recipes_leave_no_trace()
}
