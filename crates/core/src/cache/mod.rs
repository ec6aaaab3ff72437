#![cfg_attr(doc, allow(rustdoc::private_intra_doc_links))]
//! Per-key value cache tables.
//!
//! # Purpose
//!
//! Each registered attribute key owns one [`ValueCacheTable`]. The table stores every distinct
//! value handle the key's manager has granted exactly once, so vouchers can refer to values by
//! a small dense [`crate::ValueIndex`] and two vouchers carrying the same value carry the same
//! index.
//!
//! # Mental Model
//!
//! The table is an arena: a `Vec` of entries, a free list threaded through the unused ones and
//! a fixed array of hash chain heads. Growth doubles the arena and appends the new slots to the
//! free list; it never moves an entry to a different index.
//!
//! Releasing the last reference hands the value back to the manager with the table unlocked.
//! While the callback runs the entry is marked `RELEASING` and stays findable, so a concurrent
//! grant of the same value can resurrect it. The entry's grant count acts as the fencing token
//! that tells the releasing thread whether that happened.
//!
//! # Invariants
//!
//! - Index 0 holds the default value, is persistent and never reaches the free list.
//!   - Enforced in: [`ValueCacheTable::new`], [`ValueCacheTable::release`].
//!   - Tested by: [`invariants::test_default_entry_is_permanent`]
//!   - Failure symptom: Default-valued slots decode to a stale handle.
//!
//! - Indices survive growth unchanged.
//!   - Enforced in: `ValueCacheTable::grow` (copies index-for-index).
//!   - Tested by: [`invariants::test_growth_preserves_indices`]
//!   - Failure symptom: Vouchers silently change value after unrelated inserts.
//!
//! - A value is never handed back to its manager while a reference to its entry exists.
//!   - Enforced in: [`ValueCacheTable::release`] (grant-count revalidation).
//!   - Tested by: [`invariants::test_release_races_re_reference`]
//!   - Failure symptom: Use-after-release of manager state.
//!
//! - Grants the manager consumed during a racing release are folded out of the grant count.
//!   - Enforced in: [`ValueCacheTable::release`] (`made -= token` when the count moved).
//!   - Tested by: [`invariants::test_release_folds_with_live_reference`]
//!   - Failure symptom: The surviving entry can never be released again.
//!
//! - No entry stays `RELEASING` after its release call returns.
//!   - Enforced in: [`ValueCacheTable::release`] (flag cleared on every exit but the free path).
//!   - Tested by: [`invariants::test_release_never_strands_entry`]
//!   - Failure symptom: Entry leaks; later releases of it become no-ops.
//!
//! - At most one growth runs per table.
//!   - Enforced in: `ValueCacheTable::grow` (`growing` flag and condition variable).
//!   - Tested by: [`invariants::test_concurrent_growth`]
//!   - Failure symptom: Entries inserted during a growth vanish.

mod entry;
mod table;

pub use entry::{EntryFlags, EntrySnapshot, TableStats};
pub use table::ValueCacheTable;

#[cfg(any(test, doc))]
pub(crate) mod invariants;
