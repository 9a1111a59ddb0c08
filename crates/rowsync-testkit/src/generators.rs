//! Proptest generators for property-based testing.
//!
//! Keys are drawn from a small space so pages and live events collide
//! often.

use proptest::prelude::*;

use rowsync_core::ChangeEvent;
use rowsync_store::RowCollection;

use crate::fixtures::TestRow;

/// Keys are drawn from `0..KEY_SPACE`.
pub const KEY_SPACE: u64 = 16;

/// Generate a primary key.
pub fn key() -> impl Strategy<Value = u64> {
    0..KEY_SPACE
}

/// Generate an optional payload.
pub fn name() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[a-z]{1,4}")
}

/// Generate a keyed row.
pub fn test_row() -> impl Strategy<Value = TestRow> {
    (key(), name()).prop_map(|(id, name)| TestRow { id: Some(id), name })
}

/// Generate a row that occasionally lacks its primary key.
pub fn maybe_keyless_row() -> impl Strategy<Value = TestRow> {
    prop_oneof![
        9 => test_row(),
        1 => "[a-z]{1,4}".prop_map(TestRow::keyless),
    ]
}

/// Generate a page of up to `max_len` rows.
pub fn page(max_len: usize) -> impl Strategy<Value = Vec<TestRow>> {
    prop::collection::vec(maybe_keyless_row(), 0..=max_len)
}

/// One input to the collection store.
#[derive(Debug, Clone)]
pub enum MergeOp {
    Page(Vec<TestRow>),
    Insert(TestRow),
    Update(TestRow),
    Delete(TestRow),
    Reset,
}

impl Arbitrary for MergeOp {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            3 => page(6).prop_map(MergeOp::Page),
            3 => maybe_keyless_row().prop_map(MergeOp::Insert),
            2 => maybe_keyless_row().prop_map(MergeOp::Update),
            2 => maybe_keyless_row().prop_map(MergeOp::Delete),
            1 => Just(MergeOp::Reset),
        ]
        .boxed()
    }
}

/// Apply one operation to a collection.
pub fn apply_op<C: RowCollection<TestRow> + ?Sized>(collection: &C, op: MergeOp) {
    match op {
        MergeOp::Page(rows) => {
            collection.apply_snapshot_page(rows);
        }
        MergeOp::Insert(row) => {
            collection.apply_live_event(ChangeEvent::insert(row));
        }
        MergeOp::Update(row) => {
            collection.apply_live_event(ChangeEvent::update(row));
        }
        MergeOp::Delete(row) => {
            collection.apply_live_event(ChangeEvent::delete(row));
        }
        MergeOp::Reset => collection.reset(),
    }
}
