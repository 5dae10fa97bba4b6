extern crate std;

use std::{collections::BTreeSet, mem, ops::Bound, prelude::v1::*, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlTree, Error, Links, Split, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
}

impl TestNode {
    pub fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

/// Builds a tree by inserting `keys` in order, skipping duplicates.
pub fn tree_of(keys: &[u32]) -> AvlTree<TestNode> {
    let mut tree = AvlTree::new();
    for &key in keys {
        let _ = tree.insert(TestNode::new(key));
    }
    tree
}

/// Returns the keys of `tree` in iteration order.
pub fn keys_of(tree: &AvlTree<TestNode>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Side {
    Left,
    Right,
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    FingerInsert(ItemValue),
    Get(ItemValue),
    Remove(ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
    /// Splits at the value, then joins the halves back from the given side.
    SplitJoin(ItemValue, Side),
    /// Splits at the value and keeps only one half.
    SplitRetain(ItemValue, Side),
}

impl Op {
    fn finalize(self, sorted: &[u32]) -> FinalOp {
        fn get_value(v: &[u32], i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_value(sorted, item)),
            Op::FingerInsert(item) => FinalOp::FingerInsert(get_value(sorted, item)),
            Op::Get(item) => FinalOp::Get(get_value(sorted, item)),
            Op::Remove(item) => FinalOp::Remove(get_value(sorted, item)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
            Op::SplitJoin(item, side) => FinalOp::SplitJoin(get_value(sorted, item), side),
            Op::SplitRetain(item, side) => FinalOp::SplitRetain(get_value(sorted, item), side),
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    FingerInsert(u32),
    Get(u32),
    Remove(u32),
    First,
    PopFirst,
    Last,
    PopLast,
    SplitJoin(u32, Side),
    SplitRetain(u32, Side),
}

fn side_strategy() -> impl Strategy<Value = Side> {
    proptest::prop_oneof![Just(Side::Left), Just(Side::Right)]
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::FingerInsert),
        value_strategy().prop_map(Op::Get),
        value_strategy().prop_map(Op::Remove),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
        (value_strategy(), side_strategy()).prop_map(|(v, s)| Op::SplitJoin(v, s)),
        (value_strategy(), side_strategy()).prop_map(|(v, s)| Op::SplitRetain(v, s)),
    ]
}

// Splits `tree` at `value`, checking both halves against `btree`. Returns `None`, leaving `tree`
// untouched, if `value` is not in the tree.
fn checked_split(
    tree: &mut AvlTree<TestNode>,
    btree: &BTreeSet<u32>,
    value: u32,
) -> Option<Split<TestNode>> {
    let Some(node) = tree.search(&value).node else {
        assert!(!btree.contains(&value));
        return None;
    };

    let split = unsafe { mem::take(tree).split(node) };

    split.left.assert_invariants();
    split.right.assert_invariants();
    assert_eq!(split.pivot.key, value);

    let below: Vec<u32> = btree.range(..value).copied().collect();
    let above: Vec<u32> = btree
        .range((Bound::Excluded(value), Bound::Unbounded))
        .copied()
        .collect();
    assert_eq!(keys_of(&split.left), below);
    assert_eq!(keys_of(&split.right), above);

    Some(split)
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut sorted_values = Vec::with_capacity(ops.len());
    let mut btree = BTreeSet::new();
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    fn insert_sorted(v: &mut Vec<u32>, value: u32) {
        if let Err(idx) = v.binary_search(&value) {
            v.insert(idx, value);
        }
    }

    fn remove_sorted(v: &mut Vec<u32>, value: u32) {
        if let Ok(idx) = v.binary_search(&value) {
            v.remove(idx);
        }
    }

    #[inline]
    #[allow(clippy::boxed_local)]
    fn node_key(node: Box<TestNode>) -> u32 {
        node.key
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&sorted_values);

        match final_op {
            FinalOp::Insert(value) | FinalOp::FingerInsert(value) => {
                insert_sorted(&mut sorted_values, value);

                let from_btree = (!btree.insert(value)).then_some(value);

                let node = TestNode::new(value);
                let result = match final_op {
                    FinalOp::Insert(_) => avl.insert(node),
                    _ => avl.finger_insert(node),
                };
                let from_avl = match result {
                    Ok(insertion) => {
                        assert!(insertion.edges >= 1);
                        assert_eq!(unsafe { insertion.node.as_ref().key }, value);
                        None
                    }
                    Err(rejected) => {
                        assert_eq!(rejected.error, Error::DuplicateKey);
                        Some(node_key(rejected.payload))
                    }
                };

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Get(value) => {
                let from_btree = btree.get(&value).copied();

                let search = avl.search(&value);
                let finger = avl.finger_search(&value);
                let from_avl = search.node.map(|node| unsafe { node.as_ref().key });

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
                assert_eq!(search.node, finger.node, "FinalOp #{op_id}: {final_op:?}");
                assert!(search.path_len >= 1 && finger.path_len >= 1);
            }

            FinalOp::Remove(value) => {
                remove_sorted(&mut sorted_values, value);

                let from_btree = btree.remove(&value).then_some(value);
                let from_avl = avl.remove_key(&value).map(node_key);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_btree = btree.first().copied();
                let from_avl = avl.first().map(|node| node.key);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_btree = btree.pop_first();
                let from_avl = avl.pop_first().map(node_key);

                if let Some(value) = from_btree {
                    remove_sorted(&mut sorted_values, value);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_btree = btree.last().copied();
                let from_avl = avl.max_node().map(|node| node.key);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_btree = btree.pop_last();
                let from_avl = avl.pop_last().map(node_key);

                if let Some(value) = from_btree {
                    remove_sorted(&mut sorted_values, value);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::SplitJoin(value, side) => {
                if let Some(Split { left, pivot, right }) = checked_split(&mut avl, &btree, value) {
                    avl = match side {
                        Side::Left => {
                            let mut joined = left;
                            joined.join(right, pivot).expect("halves are ordered");
                            joined
                        }
                        Side::Right => {
                            let mut joined = right;
                            joined.join(left, pivot).expect("halves are ordered");
                            joined
                        }
                    };
                }
            }

            FinalOp::SplitRetain(value, side) => {
                if let Some(split) = checked_split(&mut avl, &btree, value) {
                    avl = match side {
                        Side::Left => split.left,
                        Side::Right => split.right,
                    };

                    btree.retain(|&k| match side {
                        Side::Left => k < value,
                        Side::Right => k > value,
                    });
                    sorted_values = btree.iter().copied().collect();
                }
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree.iter().zip(avl.iter()).all(|(&a, b)| a == b.key));
    }
}

#[derive(Clone, Debug)]
pub struct SplitJoinInput {
    pub values: Vec<u32>,
    pub at: usize,
    pub join_from: Side,
}

impl<'a> arbitrary::Arbitrary<'a> for SplitJoinInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        fn value(u: &mut arbitrary::Unstructured<'_>) -> u32 {
            u32::arbitrary(u).unwrap_or(0)
        }

        let num_values = u16::arbitrary(u)? % 1000;

        let values = core::iter::repeat_with(|| value(u))
            .take(num_values.into())
            .collect();

        let at = usize::arbitrary(u)?;
        let join_from = Side::arbitrary(u)?;

        Ok(SplitJoinInput {
            values,
            at,
            join_from,
        })
    }
}

pub fn split_join_strategy() -> impl Strategy<Value = SplitJoinInput> {
    (
        proptest::collection::vec(0u32..10_000, 0..500),
        0usize..1000,
        side_strategy(),
    )
        .prop_map(|(values, at, join_from)| SplitJoinInput {
            values,
            at,
            join_from,
        })
}

/// Splits a tree built from `input.values` at one of its keys, compares the halves with a naive
/// partition of the keys and joins them back together.
pub fn run_split_join_equivalence(input: SplitJoinInput) {
    let SplitJoinInput {
        values,
        at,
        join_from,
    } = input;

    let mut tree = tree_of(&values);
    tree.assert_invariants();

    let mut sorted = values;
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(keys_of(&tree), sorted);

    if sorted.is_empty() {
        return;
    }

    let pivot_idx = at % sorted.len();
    let pivot_key = sorted[pivot_idx];
    let original_height = tree.height();

    let node = tree.search(&pivot_key).node.expect("pivot is in the tree");
    let Split {
        mut left,
        pivot,
        right,
    } = unsafe { mem::take(&mut tree).split(node) };

    left.assert_invariants();
    right.assert_invariants();
    assert_eq!(pivot.key, pivot_key);
    assert_eq!(keys_of(&left), &sorted[..pivot_idx]);
    assert_eq!(keys_of(&right), &sorted[pivot_idx + 1..]);
    assert!(left.height() <= original_height);
    assert!(right.height() <= original_height);

    // A separator that collides with a key of either half must be refused.
    let (mut left, right) = match left.max_node().map(|node| node.key) {
        Some(left_max) => {
            let rejected = left
                .join(right, TestNode::new(left_max))
                .expect_err("separator equal to a key");
            assert_eq!(rejected.error, Error::UnorderedJoin);
            left.assert_invariants();
            let (right, _) = rejected.into_payload();
            (left, right)
        }
        None => (left, right),
    };

    let height_diff = (left.height() - right.height()).unsigned_abs() as usize;

    let joined = match join_from {
        Side::Left => {
            let before = left.rotations();
            left.join(right, pivot).expect("halves are ordered");
            assert!(left.rotations() - before <= 2 * (height_diff + 2));
            left
        }
        Side::Right => {
            let mut right = right;
            let before = right.rotations();
            right.join(left, pivot).expect("halves are ordered");
            assert!(right.rotations() - before <= 2 * (height_diff + 2));
            right
        }
    };

    joined.assert_invariants();
    assert_eq!(keys_of(&joined), sorted);
}
