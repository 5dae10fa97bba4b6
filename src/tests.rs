extern crate std;

use std::{ops::Range, prelude::v1::*};

use cordyceps::Linked;
use proptest::prelude::*;

use crate::model::{self, keys_of, tree_of, TestNode};

use super::*;

fn insert_find_all(keys: &[u32]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        tree.insert(TestNode::new(key)).expect("keys are distinct");
        tree.assert_invariants();
    }

    for key in keys {
        let node = tree.search(key).node.expect("item not found");
        assert_eq!(unsafe { node.as_ref().key() }, key);

        let node = tree.finger_search(key).node.expect("item not found");
        assert_eq!(unsafe { node.as_ref().key() }, key);
    }
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn two_elems_find() {
    insert_find_all(&[0, 1]);
    insert_find_all(&[1, 0]);
}

#[test]
fn three_elems_find() {
    insert_find_all(&[0, 1, 2]);
    insert_find_all(&[0, 2, 1]);
    insert_find_all(&[1, 0, 2]);
    insert_find_all(&[1, 2, 0]);
    insert_find_all(&[2, 0, 1]);
    insert_find_all(&[2, 1, 0]);
}

// Calls `f` with every permutation of `0..n`.
fn for_each_permutation(n: u32, f: &mut dyn FnMut(&[u32])) {
    fn permute(keys: &mut Vec<u32>, k: usize, f: &mut dyn FnMut(&[u32])) {
        if k == keys.len() {
            f(&keys[..]);
            return;
        }

        for i in k..keys.len() {
            keys.swap(k, i);
            permute(keys, k + 1, f);
            keys.swap(k, i);
        }
    }

    permute(&mut (0..n).collect(), 0, f);
}

#[test]
fn four_elems_find() {
    for_each_permutation(4, &mut insert_find_all);
}

#[test]
fn six_elems_find() {
    for_each_permutation(6, &mut insert_find_all);
}

fn insert_remove_all(keys: &[u32]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        tree.insert(TestNode::new(key)).expect("keys are distinct");
        tree.assert_invariants();
    }

    for key in keys {
        let node = tree.search(key).node.expect("item not found");
        let removed = unsafe { tree.remove(node) };
        assert_eq!(removed.key, *key);
        tree.assert_invariants();
    }

    assert!(tree.is_empty());

    for &key in keys {
        tree.finger_insert(TestNode::new(key))
            .expect("keys are distinct");
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        let removed = tree.remove_key(key).expect("item not found");
        assert_eq!(removed.key, *key);
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
}

#[test]
fn remove_one() {
    insert_remove_all(&[0]);
}

#[test]
fn remove_two() {
    insert_remove_all(&[0, 1]);
    insert_remove_all(&[1, 0]);
}

#[test]
fn remove_three() {
    for_each_permutation(3, &mut insert_remove_all);
}

#[test]
fn remove_four() {
    for_each_permutation(4, &mut insert_remove_all);
}

#[test]
fn remove_six() {
    for_each_permutation(6, &mut insert_remove_all);
}

fn root_key(tree: &AvlTree<TestNode>) -> Option<u32> {
    tree.root().map(|node| node.key)
}

fn child_keys(tree: &AvlTree<TestNode>, key: u32) -> (Option<u32>, Option<u32>) {
    let node = tree.search(&key).node.expect("item not found");
    unsafe {
        let links = TestNode::links(node).as_ref();
        (
            links.left().map(|n| n.as_ref().key),
            links.right().map(|n| n.as_ref().key),
        )
    }
}

#[test]
fn empty_tree() {
    let tree = tree_of(&[]);

    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
    assert_eq!(tree.height(), -1);
    assert!(tree.root().is_none());
    assert!(tree.max_node().is_none());
    assert!(tree.first().is_none());
    assert_eq!(tree.iter().count(), 0);

    let search = tree.search(&1);
    assert!(search.node.is_none());
    assert_eq!(search.path_len, 1);

    let finger = tree.finger_search(&1);
    assert!(finger.node.is_none());
    assert_eq!(finger.path_len, 1);
}

#[test]
fn insert_keeps_shape() {
    let tree = tree_of(&[30, 20, 40, 10, 25]);
    tree.assert_invariants();

    assert_eq!(root_key(&tree), Some(30));
    assert_eq!(child_keys(&tree, 30), (Some(20), Some(40)));
    assert_eq!(child_keys(&tree, 20), (Some(10), Some(25)));
    assert_eq!(tree.height(), 2);
    assert_eq!(tree.max_node().map(|node| node.key), Some(40));
    assert_eq!(tree.last().map(|node| node.key), Some(40));
    assert_eq!(keys_of(&tree), [10, 20, 25, 30, 40]);
}

#[test]
fn ascending_inserts_rotate() {
    let mut tree = tree_of(&[1, 2]);
    assert_eq!(tree.rotations(), 0);

    tree.insert(TestNode::new(3)).unwrap();
    assert_eq!(root_key(&tree), Some(2));
    assert_eq!(child_keys(&tree, 2), (Some(1), Some(3)));
    assert_eq!(tree.rotations(), 1);
}

#[test]
fn zig_zag_insert_double_rotates() {
    let tree = tree_of(&[30, 10, 20]);
    tree.assert_invariants();

    assert_eq!(root_key(&tree), Some(20));
    assert_eq!(child_keys(&tree, 20), (Some(10), Some(30)));
    assert_eq!(tree.rotations(), 2);
}

#[test]
fn search_path_lengths() {
    let tree = tree_of(&[20, 10, 30]);

    let cases = [(20, true, 1), (10, true, 2), (30, true, 2), (15, false, 2), (35, false, 2)];
    for (key, found, path_len) in cases {
        let search = tree.search(&key);
        assert_eq!(search.node.is_some(), found, "key {key}");
        assert_eq!(search.path_len, path_len, "key {key}");
    }
}

#[test]
fn finger_search_path_lengths() {
    let tree = tree_of(&[20, 10, 30]);

    // The maximum is found without moving.
    let search = tree.finger_search(&30);
    assert_eq!(search.node.map(|n| unsafe { n.as_ref().key }), Some(30));
    assert_eq!(search.path_len, 1);

    // Keys above the maximum stop at it.
    let search = tree.finger_search(&99);
    assert!(search.node.is_none());
    assert_eq!(search.path_len, 1);

    // 30 -> 20 -> 10
    let search = tree.finger_search(&10);
    assert_eq!(search.node.map(|n| unsafe { n.as_ref().key }), Some(10));
    assert_eq!(search.path_len, 3);

    // 30 -> 20 -> missing right child of 10
    let search = tree.finger_search(&15);
    assert!(search.node.is_none());
    assert_eq!(search.path_len, 3);
}

#[test]
fn insert_reports_edges_and_promotions() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    let first = tree.insert(TestNode::new(20)).unwrap();
    assert_eq!((first.edges, first.promotions), (1, 0));

    let second = tree.insert(TestNode::new(10)).unwrap();
    assert_eq!((second.edges, second.promotions), (2, 1));

    let third = tree.insert(TestNode::new(30)).unwrap();
    assert_eq!((third.edges, third.promotions), (2, 0));

    let fourth = tree.insert(TestNode::new(5)).unwrap();
    assert_eq!((fourth.edges, fourth.promotions), (3, 2));
    assert_eq!(unsafe { fourth.node.as_ref().key }, 5);

    tree.assert_invariants();
}

#[test]
fn ascending_finger_inserts_walk_two_edges() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for key in 0..256 {
        let insertion = tree.finger_insert(TestNode::new(key)).unwrap();
        if key > 0 {
            assert_eq!(insertion.edges, 2, "key {key}");
        }
    }

    tree.assert_invariants();
    assert_eq!(tree.len(), 256);
    assert_eq!(keys_of(&tree), (0..256).collect::<Vec<_>>());
}

#[test]
fn finger_insert_below_the_root() {
    let mut tree = tree_of(&[20, 10, 30, 5, 15, 25, 35]);

    // 35 -> 30, which is not greater than 32, then 30 -> 35 -> new left leaf.
    let insertion = tree.finger_insert(TestNode::new(32)).unwrap();
    assert_eq!((insertion.edges, insertion.promotions), (4, 3));
    assert_eq!(root_key(&tree), Some(20));
    assert_eq!(child_keys(&tree, 35), (Some(32), None));

    // 35 -> 30 -> 20, the root, then 20 -> 10 -> 15 -> new right leaf.
    let insertion = tree.finger_insert(TestNode::new(17)).unwrap();
    assert_eq!((insertion.edges, insertion.promotions), (6, 2));
    assert_eq!(child_keys(&tree, 15), (None, Some(17)));

    tree.assert_invariants();
    assert_eq!(tree.rotations(), 0);
    assert_eq!(keys_of(&tree), [5, 10, 15, 17, 20, 25, 30, 32, 35]);
}

#[test]
fn duplicate_insert_is_rejected() {
    let mut tree = tree_of(&[20, 10, 30]);
    let rotations = tree.rotations();

    let rejected = tree.insert(TestNode::new(10)).unwrap_err();
    assert_eq!(rejected.error, Error::DuplicateKey);
    assert_eq!(rejected.payload.key, 10);

    let rejected = tree.finger_insert(TestNode::new(30)).unwrap_err();
    assert_eq!(rejected.error, Error::DuplicateKey);

    tree.assert_invariants();
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.rotations(), rotations);
}

#[test]
fn remove_max_updates_cached_max() {
    let mut tree = tree_of(&[20, 10, 30, 25]);

    let removed = tree.pop_last().unwrap();
    assert_eq!(removed.key, 30);
    assert_eq!(tree.max_node().map(|node| node.key), Some(25));
    tree.assert_invariants();

    let removed = tree.remove_key(&25).unwrap();
    assert_eq!(removed.key, 25);
    assert_eq!(tree.max_node().map(|node| node.key), Some(20));
    tree.assert_invariants();
}

#[test]
fn remove_root_with_two_children() {
    let mut tree = tree_of(&[20, 10, 30, 5, 15, 25, 35, 27]);
    let other_nodes: Vec<*const TestNode> = tree
        .iter()
        .filter(|node| node.key != 20)
        .map(|node| node as *const TestNode)
        .collect();

    let removed = tree.remove_key(&20).unwrap();
    assert_eq!(removed.key, 20);
    tree.assert_invariants();

    // The successor takes the root's place; every other element keeps its address.
    assert_eq!(root_key(&tree), Some(25));
    let remaining: Vec<*const TestNode> =
        tree.iter().map(|node| node as *const TestNode).collect();
    assert_eq!(remaining, other_nodes);
}

#[test]
fn remove_missing_key() {
    let mut tree = tree_of(&[2, 1, 3]);
    assert!(tree.remove_key(&4).is_none());
    assert_eq!(tree.len(), 3);
}

#[test]
fn pop_first_and_last_drain() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);

    let mut drained = Vec::new();
    while let Some(first) = tree.pop_first() {
        drained.push(first.key);
        if let Some(last) = tree.pop_last() {
            drained.push(last.key);
        }
        tree.assert_invariants();
    }

    assert_eq!(drained, [1, 7, 2, 6, 3, 5, 4]);
}

#[test]
fn neighbors_and_double_ended_iteration() {
    let tree = tree_of(&[50, 30, 70, 20, 40, 60, 80]);

    let forward: Vec<u32> = tree.iter().map(|node| node.key).collect();
    let backward: Vec<u32> = tree.iter().rev().map(|node| node.key).collect();
    assert_eq!(forward, [20, 30, 40, 50, 60, 70, 80]);
    assert_eq!(backward, [80, 70, 60, 50, 40, 30, 20]);

    let mut iter = tree.iter();
    assert_eq!(iter.len(), 7);
    assert_eq!(iter.next().map(|n| n.key), Some(20));
    assert_eq!(iter.next_back().map(|n| n.key), Some(80));
    assert_eq!(iter.len(), 5);
    let middle: Vec<u32> = iter.map(|node| node.key).collect();
    assert_eq!(middle, [30, 40, 50, 60, 70]);

    let forty = tree.search(&40).node.unwrap();
    unsafe {
        assert_eq!(tree.successor(forty).map(|n| n.as_ref().key), Some(50));
        assert_eq!(tree.predecessor(forty).map(|n| n.as_ref().key), Some(30));
    }

    let max = tree.search(&80).node.unwrap();
    unsafe { assert!(tree.successor(max).is_none()) };
}

#[test]
fn join_equal_heights() {
    let mut left = tree_of(&[2, 1, 3]);
    let right = tree_of(&[6, 5, 7]);

    left.join(right, TestNode::new(4)).unwrap();
    left.assert_invariants();

    assert_eq!(root_key(&left), Some(4));
    assert_eq!(left.height(), 2);
    assert_eq!(left.len(), 7);
    assert_eq!(left.rotations(), 0);
    assert_eq!(left.max_node().map(|node| node.key), Some(7));
}

#[test]
fn join_tall_left_short_right() {
    let mut left = tree_of(&(0..100).collect::<Vec<_>>());
    let right = tree_of(&[200]);

    left.join(right, TestNode::new(150)).unwrap();
    left.assert_invariants();

    assert_eq!(left.len(), 102);
    assert_eq!(left.max_node().map(|node| node.key), Some(200));
    let mut expected: Vec<u32> = (0..100).collect();
    expected.extend([150, 200]);
    assert_eq!(keys_of(&left), expected);
}

#[test]
fn join_short_left_tall_right() {
    let mut left = tree_of(&[0]);
    let right = tree_of(&(10..110).collect::<Vec<_>>());

    left.join(right, TestNode::new(5)).unwrap();
    left.assert_invariants();

    assert_eq!(left.len(), 102);
    assert_eq!(left.first().map(|node| node.key), Some(0));
    assert_eq!(left.max_node().map(|node| node.key), Some(109));
}

#[test]
fn join_from_the_upper_tree() {
    let mut upper = tree_of(&[10, 11, 12]);
    let lower = tree_of(&(0..8).collect::<Vec<_>>());

    upper.join(lower, TestNode::new(9)).unwrap();
    upper.assert_invariants();

    assert_eq!(keys_of(&upper), (0..13).filter(|&k| k != 8).collect::<Vec<_>>());
}

#[test]
fn join_with_empty_sides() {
    let mut both_empty: AvlTree<TestNode> = AvlTree::new();
    both_empty.join(AvlTree::new(), TestNode::new(1)).unwrap();
    both_empty.assert_invariants();
    assert_eq!(keys_of(&both_empty), [1]);

    let mut left = tree_of(&[1, 2, 3, 4]);
    left.join(AvlTree::new(), TestNode::new(10)).unwrap();
    left.assert_invariants();
    assert_eq!(keys_of(&left), [1, 2, 3, 4, 10]);
    assert_eq!(left.max_node().map(|node| node.key), Some(10));

    let mut empty: AvlTree<TestNode> = AvlTree::new();
    empty.join(tree_of(&[5, 6, 7, 8]), TestNode::new(0)).unwrap();
    empty.assert_invariants();
    assert_eq!(keys_of(&empty), [0, 5, 6, 7, 8]);

    let mut empty_upper: AvlTree<TestNode> = AvlTree::new();
    empty_upper.join(tree_of(&[1, 2, 3]), TestNode::new(9)).unwrap();
    empty_upper.assert_invariants();
    assert_eq!(keys_of(&empty_upper), [1, 2, 3, 9]);
    assert_eq!(empty_upper.max_node().map(|node| node.key), Some(9));
    assert_eq!(empty_upper.first().map(|node| node.key), Some(1));
}

#[test]
fn unordered_join_is_rejected() {
    let mut left = tree_of(&[1, 2, 3]);
    let right = tree_of(&[5, 6, 7]);

    let rejected = left.join(right, TestNode::new(6)).unwrap_err();
    assert_eq!(rejected.error, Error::UnorderedJoin);

    let (right, item) = rejected.into_payload();
    assert_eq!(item.key, 6);
    assert_eq!(keys_of(&left), [1, 2, 3]);
    assert_eq!(keys_of(&right), [5, 6, 7]);
    left.assert_invariants();
    right.assert_invariants();

    // Overlapping trees have no valid separator.
    let overlapping = tree_of(&[0, 10]);
    let rejected = left.join(overlapping, TestNode::new(4)).unwrap_err();
    assert_eq!(rejected.error, Error::UnorderedJoin);
}

#[test]
fn split_at_every_key() {
    let keys = [40, 20, 60, 10, 30, 50];

    for &at in &keys {
        let mut tree = tree_of(&keys);
        let height = tree.height();
        let node = tree.search(&at).node.unwrap();

        let Split { left, pivot, right } = unsafe { core::mem::take(&mut tree).split(node) };
        left.assert_invariants();
        right.assert_invariants();

        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        let below: Vec<u32> = sorted.iter().copied().filter(|&k| k < at).collect();
        let above: Vec<u32> = sorted.iter().copied().filter(|&k| k > at).collect();

        assert_eq!(pivot.key, at);
        assert_eq!(keys_of(&left), below, "split at {at}");
        assert_eq!(keys_of(&right), above, "split at {at}");
        assert_eq!(left.len(), below.len());
        assert_eq!(right.len(), above.len());
        assert!(left.height() <= height && right.height() <= height);

        assert!(tree.is_empty());
    }
}

#[test]
fn split_then_join_is_identity() {
    let keys: Vec<u32> = (0..64).map(|k| (k * 37) % 64).collect();

    for at in [0, 1, 31, 32, 62, 63] {
        let tree = tree_of(&keys);
        let node = tree.search(&at).node.unwrap();

        let Split {
            mut left,
            pivot,
            right,
        } = unsafe { tree.split(node) };

        left.join(right, pivot).unwrap();
        left.assert_invariants();
        assert_eq!(keys_of(&left), (0..64).collect::<Vec<_>>());
    }
}

#[test]
fn split_leaves_pivot_detached() {
    let tree = tree_of(&[2, 1, 3]);
    let node = tree.search(&2).node.unwrap();

    let Split {
        mut left,
        pivot,
        right,
    } = unsafe { tree.split(node) };

    assert!(pivot.links.parent().is_none());
    assert!(pivot.links.left().is_none());
    assert!(pivot.links.right().is_none());
    assert_eq!(pivot.links.height(), 0);

    // The detached pivot can be reinserted elsewhere.
    left.insert(pivot).unwrap();
    left.assert_invariants();
    assert_eq!(keys_of(&left), [1, 2]);
    assert_eq!(keys_of(&right), [3]);
}

#[test]
fn equal_height_join_does_not_rotate() {
    for height in 0..6u32 {
        let size = (1u32 << (height + 1)) - 1;
        let mut left = tree_of(&(0..size).collect::<Vec<_>>());
        let right = tree_of(&(size + 1..2 * size + 1).collect::<Vec<_>>());
        assert_eq!(left.height(), right.height());

        let before = left.rotations();
        left.join(right, TestNode::new(size)).unwrap();
        assert_eq!(left.rotations(), before);
        left.assert_invariants();
    }
}

#[test]
fn clear_empties_tree() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4, 7, 9]);
    tree.clear();

    assert!(tree.is_empty());
    assert!(tree.max_node().is_none());
    tree.assert_invariants();

    tree.insert(TestNode::new(1)).unwrap();
    assert_eq!(keys_of(&tree), [1]);
}

// Upper bound on the height of an AVL tree with `n` nodes.
fn max_avl_height(n: usize) -> f64 {
    1.4405 * ((n + 2) as f64).log2() - 0.3277
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn split_join_equivalence(input in model::split_join_strategy()) {
        model::run_split_join_equivalence(input);
    }

    #[test]
    fn height_is_logarithmic(keys in proptest::collection::vec(any::<u32>(), 1..1000)) {
        let tree = tree_of(&keys);
        let height = f64::from(tree.height());

        prop_assert!(height < max_avl_height(tree.len()), "height {} for {} nodes", height, tree.len());
    }

    #[test]
    fn join_rotations_bounded_by_height_difference(
        left_len in 0u32..300,
        right_len in 0u32..300,
    ) {
        let mut left = tree_of(&(0..left_len).collect::<Vec<_>>());
        let right = tree_of(&(left_len + 1..left_len + 1 + right_len).collect::<Vec<_>>());
        let diff = (left.height() - right.height()).unsigned_abs() as usize;

        let before = left.rotations();
        left.join(right, TestNode::new(left_len)).unwrap();
        left.assert_invariants();

        prop_assert!(left.rotations() - before <= 2 * (diff + 2));
        prop_assert_eq!(left.len(), (left_len + right_len + 1) as usize);
    }

    #[test]
    fn split_matches_naive_partition(
        keys in proptest::collection::btree_set(0u32..5000, 1..300),
        at in any::<prop::sample::Index>(),
    ) {
        let keys: Vec<u32> = keys.into_iter().collect();
        let pivot_key = keys[at.index(keys.len())];

        // Naive split: reinsert every key into one of two fresh trees.
        let mut naive_left = AvlTree::new();
        let mut naive_right = AvlTree::new();
        for &key in &keys {
            if key < pivot_key {
                naive_left.insert(TestNode::new(key)).unwrap();
            } else if key > pivot_key {
                naive_right.insert(TestNode::new(key)).unwrap();
            }
        }

        let tree = tree_of(&keys);
        let node = tree.search(&pivot_key).node.unwrap();
        let Split { left, pivot, right } = unsafe { tree.split(node) };

        prop_assert_eq!(pivot.key, pivot_key);
        prop_assert_eq!(keys_of(&left), keys_of(&naive_left));
        prop_assert_eq!(keys_of(&right), keys_of(&naive_right));
        left.assert_invariants();
        right.assert_invariants();
    }
}

#[cfg(feature = "tracing")]
mod tracing_events {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::{
        layer::{Context, SubscriberExt},
        Layer,
    };

    use super::*;

    #[derive(Clone, Default)]
    struct CountEvents {
        debug: Arc<AtomicUsize>,
        trace: Arc<AtomicUsize>,
    }

    impl<S: Subscriber> Layer<S> for CountEvents {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let counter = match *event.metadata().level() {
                Level::DEBUG => &self.debug,
                Level::TRACE => &self.trace,
                _ => return,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn rotations_splits_and_joins_emit_events() {
        let counts = CountEvents::default();
        let subscriber = tracing_subscriber::registry().with(counts.clone());

        tracing::subscriber::with_default(subscriber, || {
            // One rotation while building, no rotation in the equal-height join.
            let tree = tree_of(&[1, 2, 3]);
            let node = tree.search(&2).node.unwrap();

            let Split {
                mut left,
                pivot,
                right,
            } = unsafe { tree.split(node) };
            left.join(right, pivot).unwrap();
            left.assert_invariants();
        });

        assert_eq!(counts.trace.load(Ordering::Relaxed), 1);
        assert_eq!(counts.debug.load(Ordering::Relaxed), 2);
    }
}
