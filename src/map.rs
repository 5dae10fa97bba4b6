extern crate alloc;

use alloc::{boxed::Box, vec::Vec};
use core::{borrow::Borrow, fmt, marker::PhantomPinned, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, Insertion, Links, Rejected, Split, TreeNode};

/// An ordered map based on an [AVL tree].
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlMap<K: Ord, V> {
    tree: AvlTree<MapNode<K, V>>,
}

/// Statistics about an insertion into an [`AvlMap`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Inserted {
    /// One plus the number of edges walked to reach the new leaf, before rebalancing.
    pub edges: usize,
    /// The number of nodes whose height grew while rebalancing.
    pub promotions: usize,
}

impl<T: ?Sized> From<Insertion<T>> for Inserted {
    fn from(insertion: Insertion<T>) -> Self {
        Inserted {
            edges: insertion.edges,
            promotions: insertion.promotions,
        }
    }
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

impl<K, V> MapNode<K, V> {
    fn new(key: K, value: V) -> Box<Self> {
        Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        })
    }

    fn into_pair(node: Box<Self>) -> (K, V) {
        let MapNode { key, value, .. } = *node;
        (key, value)
    }

    // # Safety
    //
    // `node` must be linked into a tree that stays borrowed for `'a`.
    unsafe fn entry<'a>(node: NonNull<Self>) -> (&'a K, &'a V) {
        let node = unsafe { node.as_ref() };
        (&node.key, &node.value)
    }
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K: Ord, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

impl<K: Ord, V> AvlMap<K, V> {
    /// Creates a new, empty `AvlMap`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns the height of the underlying tree, or -1 if the map is empty.
    pub fn height(&self) -> i8 {
        self.tree.height()
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| &node.get_ref().value)
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree
            .search(key)
            .node
            // SAFETY: Pinning is not structural for `node.value`, and `self` is mutably borrowed.
            .map(|mut node| unsafe { &mut node.as_mut().value })
    }

    /// Looks up `key`, descending from the root.
    ///
    /// Returns the matching entry, if any, and the number of entries visited.
    pub fn search<Q>(&self, key: &Q) -> (Option<(&K, &V)>, usize)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let found = self.tree.search(key);
        let entry = found.node.map(|node| unsafe { MapNode::entry(node) });
        (entry, found.path_len)
    }

    /// Looks up `key`, starting from the maximum entry.
    ///
    /// Returns the matching entry, if any, and the number of entries visited.
    pub fn finger_search<Q>(&self, key: &Q) -> (Option<(&K, &V)>, usize)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let found = self.tree.finger_search(key);
        let entry = found.node.map(|node| unsafe { MapNode::entry(node) });
        (entry, found.path_len)
    }

    /// Inserts `key` and `value`, descending from the root.
    ///
    /// If `key` is already present, the pair is handed back and the map is left unchanged.
    pub fn insert(&mut self, key: K, value: V) -> Result<Inserted, Rejected<(K, V)>> {
        self.tree
            .insert(MapNode::new(key, value))
            .map(Inserted::from)
            .map_err(|rejected| rejected.map(MapNode::into_pair))
    }

    /// Inserts `key` and `value`, starting from the maximum entry.
    ///
    /// If `key` is already present, the pair is handed back and the map is left unchanged.
    pub fn finger_insert(&mut self, key: K, value: V) -> Result<Inserted, Rejected<(K, V)>> {
        self.tree
            .finger_insert(MapNode::new(key, value))
            .map(Inserted::from)
            .map_err(|rejected| rejected.map(MapNode::into_pair))
    }

    /// Removes the value associated with `key` from the map.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove_key(key).map(|node| node.value)
    }

    /// Moves every entry of `other`, plus `key` and `value`, into `self`.
    ///
    /// `key` must separate the keys of the two maps: every key of one map must be less than `key`,
    /// and every key of the other greater. Otherwise everything is handed back and `self` is left
    /// unchanged.
    pub fn join(
        &mut self,
        other: AvlMap<K, V>,
        key: K,
        value: V,
    ) -> Result<(), Rejected<(AvlMap<K, V>, K, V)>> {
        self.tree
            .join(other.tree, MapNode::new(key, value))
            .map_err(|rejected| {
                rejected.map(|(tree, node)| {
                    let (key, value) = MapNode::into_pair(node);
                    (AvlMap { tree }, key, value)
                })
            })
    }

    /// Splits the map at `key`.
    ///
    /// Returns the entries with lesser keys, the entry for `key`, and the entries with greater
    /// keys. If `key` is not present, the map is handed back unchanged.
    pub fn split<Q>(self, key: &Q) -> Result<(AvlMap<K, V>, (K, V), AvlMap<K, V>), Self>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let Some(node) = self.tree.search(key).node else {
            return Err(self);
        };

        // SAFETY: `node` was just found in `self.tree`.
        let Split { left, pivot, right } = unsafe { self.tree.split(node) };

        Ok((
            AvlMap { tree: left },
            MapNode::into_pair(pivot),
            AvlMap { tree: right },
        ))
    }

    /// Returns an iterator over the entries of the map, in key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> + ExactSizeIterator + '_ {
        self.tree.iter().map(|node| (&node.key, &node.value))
    }

    /// Returns every entry of the map, in key order.
    pub fn to_sorted_pairs(&self) -> Vec<(&K, &V)> {
        self.iter().collect()
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree
            .first()
            .map(|node| (&node.get_ref().key, &node.get_ref().value))
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first().map(MapNode::into_pair)
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree
            .max_node()
            .map(|node| (&node.get_ref().key, &node.get_ref().value))
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last().map(MapNode::into_pair)
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }
}

impl<K: Ord, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for AvlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
