//! An intrusive AVL tree with finger operations and logarithmic split and join.

// Conventions used in comments:
// - The height of a node `x` is denoted `h(x)`. A missing child has height -1.
// - The parent of a node `x` is denoted `p(x)`.
// - The balance factor of `x` is `h(left(x)) - h(right(x))`.
//
// The invariants of an AVL tree are:
// 1. Every node has a balance factor of -1, 0 or 1.
// 2. `h(x) = 1 + max(h(left(x)), h(right(x)))`. In particular, all leaves have height 0.
//
// Corollary:
// 3. A tree of height `h` has at least `F(h + 3) - 1` nodes, where `F` is the Fibonacci
//    sequence, so `h < 1.4405 * log2(n + 2)`.
//
// Every node also caches the number of nodes in its subtree. The two trees produced by `split`
// are assembled from subtrees, and this is what lets them know their length without a traversal.

use core::{
    borrow::Borrow, cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not,
    pin::Pin, ptr::NonNull,
};

use cordyceps::Linked;

mod debug;
mod error;
mod iter;
mod join;
mod map;

#[cfg(any(test, feature = "model"))]
pub mod model;

#[cfg(test)]
mod tests;

pub use error::{Error, Rejected};
pub use iter::Iter;
pub use join::Split;
pub use map::{AvlMap, Inserted};

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// Besides the root, the tree caches a pointer to its maximum element. Finger operations
/// ([`finger_search`](AvlTree::finger_search), [`finger_insert`](AvlTree::finger_insert)) start
/// from that element instead of the root, so their cost depends on the distance from the maximum
/// rather than on the size of the tree.
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    max: Link<T>,
    len: usize,
    rotations: usize,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    len: usize,
    height: i8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

/// The result of a [`search`](AvlTree::search) or [`finger_search`](AvlTree::finger_search).
pub struct Search<T: ?Sized> {
    /// The element with the requested key, if there is one.
    pub node: Option<NonNull<T>>,
    /// The number of elements visited, including the first one.
    ///
    /// An empty tree reports 1.
    pub path_len: usize,
}

/// The result of an [`insert`](AvlTree::insert) or [`finger_insert`](AvlTree::finger_insert).
pub struct Insertion<T: ?Sized> {
    /// The inserted element.
    pub node: NonNull<T>,
    /// One plus the number of edges walked to reach the new leaf, before rebalancing.
    pub edges: usize,
    /// The number of nodes whose height grew while rebalancing.
    pub promotions: usize,
}

impl<T: ?Sized> Clone for Search<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Search<T> {}

impl<T: ?Sized> fmt::Debug for Search<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Search")
            .field("node", &self.node)
            .field("path_len", &self.path_len)
            .finish()
    }
}

impl<T: ?Sized> fmt::Debug for Insertion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Insertion")
            .field("node", &self.node)
            .field("edges", &self.edges)
            .field("promotions", &self.promotions)
            .finish()
    }
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree {
            root: None,
            max: None,
            len: 0,
            rotations: 0,
        }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the height of the tree, or -1 if it is empty.
    pub fn height(&self) -> i8 {
        unsafe { self.height_of(self.root) }
    }

    /// Returns the number of single rotations performed on this tree since it was created.
    ///
    /// A double rotation counts as two.
    pub const fn rotations(&self) -> usize {
        self.rotations
    }

    /// Returns the root element of the tree.
    pub fn root(&self) -> Option<Pin<&T>> {
        self.root
            .map(|root| unsafe { Pin::new_unchecked(root.as_ref()) })
    }

    /// Returns the maximum element of the tree.
    ///
    /// This operation completes in _O(1)_ time.
    pub fn max_node(&self) -> Option<Pin<&T>> {
        self.max.map(|max| unsafe { Pin::new_unchecked(max.as_ref()) })
    }

    /// Returns the maximum element of the tree.
    ///
    /// Equivalent to [`max_node`](AvlTree::max_node).
    #[inline]
    pub fn last(&self) -> Option<Pin<&T>> {
        self.max_node()
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        let first = unsafe { self.extreme(self.root?, Dir::Left) };
        Some(unsafe { Pin::new_unchecked(first.as_ref()) })
    }

    /// Returns an iterator over the elements of the tree, in key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        unsafe {
            if let Some(root) = self.root {
                assert!(
                    T::links(root).as_ref().parent().is_none(),
                    "root must not have a parent"
                );
            }

            let (len, _) = self.assert_invariants_at(self.root, None, None);
            assert_eq!(len, self.len, "tree length does not match the number of nodes");

            let rightmost = self.root.map(|root| self.extreme(root, Dir::Right));
            assert_eq!(self.max, rightmost, "cached maximum is not the rightmost node");
        }
    }

    // Checks the subtree rooted at `opt_node`, all of whose keys must lie strictly between `lower`
    // and `upper`. Returns the number of nodes in the subtree and its height.
    #[allow(clippy::only_used_in_recursion)]
    unsafe fn assert_invariants_at<'a>(
        &self,
        opt_node: Link<T>,
        lower: Option<&'a T::Key>,
        upper: Option<&'a T::Key>,
    ) -> (usize, i8)
    where
        T: 'a,
    {
        let Some(node) = opt_node else {
            return (0, -1);
        };

        unsafe {
            let links = T::links(node).as_ref();
            let key: &'a T::Key = node.as_ref().key();

            // Ensure the key is within the bounds set by the ancestors.
            if let Some(lower) = lower {
                assert!(lower < key, "left subtree holds a key that is not less than an ancestor");
            }
            if let Some(upper) = upper {
                assert!(key < upper, "right subtree holds a key that is not greater than an ancestor");
            }

            // Ensure children's parent links point to this node.
            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = links.child(dir) {
                    let parent = T::links(child)
                        .as_ref()
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);
                }
            }

            let (left_len, left_height) = self.assert_invariants_at(links.left(), lower, Some(key));
            let (right_len, right_height) =
                self.assert_invariants_at(links.right(), Some(key), upper);

            assert!(
                (left_height - right_height).abs() <= 1,
                "unbalanced node: children have heights {left_height} and {right_height}"
            );

            let height = 1 + left_height.max(right_height);
            assert_eq!(links.height(), height, "cached height is stale");

            let len = 1 + left_len + right_len;
            assert_eq!(links.subtree_len(), len, "cached subtree length is stale");

            (len, height)
        }
    }

    /// Returns a reference to the element corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let ptr = self.search(key).node?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns `true` if the tree contains an element corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.search(key).node.is_some()
    }

    /// Searches for `key`, descending from the root.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn search<Q>(&self, key: &Q) -> Search<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.descend(self.root, 1, key)
    }

    /// Searches for `key`, starting from the maximum element.
    ///
    /// The search first climbs from the maximum towards the root until it reaches an element whose
    /// key does not exceed `key`, then descends as [`search`](AvlTree::search) does. Keys close to
    /// the maximum are found in _O(log(d))_ time, where `d` is the number of elements between the
    /// key and the maximum.
    pub fn finger_search<Q>(&self, key: &Q) -> Search<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let Some(max) = self.max else {
            return Search {
                node: None,
                path_len: 1,
            };
        };

        let (start, climbed) = unsafe { self.climb_from_max(max, key) };
        self.descend(Some(start), 1 + climbed, key)
    }

    // Descends from `start` looking for `key`. `path_len` counts the nodes visited so far,
    // including `start`.
    fn descend<Q>(&self, start: Link<T>, mut path_len: usize, key: &Q) -> Search<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let Some(mut cur) = start else {
            return Search {
                node: None,
                path_len,
            };
        };

        loop {
            let next = unsafe {
                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => T::links(cur).as_ref().left(),
                    Ordering::Equal => {
                        return Search {
                            node: Some(cur),
                            path_len,
                        }
                    }
                    Ordering::Greater => T::links(cur).as_ref().right(),
                }
            };

            match next {
                Some(next) => {
                    cur = next;
                    path_len += 1;
                }
                None => {
                    return Search {
                        node: None,
                        path_len,
                    }
                }
            }
        }
    }

    // Climbs the right spine from `max` to the lowest ancestor whose key does not exceed `key`, or
    // to the root. Returns that node and the number of edges climbed.
    unsafe fn climb_from_max<Q>(&self, max: NonNull<T>, key: &Q) -> (NonNull<T>, usize)
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cur = max;
        let mut climbed = 0;

        unsafe {
            while key.cmp(cur.as_ref().key().borrow()) == Ordering::Less {
                match T::links(cur).as_ref().parent() {
                    Some(parent) => {
                        cur = parent;
                        climbed += 1;
                    }
                    None => break,
                }
            }
        }

        (cur, climbed)
    }

    /// Inserts an item into the tree, descending from the root.
    ///
    /// If the tree already holds an element with an equal key, the item is handed back with
    /// [`Error::DuplicateKey`] and the tree is left unchanged.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Result<Insertion<T>, Rejected<T::Handle>> {
        let ptr = T::into_ptr(item);
        unsafe { self.insert_below(self.root, 1, ptr) }
    }

    /// Inserts an item into the tree, starting from the maximum element.
    ///
    /// The insertion point is located as in [`finger_search`](AvlTree::finger_search). Inserting
    /// keys in ascending order this way walks a constant number of edges per insertion.
    pub fn finger_insert(&mut self, item: T::Handle) -> Result<Insertion<T>, Rejected<T::Handle>> {
        let ptr = T::into_ptr(item);

        unsafe {
            match self.max {
                Some(max) => {
                    let (start, climbed) = self.climb_from_max(max, ptr.as_ref().key());
                    self.insert_below(Some(start), 1 + climbed, ptr)
                }
                None => self.insert_below(None, 1, ptr),
            }
        }
    }

    // Descends from `start` to the leaf position for `ptr`, links it there and rebalances.
    //
    // `start` is `None` only if the tree is empty.
    unsafe fn insert_below(
        &mut self,
        start: Link<T>,
        mut edges: usize,
        ptr: NonNull<T>,
    ) -> Result<Insertion<T>, Rejected<T::Handle>> {
        unsafe {
            T::links(ptr).as_mut().clear();

            let Some(mut parent) = start else {
                // Tree is empty. Set `item` as the root and return.
                self.root = Some(ptr);
                self.max = Some(ptr);
                self.len = 1;

                return Ok(Insertion {
                    node: ptr,
                    edges,
                    promotions: 0,
                });
            };

            // Descend the tree, looking for a suitable leaf.
            let dir = loop {
                let dir = match ptr.as_ref().key().cmp(parent.as_ref().key()) {
                    Ordering::Less => Dir::Left,
                    Ordering::Equal => {
                        return Err(Rejected::new(Error::DuplicateKey, T::from_ptr(ptr)));
                    }
                    Ordering::Greater => Dir::Right,
                };

                match T::links(parent).as_ref().child(dir) {
                    Some(child) => {
                        parent = child;
                        edges += 1;
                    }
                    None => break dir,
                }
            };

            T::links(parent).as_mut().set_child(dir, Some(ptr));
            T::links(ptr).as_mut().set_parent(Some(parent));
            edges += 1;

            // The new leaf is the maximum iff it hangs to the right of the old maximum.
            if dir == Dir::Right && self.max == Some(parent) {
                self.max = Some(ptr);
            }

            self.len += 1;
            let promotions = self.rebalance_from(Some(parent));

            Ok(Insertion {
                node: ptr,
                edges,
                promotions,
            })
        }
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// This operation completes in _O(log(n))_ time.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove(&mut self, node: NonNull<T>) -> T::Handle {
        debug_assert!(
            unsafe { self.contains_node(node) },
            "`node` must be an element of this tree"
        );

        // There are two cases:
        //
        // 1. `node` has at most one child.
        //
        //    The child (or nothing) takes `node`'s place. Heights may shrink from `p(node)` up.
        //
        // 2. `node` has two children.
        //
        //    `node`'s successor[^1] has no left child, so it is unlinked as in case 1 and then takes
        //    `node`'s place, links and height. Heights may shrink from the successor's old parent
        //    up, or from the successor itself if it was `node`'s right child.
        //
        // Moving the successor, rather than its key, keeps every other element at its address.
        //
        // [^1]: The successor of a node `a` is the least node in `a`'s right subtree.

        unsafe {
            let parent = T::links(node).as_ref().parent();
            let left = T::links(node).as_ref().left();
            let right = T::links(node).as_ref().right();

            let changed = match (left, right) {
                (Some(left), Some(right)) => {
                    let (successor, successor_parent) = self.min_in_subtree(right);

                    if let Some(successor_parent) = successor_parent {
                        // Elevate the successor's right child to replace it.
                        let successor_right = T::links(successor).as_ref().right();
                        self.replace_child(successor_parent, successor, successor_right);
                        self.maybe_set_parent(successor_right, Some(successor_parent));

                        T::links(successor).as_mut().set_right(Some(right));
                        T::links(right).as_mut().set_parent(Some(successor));
                    }

                    self.replace_child_or_set_root(parent, node, Some(successor));

                    let node_height = T::links(node).as_ref().height();
                    T::links(successor).as_mut().set_parent(parent);
                    T::links(successor).as_mut().set_height(node_height);
                    T::links(successor).as_mut().set_left(Some(left));
                    // Right link is updated above iff succ != right.

                    T::links(left).as_mut().set_parent(Some(successor));

                    Some(successor_parent.unwrap_or(successor))
                }

                (Some(child), None) | (None, Some(child)) => {
                    self.replace_child_or_set_root(parent, node, Some(child));
                    T::links(child).as_mut().set_parent(parent);
                    parent
                }

                (None, None) => {
                    self.replace_child_or_set_root(parent, node, None);
                    parent
                }
            };

            self.rebalance_from(changed);
            self.len -= 1;

            // The maximum has no right child, so it was removed by the first case and the new
            // maximum is found along the right spine.
            if self.max == Some(node) {
                self.max = self.root.map(|root| self.extreme(root, Dir::Right));
            }

            T::links(node).as_mut().clear();

            T::from_ptr(node)
        }
    }

    /// Removes the element corresponding to `key`.
    pub fn remove_key<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.search(key).node?;
        Some(unsafe { self.remove(node) })
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = unsafe { self.extreme(self.root?, Dir::Left) };
        Some(unsafe { self.remove(first) })
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.max?;
        Some(unsafe { self.remove(last) })
    }

    /// Returns the element following `node` in key order.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn successor(&self, node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { self.neighbor(node, Dir::Right) }
    }

    /// Returns the element preceding `node` in key order.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn predecessor(&self, node: NonNull<T>) -> Option<NonNull<T>> {
        unsafe { self.neighbor(node, Dir::Left) }
    }

    // Returns the in-order neighbor of `node` on the `dir` side.
    unsafe fn neighbor(&self, node: NonNull<T>, dir: Dir) -> Link<T> {
        unsafe {
            if let Some(child) = T::links(node).as_ref().child(dir) {
                return Some(self.extreme(child, !dir));
            }

            // Ascend until arriving from the `!dir` side.
            let mut cur = node;
            while let Some(parent) = T::links(cur).as_ref().parent() {
                if self.which_child(parent, cur) == !dir {
                    return Some(parent);
                }
                cur = parent;
            }

            None
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let (cur, parent) = self.min_in_subtree(cur);
                let parent = parent.or_else(|| T::links(cur).as_ref().parent());

                let right = T::links(cur).as_ref().right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                T::links(cur).as_mut().clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        self.max = None;

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    // Rebalancing ============================================================

    // Walks from `start` up to the root, refreshing cached heights and lengths and rotating
    // wherever a balance factor has reached +2 or -2.
    //
    // Returns the number of nodes whose height grew when refreshed.
    unsafe fn rebalance_from(&mut self, start: Link<T>) -> usize {
        let mut promotions = 0;
        let mut opt_cur = start;

        while let Some(cur) = opt_cur {
            unsafe {
                let old_height = T::links(cur).as_ref().height();
                self.update(cur);
                if T::links(cur).as_ref().height() > old_height {
                    promotions += 1;
                }

                let top = match self.balance_factor(cur) {
                    2 => self.rotate_heavy(cur, Dir::Left),
                    -2 => self.rotate_heavy(cur, Dir::Right),
                    _ => cur,
                };

                opt_cur = T::links(top).as_ref().parent();
            }
        }

        promotions
    }

    // Restores balance at `node`, whose `heavy` subtree is two taller than the other one.
    //
    // Returns the node now occupying `node`'s position.
    unsafe fn rotate_heavy(&mut self, node: NonNull<T>, heavy: Dir) -> NonNull<T> {
        unsafe {
            let child = T::links(node)
                .as_ref()
                .child(heavy)
                .expect("heavy side must have a child");

            // The zig-zag case: `child` leans away from `heavy`. Straighten it first.
            let inner_heavy = match heavy {
                Dir::Left => self.balance_factor(child) < 0,
                Dir::Right => self.balance_factor(child) > 0,
            };

            let up = if inner_heavy {
                let grandchild = T::links(child)
                    .as_ref()
                    .child(!heavy)
                    .expect("inner-heavy child must have an inner child");
                self.rotate_at(child, grandchild);
                grandchild
            } else {
                child
            };

            self.rotate_at(node, up);
            up
        }
    }

    // Performs a rotation, moving `up` up and its parent `down` down.
    //
    // The cached heights and lengths of `down` and then `up` are refreshed.
    unsafe fn rotate_at(&mut self, down: NonNull<T>, up: NonNull<T>) {
        unsafe {
            debug_assert_eq!(T::links(up).as_ref().parent(), Some(down));

            // - `down` becomes the `dir` child of `up`.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let dir = if T::links(down).as_ref().right() == Some(up) {
                Dir::Left
            } else {
                Dir::Right
            };

            let across = T::links(up).as_ref().child(dir);
            T::links(down).as_mut().set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            T::links(up).as_mut().set_child(dir, Some(down));
            let parent = T::links(down).as_mut().set_parent(Some(up));
            T::links(up).as_mut().set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));

            self.update(down);
            self.update(up);

            #[cfg(feature = "tracing")]
            tracing::trace!(
                ?dir,
                down_height = T::links(down).as_ref().height(),
                up_height = T::links(up).as_ref().height(),
                "rotate"
            );
        }

        self.rotations += 1;
    }

    // Support methods ========================================================

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { T::links(node).as_mut().set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[inline]
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Option<NonNull<T>>,
    ) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            debug_assert_eq!(
                T::links(parent).as_ref().child(dir),
                Some(old_child),
                "`old_child` must be a child of `parent`"
            );
            debug_assert!(
                new_child.is_none() || T::links(parent).as_ref().child(!dir) != new_child,
                "`new_child` must not be a child of `parent`"
            );

            T::links(parent).as_mut().set_child(dir, new_child);
        }
    }

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's parent.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Option<NonNull<T>>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(left) = unsafe { T::links(cur).as_ref().left() } {
            parent = Some(cur);
            cur = left;
        }

        (cur, parent)
    }

    // Returns the last node reached by following `dir` links from `root`.
    #[inline]
    unsafe fn extreme(&self, root: NonNull<T>, dir: Dir) -> NonNull<T> {
        let mut cur = root;

        while let Some(child) = unsafe { T::links(cur).as_ref().child(dir) } {
            cur = child;
        }

        cur
    }

    // Returns `true` if climbing from `node` ends at this tree's root.
    unsafe fn contains_node(&self, node: NonNull<T>) -> bool {
        let mut cur = node;

        while let Some(parent) = unsafe { T::links(cur).as_ref().parent() } {
            cur = parent;
        }

        self.root == Some(cur)
    }

    // Recomputes the cached height and subtree length of `node` from its children.
    #[inline]
    unsafe fn update(&mut self, node: NonNull<T>) {
        unsafe {
            let links = T::links(node).as_mut();
            let (left, right) = (links.left(), links.right());

            let height = 1 + self.height_of(left).max(self.height_of(right));
            let len = 1 + self.len_of(left) + self.len_of(right);

            links.set_height(height);
            links.set_len(len);
        }
    }

    /// Returns the height of the pointed-to node.
    unsafe fn height_of(&self, node: Option<NonNull<T>>) -> i8 {
        node.map(|n| unsafe { T::links(n).as_ref().height() })
            .unwrap_or(-1)
    }

    /// Returns the number of nodes in the pointed-to subtree.
    unsafe fn len_of(&self, node: Option<NonNull<T>>) -> usize {
        node.map(|n| unsafe { T::links(n).as_ref().subtree_len() })
            .unwrap_or(0)
    }

    unsafe fn balance_factor(&self, node: NonNull<T>) -> i8 {
        unsafe {
            let links = T::links(node).as_ref();
            self.height_of(links.left()) - self.height_of(links.right())
        }
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if unsafe { T::links(parent).as_ref().left() } == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

// SAFETY: The tree owns its elements; moving it to another thread moves them too.
unsafe impl<T> Send for AvlTree<T> where T: TreeNode<Links<T>> + Send + ?Sized {}

// SAFETY: Shared references to the tree only hand out shared references to its elements.
unsafe impl<T> Sync for AvlTree<T> where T: TreeNode<Links<T>> + Sync + ?Sized {}

impl<'tree, T> IntoIterator for &'tree AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                len: 1,
                height: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    /// Returns the cached height of the subtree rooted at this node.
    ///
    /// A leaf has height 0.
    #[inline]
    pub fn height(&self) -> i8 {
        unsafe { (*self.inner.get()).height }
    }

    /// Returns the cached number of nodes in the subtree rooted at this node.
    #[inline]
    pub fn subtree_len(&self) -> usize {
        unsafe { (*self.inner.get()).len }
    }

    #[inline]
    pub fn parent(&self) -> Option<NonNull<T>> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    pub fn left(&self) -> Option<NonNull<T>> {
        self.child(Dir::Left)
    }

    #[inline]
    pub fn right(&self) -> Option<NonNull<T>> {
        self.child(Dir::Right)
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_height(&mut self, height: i8) {
        self.inner.get_mut().height = height;
    }

    #[inline]
    fn set_len(&mut self, len: usize) {
        self.inner.get_mut().len = len;
    }

    // Resets the links to those of a detached leaf.
    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.len = 1;
        inner.height = 0;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("len", &self.subtree_len())
            .field("height", &self.height())
            .finish()
    }
}
