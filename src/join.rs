use core::{borrow::Borrow, cmp::Ordering, ptr::NonNull};

use crate::{AvlTree, Dir, Error, Link, Links, Rejected, TreeNode};

/// The result of [`AvlTree::split`].
pub struct Split<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Every element ordered before the pivot.
    pub left: AvlTree<T>,
    /// The element the tree was split at, no longer linked into any tree.
    pub pivot: T::Handle,
    /// Every element ordered after the pivot.
    pub right: AvlTree<T>,
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Joins `other` into `self`, using `item` as the separator.
    ///
    /// Every key of one tree must be less than `item`'s key, which must be less than every key of
    /// the other tree. Either tree may be the lower one; the direction is detected from the trees'
    /// extremes. If the keys are not arranged this way, both `other` and `item` are handed back
    /// with [`Error::UnorderedJoin`] and `self` is left unchanged.
    ///
    /// This operation completes in _O(|h1 - h2| + 1)_ time, plus _O(log(n))_ to read the minimum
    /// keys while checking the order.
    pub fn join(
        &mut self,
        mut other: AvlTree<T>,
        item: T::Handle,
    ) -> Result<(), Rejected<(AvlTree<T>, T::Handle)>> {
        let mid = T::into_ptr(item);
        let key = unsafe { mid.as_ref().key() };

        let self_is_lower = if self.all_below(key) && other.all_above(key) {
            true
        } else if other.all_below(key) && self.all_above(key) {
            false
        } else {
            let item = unsafe { T::from_ptr(mid) };
            return Err(Rejected::new(Error::UnorderedJoin, (other, item)));
        };

        let (lower, upper) = if self_is_lower {
            (&mut *self, &mut other)
        } else {
            (&mut other, &mut *self)
        };

        let lo = lower.root.take();
        let hi = upper.root.take();
        let hi_max = upper.max.take();

        // `self` is about to adopt every node; `other` must not drop any of them.
        other.max = None;
        other.len = 0;
        self.max = None;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            lo_height = unsafe { self.height_of(lo) },
            hi_height = unsafe { self.height_of(hi) },
            self_is_lower,
            "join"
        );

        unsafe {
            self.join_subtrees(lo, mid, hi);
            self.len = self.len_of(self.root);
        }

        self.max = hi_max.or(Some(mid));

        Ok(())
    }

    /// Splits the tree at `node`.
    ///
    /// Returns the elements ordered before `node`, `node` itself and the elements ordered after
    /// it. The two trees are assembled by joining the subtrees hanging off the path from `node` to
    /// the root; the cost of each join is bounded by the height difference of its operands, and
    /// these differences add up to _O(log(n))_ along the path.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn split(mut self, node: NonNull<T>) -> Split<T> {
        debug_assert!(
            unsafe { self.contains_node(node) },
            "`node` must be an element of this tree"
        );

        let mut left = AvlTree::new();
        let mut right = AvlTree::new();

        unsafe {
            // `node`'s own subtrees seed the two halves.
            left.root = T::links(node).as_ref().left();
            right.root = T::links(node).as_ref().right();
            left.maybe_set_parent(left.root, None);
            right.maybe_set_parent(right.root, None);

            let mut cur = node;
            let mut opt_parent = T::links(node).as_ref().parent();

            while let Some(parent) = opt_parent {
                // Joining rewrites `parent`'s links, so read everything needed first.
                opt_parent = T::links(parent).as_ref().parent();

                match self.which_child(parent, cur) {
                    // `parent` and its left subtree precede everything gathered so far.
                    Dir::Right => {
                        let lo = T::links(parent).as_ref().left();
                        let hi = left.root.take();
                        left.join_subtrees(lo, parent, hi);
                    }

                    // `parent` and its right subtree follow everything gathered so far.
                    Dir::Left => {
                        let lo = right.root.take();
                        let hi = T::links(parent).as_ref().right();
                        right.join_subtrees(lo, parent, hi);
                    }
                }

                cur = parent;
            }

            // Every node now belongs to `left` or `right`.
            self.root = None;
            self.max = None;
            self.len = 0;

            left.refresh_cached();
            right.refresh_cached();

            #[cfg(feature = "tracing")]
            tracing::debug!(
                left_len = left.len,
                left_height = left.height(),
                right_len = right.len,
                right_height = right.height(),
                "split"
            );

            T::links(node).as_mut().clear();

            Split {
                left,
                pivot: T::from_ptr(node),
                right,
            }
        }
    }

    // Joins the detached subtrees `lo` and `hi` around `mid`, leaving the result in `self.root`.
    //
    // Every key in `lo` must be less than `mid`'s key, which must be less than every key in `hi`.
    // `self.root` is overwritten, and `self.len` and `self.max` are not updated.
    //
    // The taller subtree is descended along the spine facing the shorter one until the remaining
    // subtree is at most one taller than the shorter one. `mid` is grafted there, with the
    // remaining subtree and the shorter tree as its children, and the tree is rebalanced from `mid`
    // up. Both the descent and the rebalancing walk cover _O(|h(lo) - h(hi)| + 1)_ nodes.
    //
    // Returns the number of nodes whose height grew while rebalancing.
    pub(crate) unsafe fn join_subtrees(&mut self, lo: Link<T>, mid: NonNull<T>, hi: Link<T>) -> usize {
        unsafe {
            self.maybe_set_parent(lo, None);
            self.maybe_set_parent(hi, None);

            let lo_height = self.height_of(lo);
            let hi_height = self.height_of(hi);

            let (tall, short, short_height, spine) = if lo_height >= hi_height {
                (lo, hi, hi_height, Dir::Right)
            } else {
                (hi, lo, lo_height, Dir::Left)
            };

            let mut graft_parent = None;
            let mut displaced = tall;

            while let Some(cur) = displaced.filter(|&d| self.height_of(Some(d)) > short_height + 1) {
                graft_parent = Some(cur);
                displaced = T::links(cur).as_ref().child(spine);
            }

            // `mid` keeps the displaced subtree on the side away from the shorter tree.
            T::links(mid).as_mut().clear();
            T::links(mid).as_mut().set_child(!spine, displaced);
            T::links(mid).as_mut().set_child(spine, short);
            T::links(mid).as_mut().set_parent(graft_parent);
            self.maybe_set_parent(displaced, Some(mid));
            self.maybe_set_parent(short, Some(mid));

            match graft_parent {
                Some(parent) => {
                    T::links(parent).as_mut().set_child(spine, Some(mid));
                    self.root = tall;
                }
                None => self.root = Some(mid),
            }

            self.rebalance_from(Some(mid))
        }
    }

    // Recomputes `len` and `max` from the root.
    unsafe fn refresh_cached(&mut self) {
        unsafe {
            self.len = self.len_of(self.root);
            self.max = self.root.map(|root| self.extreme(root, Dir::Right));
        }
    }

    // Returns `true` if every key in the tree is less than `key`.
    fn all_below<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.max.map_or(true, |max| unsafe {
            key.cmp(max.as_ref().key().borrow()) == Ordering::Greater
        })
    }

    // Returns `true` if every key in the tree is greater than `key`.
    fn all_above<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.root.map_or(true, |root| unsafe {
            let min = self.extreme(root, Dir::Left);
            key.cmp(min.as_ref().key().borrow()) == Ordering::Less
        })
    }
}
