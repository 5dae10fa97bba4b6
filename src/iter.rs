use core::iter::FusedIterator;

use crate::{AvlTree, Dir, Link, Links, TreeNode};

/// An in-order iterator over the elements of an [`AvlTree`].
///
/// The iterator follows parent links instead of keeping a stack, so it does not allocate.
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    tree: &'tree AvlTree<T>,

    front: Link<T>,
    back: Link<T>,

    len: usize,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        Iter {
            tree,

            front: tree.root.map(|root| unsafe { tree.extreme(root, Dir::Left) }),
            back: tree.max,

            len: tree.len(),
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        // `len` reaching zero means the two ends have met.
        if self.len == 0 {
            return None;
        }

        let cur = self.front?;
        self.front = unsafe { self.tree.successor(cur) };
        self.len -= 1;

        Some(unsafe { cur.as_ref() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> DoubleEndedIterator for Iter<'tree, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back?;
        self.back = unsafe { self.tree.predecessor(cur) };
        self.len -= 1;

        Some(unsafe { cur.as_ref() })
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'tree, T> {}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'tree, T> {}
