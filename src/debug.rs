extern crate std;

use core::ptr::NonNull;
use std::{collections::VecDeque, fmt, prelude::v1::*};

use crate::{AvlTree, Links, TreeNode};

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Writes the tree as a Graphviz `digraph`, one rank per tree level.
    ///
    /// Nodes are labelled `key:height`; missing children are drawn as points.
    pub fn dotgraph<W>(&self, name: &str, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
        T::Key: fmt::Display,
    {
        let root = match self.root {
            Some(r) => r,
            None => return write!(w, "digraph \"graph-{name}\" {{}}"),
        };

        enum Item<T: ?Sized> {
            Node(NonNull<T>),
            Missing(u32),
        }

        let mut queue = VecDeque::new();
        queue.push_back(Item::Node(root));

        write!(
            w,
            "digraph \"graph-{name}\" {{\n subgraph \"subgraph-{name}\" {{"
        )?;

        let mut missing = 0;
        let mut links = String::new();

        while !queue.is_empty() {
            use fmt::Write;

            write!(w, "{{rank=same; ")?;

            for _ in 0..queue.len() {
                let node = match queue.pop_front() {
                    Some(Item::Node(node)) => node,
                    Some(Item::Missing(id)) => {
                        write!(w, "\"graph-{name}-missing{id}\" [shape=point]; ")?;
                        continue;
                    }
                    None => break,
                };

                let key = unsafe { node.as_ref().key() };
                let height = unsafe { T::links(node).as_ref().height() };
                write!(w, "\"graph-{name}-{key}\" [label=\"{key}:{height}\"]; ")?;

                let children = unsafe {
                    let node_links = T::links(node).as_ref();
                    [node_links.left(), node_links.right()]
                };

                for child in children {
                    if let Some(child) = child {
                        let child_key = unsafe { child.as_ref().key() };

                        queue.push_back(Item::Node(child));
                        writeln!(
                            links,
                            "\"graph-{name}-{key}\" -> \"graph-{name}-{child_key}\";"
                        )?;
                    } else {
                        queue.push_back(Item::Missing(missing));
                        writeln!(
                            links,
                            "\"graph-{name}-{key}\" -> \"graph-{name}-missing{missing}\";"
                        )?;
                        missing += 1;
                    }
                }
            }

            writeln!(w, "}}")?;
        }

        w.write_str(&links)?;

        w.write_str(" }\n}")
    }

    /// Writes the tree as indented text, one node per line, right subtree first.
    ///
    /// ```text
    /// 20 (h=1)
    /// ├─ 30 (h=0)
    /// └─ 10 (h=0)
    /// ```
    ///
    /// A node with a single child shows the missing one as `·`.
    pub fn pretty<W>(&self, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
        T::Key: fmt::Display,
    {
        match self.root {
            Some(root) => unsafe { self.pretty_at(&mut w, root, "") },
            None => w.write_str("(empty)\n"),
        }
    }

    unsafe fn pretty_at<W>(&self, w: &mut W, node: NonNull<T>, tab: &str) -> fmt::Result
    where
        W: fmt::Write,
        T::Key: fmt::Display,
    {
        unsafe {
            let links = T::links(node).as_ref();
            writeln!(w, "{} (h={})", node.as_ref().key(), links.height())?;

            if links.left().is_none() && links.right().is_none() {
                return Ok(());
            }

            let children = [(links.right(), false), (links.left(), true)];
            for (child, is_last) in children {
                let (branch, child_tab) = if is_last {
                    ("└─", format!("{tab}   "))
                } else {
                    ("├─", format!("{tab}│  "))
                };

                write!(w, "{tab}{branch} ")?;
                match child {
                    Some(child) => self.pretty_at(w, child, &child_tab)?,
                    None => writeln!(w, "·")?,
                }
            }

            Ok(())
        }
    }
}
