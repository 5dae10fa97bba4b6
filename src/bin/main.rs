use std::ptr::NonNull;

use cordyceps::Linked;
use cordyceps_avl::{AvlMap, AvlTree, Links, Split, TreeNode};

#[derive(Debug)]
#[repr(C)]
struct Node {
    links: Links<Node>,
    key: u32,
}

impl Node {
    fn new(key: u32) -> Box<Node> {
        Box::new(Node {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<Node>> for Node {
    type Handle = Box<Node>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Node>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<Node>> for Node {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

fn keys(tree: &AvlTree<Node>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

fn show(label: &str, tree: &AvlTree<Node>) -> std::fmt::Result {
    let mut out = String::new();
    tree.pretty(&mut out)?;
    println!("{label}: {:?}\n{out}", keys(tree));
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut tree: AvlTree<Node> = AvlTree::new();

    for key in [11, 47, 28, 3, 108, 101, 158, 59, 157, 94, 78, 80, 154, 132, 82, 46] {
        let insertion = tree
            .insert(Node::new(key))
            .map_err(|rejected| rejected.error)?;
        println!(
            "insert {key}: edges {}, promotions {}",
            insertion.edges, insertion.promotions
        );
    }
    tree.assert_invariants();
    show("tree", &tree)?;

    let search = tree.finger_search(&154);
    println!("finger_search(154): path length {}", search.path_len);

    let Some(node) = tree.search(&59).node else {
        return Err("59 is missing".into());
    };
    let Split {
        mut left,
        pivot,
        right,
    } = unsafe { tree.split(node) };
    show("left", &left)?;
    show("right", &right)?;

    let before = left.rotations();
    left.join(right, pivot).map_err(|rejected| rejected.error)?;
    left.assert_invariants();
    println!("join rotations: {}", left.rotations() - before);
    show("joined", &left)?;

    let mut map = AvlMap::new();
    for (key, value) in [(3, "three"), (1, "one"), (2, "two")] {
        map.finger_insert(key, value)
            .map_err(|rejected| rejected.error)?;
    }
    println!("map: {:?}", map.to_sorted_pairs());

    Ok(())
}
