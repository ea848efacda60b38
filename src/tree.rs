use crate::node::{
    append_kv, append_range, lookup_le, merge, split3, Node, BNODE_LEAF, BNODE_NODE,
    BTREE_MAX_KEY_SIZE, BTREE_MAX_VALUE_SIZE, BTREE_PAGE_SIZE, HEADER,
};
use crate::store::PageStore;

pub struct BTree {
    // 0 while the tree is empty; page 0 is the master, never a node
    root: u64,
}

impl BTree {
    pub fn new() -> BTree {
        BTree { root: 0 }
    }

    pub fn from_root(root: u64) -> BTree {
        BTree { root }
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    pub fn get<S: PageStore>(&self, store: &S, key: &[u8]) -> Option<Vec<u8>> {
        check_key(key);
        if self.root == 0 {
            return None;
        }
        tree_get(store, self.root, key)
    }

    pub fn insert<S: PageStore>(&mut self, store: &mut S, key: &[u8], val: &[u8]) {
        check_key(key);
        assert!(val.len() <= BTREE_MAX_VALUE_SIZE, "value too large");

        if self.root == 0 {
            // index 0 is the empty-key sentinel, the lower bound lookup_le relies on
            let mut root = Node::page();
            root.set_header(BNODE_LEAF, 2);
            append_kv(&mut root, 0, 0, b"", b"");
            append_kv(&mut root, 1, 0, key, val);
            self.root = store.alloc(root);
            log::debug!("ROOT_INIT [root={}]", self.root);
            return;
        }

        let node = store.page(self.root).to_node();
        store.free(self.root);
        let node = tree_insert(store, node, key, val);

        let mut split = split3(node);
        if split.len() == 1 {
            self.root = store.alloc(split.pop().unwrap());
        } else {
            let mut root = Node::page();
            root.set_header(BNODE_NODE, split.len() as u16);
            log::debug!("ROOT_SPLIT [pieces={}]", split.len());
            for (i, kid) in split.into_iter().enumerate() {
                let first = kid.key(0).to_vec();
                let ptr = store.alloc(kid);
                append_kv(&mut root, i as u16, ptr, &first, b"");
            }
            self.root = store.alloc(root);
        }
    }

    pub fn delete<S: PageStore>(&mut self, store: &mut S, key: &[u8]) -> bool {
        check_key(key);
        if self.root == 0 {
            return false;
        }

        let root = store.page(self.root).to_node();
        let updated = match tree_delete(store, root, key) {
            Some(node) => node,
            None => return false,
        };

        store.free(self.root);
        if updated.btype() == BNODE_NODE && updated.nkeys() == 1 {
            self.root = updated.ptr(0);
            log::debug!("ROOT_COLLAPSE [root={}]", self.root);
        } else {
            self.root = store.alloc(updated);
        }
        true
    }
}

impl Default for BTree {
    fn default() -> BTree {
        BTree::new()
    }
}

fn check_key(key: &[u8]) {
    assert!(!key.is_empty(), "empty key");
    assert!(key.len() <= BTREE_MAX_KEY_SIZE, "key too large");
}

fn tree_get<S: PageStore>(store: &S, ptr: u64, key: &[u8]) -> Option<Vec<u8>> {
    let node = store.page(ptr);
    let idx = lookup_le(&node, key);
    match node.btype() {
        BNODE_LEAF => {
            if node.key(idx) == key {
                Some(node.val(idx).to_vec())
            } else {
                None
            }
        }
        BNODE_NODE => tree_get(store, node.ptr(idx), key),
        t => panic!("unrecognized node type {}", t),
    }
}

// the result may be up to twice the page size; the caller splits it
fn tree_insert<S: PageStore>(store: &mut S, node: Node, key: &[u8], val: &[u8]) -> Node {
    let mut new = Node::oversized();
    let idx = lookup_le(&node, key);
    match node.btype() {
        BNODE_LEAF => {
            if node.key(idx) == key {
                leaf_update(&mut new, &node, idx, key, val);
            } else {
                leaf_insert(&mut new, &node, idx + 1, key, val);
            }
        }
        BNODE_NODE => node_insert(store, &mut new, &node, idx, key, val),
        t => panic!("unrecognized node type {}", t),
    }
    new
}

fn node_insert<S: PageStore>(
    store: &mut S,
    new: &mut Node,
    node: &Node,
    idx: u16,
    key: &[u8],
    val: &[u8],
) {
    let kptr = node.ptr(idx);
    let knode = store.page(kptr).to_node();
    store.free(kptr);

    let knode = tree_insert(store, knode, key, val);
    let split = split3(knode);
    replace_kid_n(store, new, node, idx, split);
}

fn leaf_insert(new: &mut Node, old: &Node, idx: u16, key: &[u8], val: &[u8]) {
    new.set_header(BNODE_LEAF, old.nkeys() + 1);
    append_range(new, old, 0, 0, idx);
    append_kv(new, idx, 0, key, val);
    append_range(new, old, idx + 1, idx, old.nkeys() - idx);
}

fn leaf_update(new: &mut Node, old: &Node, idx: u16, key: &[u8], val: &[u8]) {
    new.set_header(BNODE_LEAF, old.nkeys());
    append_range(new, old, 0, 0, idx);
    append_kv(new, idx, 0, key, val);
    append_range(new, old, idx + 1, idx + 1, old.nkeys() - idx - 1);
}

fn leaf_delete(new: &mut Node, old: &Node, idx: u16) {
    new.set_header(old.btype(), old.nkeys() - 1);
    append_range(new, old, 0, 0, idx);
    append_range(new, old, idx, idx + 1, old.nkeys() - idx - 1);
}

fn replace_kid_n<S: PageStore>(
    store: &mut S,
    new: &mut Node,
    old: &Node,
    idx: u16,
    kids: Vec<Node>,
) {
    let inc = kids.len() as u16;
    new.set_header(BNODE_NODE, old.nkeys() + inc - 1);
    append_range(new, old, 0, 0, idx);
    for (i, kid) in kids.into_iter().enumerate() {
        let first = kid.key(0).to_vec();
        let ptr = store.alloc(kid);
        append_kv(new, idx + i as u16, ptr, &first, b"");
    }
    append_range(new, old, idx + inc, idx + 1, old.nkeys() - idx - 1);
}

fn replace_2_kid(new: &mut Node, old: &Node, idx: u16, ptr: u64, key: &[u8]) {
    new.set_header(BNODE_NODE, old.nkeys() - 1);
    append_range(new, old, 0, 0, idx);
    append_kv(new, idx, ptr, key, b"");
    append_range(new, old, idx + 1, idx + 2, old.nkeys() - idx - 2);
}

fn tree_delete<S: PageStore>(store: &mut S, node: Node, key: &[u8]) -> Option<Node> {
    let idx = lookup_le(&node, key);
    match node.btype() {
        BNODE_LEAF => {
            if node.key(idx) != key {
                return None;
            }
            let mut new = Node::page();
            leaf_delete(&mut new, &node, idx);
            Some(new)
        }
        BNODE_NODE => node_delete(store, &node, idx, key),
        t => panic!("unrecognized node type {}", t),
    }
}

fn node_delete<S: PageStore>(store: &mut S, node: &Node, idx: u16, key: &[u8]) -> Option<Node> {
    let ptr = node.ptr(idx);
    let child = store.page(ptr).to_node();
    let updated = tree_delete(store, child, key)?;
    store.free(ptr);

    let mut new = Node::page();
    match should_merge(store, node, idx, &updated) {
        Some(Merge::Left(sibling)) => {
            log::debug!("MERGE_LEFT [idx={}]", idx);
            let merged = merge(&sibling, &updated);
            store.free(node.ptr(idx - 1));
            let first = merged.key(0).to_vec();
            let mptr = store.alloc(merged);
            replace_2_kid(&mut new, node, idx - 1, mptr, &first);
        }
        Some(Merge::Right(sibling)) => {
            log::debug!("MERGE_RIGHT [idx={}]", idx);
            let merged = merge(&updated, &sibling);
            store.free(node.ptr(idx + 1));
            let first = merged.key(0).to_vec();
            let mptr = store.alloc(merged);
            replace_2_kid(&mut new, node, idx, mptr, &first);
        }
        None => {
            assert!(updated.nkeys() > 0);
            replace_kid_n(store, &mut new, node, idx, vec![updated]);
        }
    }
    Some(new)
}

enum Merge {
    Left(Node),
    Right(Node),
}

// merge iff the child dropped to a quarter page and the result fits
fn should_merge<S: PageStore>(store: &S, node: &Node, idx: u16, updated: &Node) -> Option<Merge> {
    if updated.nbytes() as usize > BTREE_PAGE_SIZE / 4 {
        return None;
    }
    if idx > 0 {
        let sibling = store.page(node.ptr(idx - 1)).to_node();
        let combined = sibling.nbytes() as usize + updated.nbytes() as usize - HEADER;
        if combined <= BTREE_PAGE_SIZE {
            return Some(Merge::Left(sibling));
        }
    }
    if idx + 1 < node.nkeys() {
        let sibling = store.page(node.ptr(idx + 1)).to_node();
        let combined = sibling.nbytes() as usize + updated.nbytes() as usize - HEADER;
        if combined <= BTREE_PAGE_SIZE {
            return Some(Merge::Right(sibling));
        }
    }
    None
}
