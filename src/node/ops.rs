use byteorder::{ByteOrder, LittleEndian};

use super::{BNode, Node, BTREE_PAGE_SIZE, HEADER};

// position of the last key <= the given key; the first key is copied
// from the parent, so it is a lower bound for any well-formed descent
pub fn lookup_le<B: AsRef<[u8]>>(node: &BNode<B>, key: &[u8]) -> u16 {
    let mut left = 0;
    let mut right = node.nkeys() - 1;
    while left + 1 < right {
        let mid = (left + right) / 2;
        if node.key(mid) >= key {
            right = mid;
        } else {
            left = mid;
        }
    }
    if node.key(left) >= key {
        if node.key(left) == key {
            return left;
        }
        assert!(left > 0, "key sorts below every key in the node");
        return left - 1;
    }
    if node.key(right) >= key {
        if node.key(right) == key {
            return right;
        }
        return right - 1;
    }
    right
}

pub fn append_kv(dst: &mut Node, idx: u16, ptr: u64, key: &[u8], val: &[u8]) {
    dst.set_ptr(idx, ptr);

    let pos = dst.kv_pos(idx) as usize;
    let klen = key.len();
    let vlen = val.len();
    LittleEndian::write_u16(&mut dst.data[pos..], klen as u16);
    LittleEndian::write_u16(&mut dst.data[pos + 2..], vlen as u16);
    dst.data[pos + 4..pos + 4 + klen].copy_from_slice(key);
    dst.data[pos + 4 + klen..pos + 4 + klen + vlen].copy_from_slice(val);

    dst.set_offset(idx + 1, dst.offset(idx) + 4 + klen as u16 + vlen as u16);
}

pub fn append_range<B: AsRef<[u8]>>(
    dst: &mut Node,
    src: &BNode<B>,
    dst_new: u16,
    src_old: u16,
    n: u16,
) {
    assert!(src_old + n <= src.nkeys());
    assert!(dst_new + n <= dst.nkeys());
    if n == 0 {
        return;
    }

    for i in 0..n {
        dst.set_ptr(dst_new + i, src.ptr(src_old + i));
    }

    let dst_begin = dst.offset(dst_new);
    let src_begin = src.offset(src_old);
    for i in 1..=n {
        dst.set_offset(dst_new + i, dst_begin + src.offset(src_old + i) - src_begin);
    }

    let kv_start = src.kv_pos(src_old) as usize;
    let kv_end = src.kv_pos(src_old + n) as usize;
    let dst_pos = dst.kv_pos(dst_new) as usize;
    dst.data[dst_pos..dst_pos + kv_end - kv_start]
        .copy_from_slice(&src.data.as_ref()[kv_start..kv_end]);
}

fn suffix_fits<B: AsRef<[u8]>>(node: &BNode<B>, idx: u16) -> bool {
    assert!(idx < node.nkeys());
    let nkeys = (node.nkeys() - idx) as usize;
    let kv_size = (node.nbytes() - node.kv_pos(idx)) as usize;
    HEADER + nkeys * 8 + nkeys * 2 + kv_size <= BTREE_PAGE_SIZE
}

// the right node always fits on a page; the left may not
pub fn split2(old: &Node) -> (Node, Node) {
    let mut left = 0;
    let mut right = old.nkeys() - 1;
    while left + 1 < right {
        let mid = (left + right) / 2;
        if suffix_fits(old, mid) {
            right = mid;
        } else {
            left = mid;
        }
    }
    let start = if suffix_fits(old, left) { left } else { right };

    let mut left_node = Node::oversized();
    let mut right_node = Node::page();
    left_node.set_header(old.btype(), start);
    append_range(&mut left_node, old, 0, 0, start);
    right_node.set_header(old.btype(), old.nkeys() - start);
    append_range(&mut right_node, old, 0, start, old.nkeys() - start);
    (left_node, right_node)
}

pub fn split3(old: Node) -> Vec<Node> {
    if old.nbytes() as usize <= BTREE_PAGE_SIZE {
        return vec![old];
    }

    let (left, right) = split2(&old);
    if left.nbytes() as usize <= BTREE_PAGE_SIZE {
        log::debug!("SPLIT2 [left={}][right={}]", left.nbytes(), right.nbytes());
        return vec![left, right];
    }

    let (leftleft, leftright) = split2(&left);
    assert!(leftleft.nbytes() as usize <= BTREE_PAGE_SIZE);
    log::debug!(
        "SPLIT3 [left={}][mid={}][right={}]",
        leftleft.nbytes(),
        leftright.nbytes(),
        right.nbytes()
    );
    vec![leftleft, leftright, right]
}

// the caller guarantees left.nbytes() + right.nbytes() - HEADER fits
pub fn merge<A: AsRef<[u8]>, B: AsRef<[u8]>>(left: &BNode<A>, right: &BNode<B>) -> Node {
    assert_eq!(left.btype(), right.btype());
    let mut merged = Node::page();
    merged.set_header(left.btype(), left.nkeys() + right.nkeys());
    append_range(&mut merged, left, 0, 0, left.nkeys());
    append_range(&mut merged, right, left.nkeys(), 0, right.nkeys());
    merged
}

#[cfg(test)]
mod tests {
    use super::super::BNODE_LEAF;
    use super::*;

    fn leaf(pairs: &[(&[u8], &[u8])]) -> Node {
        let mut node = Node::page();
        node.set_header(BNODE_LEAF, pairs.len() as u16);
        for (i, (key, val)) in pairs.iter().enumerate() {
            append_kv(&mut node, i as u16, 0, key, val);
        }
        node
    }

    #[test]
    fn append_kv_tracks_offsets() {
        let mut node = Node::page();
        node.set_header(BNODE_LEAF, 2);
        let key = &[1, 2, 3];
        let val = &[1, 2, 3, 4, 5];

        append_kv(&mut node, 0, 0, key, val);
        assert_eq!(node.ptr(0), 0);
        assert_eq!(node.offset(0), 0);
        assert_eq!(node.offset(1), (4 + key.len() + val.len()) as u16);
        assert_eq!(node.key(0), key);
        assert_eq!(node.val(0), val);

        append_kv(&mut node, 1, 5_201_314, key, val);
        assert_eq!(node.ptr(1), 5_201_314);
        assert_eq!(node.offset(2), 2 * (4 + key.len() + val.len()) as u16);
        assert_eq!(node.key(1), key);
        assert_eq!(node.val(1), val);
    }

    #[test]
    fn append_range_copies_entries() {
        let mut old = Node::page();
        old.set_header(BNODE_LEAF, 10);
        for i in 0..10u16 {
            append_kv(&mut old, i, i as u64, &[i as u8], &[i as u8]);
        }

        let mut new = Node::page();
        new.set_header(BNODE_LEAF, 10);
        append_range(&mut new, &old, 0, 0, 10);
        assert_eq!(new.data, old.data);

        // shifted copy: entry i of old lands at i + 1
        let mut new = Node::page();
        new.set_header(BNODE_LEAF, 11);
        append_kv(&mut new, 0, 0, &[0], &[0]);
        append_range(&mut new, &old, 1, 0, 10);
        for i in 1..11u16 {
            assert_eq!(new.key(i), old.key(i - 1));
            assert_eq!(new.val(i), old.val(i - 1));
            assert_eq!(new.ptr(i), old.ptr(i - 1));
        }
    }

    #[test]
    fn lookup_le_picks_the_last_key_not_above() {
        // keys 0, 2, 4, .. 18
        let mut node = Node::page();
        node.set_header(BNODE_LEAF, 10);
        for i in 0..10u16 {
            append_kv(&mut node, i, 0, &[2 * i as u8], &[2 * i as u8]);
        }

        assert_eq!(lookup_le(&node, &[2]), 1);
        assert_eq!(lookup_le(&node, &[3]), 1);
        assert_eq!(lookup_le(&node, &[20]), 9);
        assert_eq!(lookup_le(&node, &[16]), 8);
        assert_eq!(lookup_le(&node, &[1]), 0);
        assert_eq!(lookup_le(&node, &[0]), 0);
    }

    #[test]
    #[should_panic]
    fn lookup_le_rejects_a_key_below_the_whole_node() {
        let node = leaf(&[(&[2], &[2]), (&[4], &[4])]);
        lookup_le(&node, &[1]);
    }

    #[test]
    fn split2_puts_the_largest_fitting_suffix_right() {
        // ~4200 bytes, then ~200 bytes
        let key1 = vec![0u8; 1000];
        let val1 = vec![0u8; 3000];
        let mut key2 = vec![0u8; 100];
        key2[0] = 1;
        let val2 = vec![0u8; 100];

        let mut old = Node::oversized();
        old.set_header(BNODE_LEAF, 2);
        append_kv(&mut old, 0, 0, &key1, &val1);
        append_kv(&mut old, 1, 0, &key2, &val2);

        let (left, right) = split2(&old);
        assert_eq!(left.nkeys(), 1);
        assert_eq!(left.key(0), &key1[..]);
        assert_eq!(left.val(0), &val1[..]);
        assert_eq!(
            left.nbytes() as usize,
            HEADER + 8 + 2 + 4 + key1.len() + val1.len()
        );

        assert_eq!(right.nkeys(), 1);
        assert_eq!(right.key(0), &key2[..]);
        assert_eq!(right.val(0), &val2[..]);
        assert!((right.nbytes() as usize) < BTREE_PAGE_SIZE);
    }

    #[test]
    fn split3_returns_a_fitting_node_unchanged() {
        let node = leaf(&[(b"a", b"1"), (b"b", b"2")]);
        let nbytes = node.nbytes();
        let split = split3(node);
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].nbytes(), nbytes);
    }

    #[test]
    fn split3_concatenation_roundtrip() {
        // three ~1.6KB entries force a 2-way split; five force 3-way
        for entries in &[3u8, 5] {
            let mut old = Node::oversized();
            old.set_header(BNODE_LEAF, *entries as u16);
            for i in 0..*entries {
                let mut key = vec![0u8; 100];
                key[0] = i;
                let val = vec![i; 1500];
                append_kv(&mut old, i as u16, 0, &key, &val);
            }

            let total = old.nkeys();
            let split = split3(old.to_node());
            assert!(split.len() >= 2);

            let mut idx = 0u16;
            for piece in &split {
                assert!(piece.nbytes() as usize <= BTREE_PAGE_SIZE);
                assert!(piece.nkeys() >= 1);
                for i in 0..piece.nkeys() {
                    assert_eq!(piece.key(i), old.key(idx));
                    assert_eq!(piece.val(i), old.val(idx));
                    idx += 1;
                }
            }
            assert_eq!(idx, total);
        }
    }

    #[test]
    fn merge_concatenates_siblings() {
        let left = leaf(&[(&[0], &[0]), (&[1], &[1]), (&[2], &[2])]);
        let right = leaf(&[(&[3], &[3]), (&[4], &[4]), (&[5], &[5])]);

        let merged = merge(&left, &right);
        assert_eq!(merged.nkeys(), 6);
        for i in 0..6u16 {
            assert_eq!(merged.key(i), &[i as u8]);
            assert_eq!(merged.val(i), &[i as u8]);
        }
        assert_eq!(
            merged.nbytes(),
            left.nbytes() + right.nbytes() - HEADER as u16
        );
    }
}
