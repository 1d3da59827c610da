//! The node codec: pure, in-place accessors over a page buffer.
//!
//! A node is the content of a single page, tagged leaf or internal at byte 0. Every
//! accessor here operates directly on the caller's page buffer — there is no owned
//! copy, no intermediate representation, and no allocation. `ROW_SIZE` and
//! `INTERNAL_NODE_MAX_KEYS` are crate-wide constants rather than per-node parameters,
//! since this store has exactly one fixed row shape and one fixed fanout, unlike a
//! multi-schema table engine.
//!
//! | Property           | Internal node                  | Leaf node              |
//! |---------------------|---------------------------------|-------------------------|
//! | Stores              | keys and pointers to children   | keys and values         |
//! | Number of keys       | up to `INTERNAL_NODE_MAX_KEYS`  | as many as will fit     |
//! | Number of pointers   | number of keys + 1              | none                    |
//! | Key purpose          | routing                         | paired with value       |

use crate::err;
use crate::errors::Error;
use crate::pager::PAGE_SIZE;
use crate::storage::row::ROW_SIZE;

/// Sentinel for "no right child yet" in a freshly initialized internal node.
pub const INVALID_PAGE_NUM: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf,
    Internal,
}

// --- Common node header ---
const NODE_TYPE_OFFSET: usize = 0;
const NODE_TYPE_SIZE: usize = 1;
const IS_ROOT_OFFSET: usize = NODE_TYPE_OFFSET + NODE_TYPE_SIZE;
const IS_ROOT_SIZE: usize = 1;
const PARENT_POINTER_OFFSET: usize = IS_ROOT_OFFSET + IS_ROOT_SIZE;
const PARENT_POINTER_SIZE: usize = 4;
pub const COMMON_NODE_HEADER_SIZE: usize = NODE_TYPE_SIZE + IS_ROOT_SIZE + PARENT_POINTER_SIZE;

// --- Leaf node header ---
const LEAF_NODE_NUM_CELLS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const LEAF_NODE_NUM_CELLS_SIZE: usize = 4;
const LEAF_NODE_NEXT_LEAF_OFFSET: usize = LEAF_NODE_NUM_CELLS_OFFSET + LEAF_NODE_NUM_CELLS_SIZE;
const LEAF_NODE_NEXT_LEAF_SIZE: usize = 4;
pub const LEAF_NODE_HEADER_SIZE: usize = LEAF_NODE_NEXT_LEAF_OFFSET + LEAF_NODE_NEXT_LEAF_SIZE;

// --- Leaf node body ---
const LEAF_NODE_KEY_SIZE: usize = 4;
const LEAF_NODE_VALUE_OFFSET: usize = LEAF_NODE_KEY_SIZE;
pub const LEAF_NODE_CELL_SIZE: usize = LEAF_NODE_KEY_SIZE + ROW_SIZE;
const LEAF_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - LEAF_NODE_HEADER_SIZE;

/// Maximum number of cells a leaf can hold: `floor((PAGE_SIZE - header) / cell size)`.
pub const LEAF_NODE_MAX_CELLS: usize = LEAF_NODE_SPACE_FOR_CELLS / LEAF_NODE_CELL_SIZE;
/// Cells sent to the right sibling on split: `ceil((MAX_CELLS + 1) / 2)`.
pub const LEAF_NODE_RIGHT_SPLIT_COUNT: usize = (LEAF_NODE_MAX_CELLS + 2) / 2;
/// Cells kept by the left sibling on split: the remainder.
pub const LEAF_NODE_LEFT_SPLIT_COUNT: usize = (LEAF_NODE_MAX_CELLS + 1) - LEAF_NODE_RIGHT_SPLIT_COUNT;

// --- Internal node header ---
const INTERNAL_NODE_NUM_KEYS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const INTERNAL_NODE_NUM_KEYS_SIZE: usize = 4;
const INTERNAL_NODE_RIGHT_CHILD_OFFSET: usize =
    INTERNAL_NODE_NUM_KEYS_OFFSET + INTERNAL_NODE_NUM_KEYS_SIZE;
const INTERNAL_NODE_RIGHT_CHILD_SIZE: usize = 4;
const INTERNAL_NODE_HEADER_SIZE: usize =
    INTERNAL_NODE_RIGHT_CHILD_OFFSET + INTERNAL_NODE_RIGHT_CHILD_SIZE;

// --- Internal node body ---
const INTERNAL_NODE_CHILD_SIZE: usize = 4;
const INTERNAL_NODE_KEY_SIZE: usize = 4;
const INTERNAL_NODE_CELL_SIZE: usize = INTERNAL_NODE_CHILD_SIZE + INTERNAL_NODE_KEY_SIZE;
/// Small on purpose, to exercise splits without needing thousands of rows.
pub const INTERNAL_NODE_MAX_KEYS: usize = 3;

fn get_u32(data: &[u8], offset: usize, what: &str) -> Result<u32, Error> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or_else(|| err!(Storage, "{} offset {} exceeds page size", what, offset))?;
    Ok(u32::from_le_bytes(bytes.try_into().expect("slice is 4 bytes")))
}

fn set_u32(data: &mut [u8], offset: usize, what: &str, value: u32) -> Result<(), Error> {
    let bytes = data
        .get_mut(offset..offset + 4)
        .ok_or_else(|| err!(Storage, "{} offset {} exceeds page size", what, offset))?;
    bytes.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// A borrowed, in-place view over one page's bytes.
pub struct NodeView<'a> {
    data: &'a mut [u8],
}

impl<'a> NodeView<'a> {
    pub fn new(data: &'a mut [u8; PAGE_SIZE]) -> Self {
        NodeView { data }
    }

    // --- common header ---

    pub fn node_type(&self) -> Result<NodeType, Error> {
        match self.data[NODE_TYPE_OFFSET] {
            1 => Ok(NodeType::Leaf),
            0 => Ok(NodeType::Internal),
            other => Err(err!(Storage, "invalid node type tag: {}", other)),
        }
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.data[NODE_TYPE_OFFSET] = match node_type {
            NodeType::Leaf => 1,
            NodeType::Internal => 0,
        };
    }

    pub fn is_root(&self) -> bool {
        self.data[IS_ROOT_OFFSET] == 1
    }

    pub fn set_is_root(&mut self, is_root: bool) {
        self.data[IS_ROOT_OFFSET] = is_root as u8;
    }

    pub fn parent(&self) -> Result<u32, Error> {
        get_u32(self.data, PARENT_POINTER_OFFSET, "parent pointer")
    }

    pub fn set_parent(&mut self, parent: u32) -> Result<(), Error> {
        set_u32(self.data, PARENT_POINTER_OFFSET, "parent pointer", parent)
    }

    /// The greatest key in this node's subtree: the leaf's last key, or the max key of
    /// the internal node's right-child subtree (the rightmost path always holds the
    /// current max, since stored separator keys lag behind inserts into that subtree).
    pub fn own_max_key(&self) -> Result<u32, Error> {
        match self.node_type()? {
            NodeType::Leaf => {
                let n = self.leaf_num_cells()?;
                if n == 0 {
                    return Err(err!(Storage, "max_key of empty leaf"));
                }
                self.leaf_key(n - 1)
            }
            NodeType::Internal => Err(err!(
                Storage,
                "own_max_key of an internal node requires descending into its right child"
            )),
        }
    }

    // --- leaf header/body ---

    pub fn leaf_num_cells(&self) -> Result<u32, Error> {
        get_u32(self.data, LEAF_NODE_NUM_CELLS_OFFSET, "num_cells")
    }

    pub fn set_leaf_num_cells(&mut self, num: u32) -> Result<(), Error> {
        set_u32(self.data, LEAF_NODE_NUM_CELLS_OFFSET, "num_cells", num)
    }

    /// `0` means "no next leaf". That's the same value page 0 (the root) would have, but
    /// the root is only ever a leaf before the first split, at which point it becomes
    /// internal — so in practice `0` is unambiguous here.
    pub fn leaf_next_leaf(&self) -> Result<u32, Error> {
        get_u32(self.data, LEAF_NODE_NEXT_LEAF_OFFSET, "next_leaf")
    }

    pub fn set_leaf_next_leaf(&mut self, next_leaf: u32) -> Result<(), Error> {
        set_u32(self.data, LEAF_NODE_NEXT_LEAF_OFFSET, "next_leaf", next_leaf)
    }

    fn leaf_cell_offset(&self, cell_num: u32) -> Result<usize, Error> {
        let cell_num = cell_num as usize;
        if cell_num >= LEAF_NODE_MAX_CELLS {
            return Err(err!(
                Storage,
                "leaf cell {} exceeds LEAF_NODE_MAX_CELLS ({})",
                cell_num,
                LEAF_NODE_MAX_CELLS
            ));
        }
        Ok(LEAF_NODE_HEADER_SIZE + cell_num * LEAF_NODE_CELL_SIZE)
    }

    pub fn leaf_cell(&self, cell_num: u32) -> Result<&[u8], Error> {
        let offset = self.leaf_cell_offset(cell_num)?;
        self.data
            .get(offset..offset + LEAF_NODE_CELL_SIZE)
            .ok_or_else(|| err!(Storage, "leaf cell {} exceeds page size", cell_num))
    }

    pub fn leaf_cell_mut(&mut self, cell_num: u32) -> Result<&mut [u8], Error> {
        let offset = self.leaf_cell_offset(cell_num)?;
        self.data
            .get_mut(offset..offset + LEAF_NODE_CELL_SIZE)
            .ok_or_else(|| err!(Storage, "leaf cell {} exceeds page size", cell_num))
    }

    pub fn leaf_key(&self, cell_num: u32) -> Result<u32, Error> {
        let cell = self.leaf_cell(cell_num)?;
        Ok(u32::from_le_bytes(cell[..LEAF_NODE_KEY_SIZE].try_into().expect("4 bytes")))
    }

    pub fn set_leaf_key(&mut self, cell_num: u32, key: u32) -> Result<(), Error> {
        let cell = self.leaf_cell_mut(cell_num)?;
        cell[..LEAF_NODE_KEY_SIZE].copy_from_slice(&key.to_le_bytes());
        Ok(())
    }

    pub fn leaf_value(&self, cell_num: u32) -> Result<&[u8], Error> {
        let cell = self.leaf_cell(cell_num)?;
        Ok(&cell[LEAF_NODE_VALUE_OFFSET..LEAF_NODE_VALUE_OFFSET + ROW_SIZE])
    }

    pub fn set_leaf_value(&mut self, cell_num: u32, row_bytes: &[u8]) -> Result<(), Error> {
        if row_bytes.len() != ROW_SIZE {
            return Err(err!(
                Storage,
                "row buffer has {} bytes, expected {}",
                row_bytes.len(),
                ROW_SIZE
            ));
        }
        let cell = self.leaf_cell_mut(cell_num)?;
        cell[LEAF_NODE_VALUE_OFFSET..LEAF_NODE_VALUE_OFFSET + ROW_SIZE].copy_from_slice(row_bytes);
        Ok(())
    }

    /// Writes a full cell (key + row) in one call.
    pub fn set_leaf_cell(&mut self, cell_num: u32, key: u32, row_bytes: &[u8]) -> Result<(), Error> {
        self.set_leaf_key(cell_num, key)?;
        self.set_leaf_value(cell_num, row_bytes)
    }

    /// Zeros the page and writes a fresh leaf header.
    pub fn initialize_leaf(&mut self) -> Result<(), Error> {
        self.data.fill(0);
        self.set_node_type(NodeType::Leaf);
        self.set_is_root(false);
        self.set_leaf_num_cells(0)?;
        self.set_leaf_next_leaf(0)
    }

    // --- internal header/body ---

    pub fn internal_num_keys(&self) -> Result<u32, Error> {
        get_u32(self.data, INTERNAL_NODE_NUM_KEYS_OFFSET, "num_keys")
    }

    pub fn set_internal_num_keys(&mut self, num_keys: u32) -> Result<(), Error> {
        set_u32(self.data, INTERNAL_NODE_NUM_KEYS_OFFSET, "num_keys", num_keys)
    }

    pub fn internal_right_child(&self) -> Result<u32, Error> {
        get_u32(self.data, INTERNAL_NODE_RIGHT_CHILD_OFFSET, "right_child")
    }

    pub fn set_internal_right_child(&mut self, right_child: u32) -> Result<(), Error> {
        set_u32(
            self.data,
            INTERNAL_NODE_RIGHT_CHILD_OFFSET,
            "right_child",
            right_child,
        )
    }

    fn internal_cell_offset(&self, cell_num: u32) -> usize {
        INTERNAL_NODE_HEADER_SIZE + cell_num as usize * INTERNAL_NODE_CELL_SIZE
    }

    /// Returns the page number of child `child_num`. `child_num == num_keys` returns
    /// `right_child`.
    pub fn internal_child(&self, child_num: u32) -> Result<u32, Error> {
        let num_keys = self.internal_num_keys()?;
        if child_num > num_keys {
            return Err(err!(
                Storage,
                "child index {} exceeds num_keys {}",
                child_num,
                num_keys
            ));
        }
        if child_num == num_keys {
            self.internal_right_child()
        } else {
            let offset = self.internal_cell_offset(child_num);
            get_u32(self.data, offset, "internal child")
        }
    }

    /// Sets child `child_num`. `child_num == num_keys` sets `right_child`.
    pub fn set_internal_child(&mut self, child_num: u32, child_page: u32) -> Result<(), Error> {
        let num_keys = self.internal_num_keys()?;
        if child_num > num_keys {
            return Err(err!(
                Storage,
                "child index {} exceeds num_keys {}",
                child_num,
                num_keys
            ));
        }
        if child_num == num_keys {
            self.set_internal_right_child(child_page)
        } else {
            let offset = self.internal_cell_offset(child_num);
            set_u32(self.data, offset, "internal child", child_page)
        }
    }

    pub fn internal_key(&self, key_num: u32) -> Result<u32, Error> {
        let num_keys = self.internal_num_keys()?;
        if key_num >= num_keys {
            return Err(err!(
                Storage,
                "key index {} exceeds num_keys {}",
                key_num,
                num_keys
            ));
        }
        let offset = self.internal_cell_offset(key_num) + INTERNAL_NODE_CHILD_SIZE;
        get_u32(self.data, offset, "internal key")
    }

    pub fn set_internal_key(&mut self, key_num: u32, key: u32) -> Result<(), Error> {
        let num_keys = self.internal_num_keys()?;
        if key_num >= num_keys {
            return Err(err!(
                Storage,
                "key index {} exceeds num_keys {}",
                key_num,
                num_keys
            ));
        }
        let offset = self.internal_cell_offset(key_num) + INTERNAL_NODE_CHILD_SIZE;
        set_u32(self.data, offset, "internal key", key)
    }

    /// Smallest `i` with `key <= keys[i]`, or `num_keys` if `key` is past every stored
    /// separator (i.e. it belongs under `right_child`).
    pub fn internal_find_child(&self, key: u32) -> Result<u32, Error> {
        let num_keys = self.internal_num_keys()?;
        let (mut lo, mut hi) = (0u32, num_keys);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if key <= self.internal_key(mid)? {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(lo)
    }

    /// Updates the stored separator key that used to read `old_key` to `new_key`. A
    /// no-op (not an error) if `old_key` isn't among this node's keys, since the
    /// grandparent isn't guaranteed to hold the key it's being asked to replace.
    pub fn update_internal_key(&mut self, old_key: u32, new_key: u32) -> Result<(), Error> {
        let num_keys = self.internal_num_keys()?;
        for i in 0..num_keys {
            if self.internal_key(i)? == old_key {
                return self.set_internal_key(i, new_key);
            }
        }
        Ok(())
    }

    /// Zeros the page and writes a fresh internal header with no children yet.
    pub fn initialize_internal(&mut self) -> Result<(), Error> {
        self.data.fill(0);
        self.set_node_type(NodeType::Internal);
        self.set_is_root(false);
        self.set_internal_num_keys(0)?;
        self.set_internal_right_child(INVALID_PAGE_NUM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_page() -> [u8; PAGE_SIZE] {
        [0u8; PAGE_SIZE]
    }

    #[test]
    fn leaf_header_roundtrip() {
        let mut page = blank_page();
        let mut node = NodeView::new(&mut page);
        node.initialize_leaf().unwrap();
        assert_eq!(node.node_type().unwrap(), NodeType::Leaf);
        assert_eq!(node.leaf_num_cells().unwrap(), 0);
        assert_eq!(node.leaf_next_leaf().unwrap(), 0);
        node.set_leaf_num_cells(3).unwrap();
        node.set_leaf_next_leaf(9).unwrap();
        node.set_parent(2).unwrap();
        assert_eq!(node.leaf_num_cells().unwrap(), 3);
        assert_eq!(node.leaf_next_leaf().unwrap(), 9);
        assert_eq!(node.parent().unwrap(), 2);
    }

    #[test]
    fn leaf_cell_roundtrip() {
        let mut page = blank_page();
        let mut node = NodeView::new(&mut page);
        node.initialize_leaf().unwrap();
        let row_bytes = [7u8; ROW_SIZE];
        node.set_leaf_cell(0, 42, &row_bytes).unwrap();
        assert_eq!(node.leaf_key(0).unwrap(), 42);
        assert_eq!(node.leaf_value(0).unwrap(), &row_bytes[..]);
    }

    #[test]
    fn internal_header_and_children_roundtrip() {
        let mut page = blank_page();
        let mut node = NodeView::new(&mut page);
        node.initialize_internal().unwrap();
        assert_eq!(node.internal_right_child().unwrap(), INVALID_PAGE_NUM);
        node.set_internal_num_keys(2).unwrap();
        node.set_internal_child(0, 10).unwrap();
        node.set_internal_key(0, 100).unwrap();
        node.set_internal_child(1, 20).unwrap();
        node.set_internal_key(1, 200).unwrap();
        node.set_internal_child(2, 30).unwrap(); // right_child
        assert_eq!(node.internal_child(0).unwrap(), 10);
        assert_eq!(node.internal_child(1).unwrap(), 20);
        assert_eq!(node.internal_child(2).unwrap(), 30);
        assert_eq!(node.internal_right_child().unwrap(), 30);
    }

    #[test]
    fn internal_find_child_picks_smallest_matching_slot() {
        let mut page = blank_page();
        let mut node = NodeView::new(&mut page);
        node.initialize_internal().unwrap();
        node.set_internal_num_keys(2).unwrap();
        node.set_internal_key(0, 10).unwrap();
        node.set_internal_key(1, 20).unwrap();
        assert_eq!(node.internal_find_child(5).unwrap(), 0);
        assert_eq!(node.internal_find_child(10).unwrap(), 0);
        assert_eq!(node.internal_find_child(15).unwrap(), 1);
        assert_eq!(node.internal_find_child(20).unwrap(), 1);
        assert_eq!(node.internal_find_child(21).unwrap(), 2);
    }

    #[test]
    fn update_internal_key_is_noop_when_old_key_absent() {
        let mut page = blank_page();
        let mut node = NodeView::new(&mut page);
        node.initialize_internal().unwrap();
        node.set_internal_num_keys(1).unwrap();
        node.set_internal_key(0, 10).unwrap();
        node.update_internal_key(999, 42).unwrap();
        assert_eq!(node.internal_key(0).unwrap(), 10);
        node.update_internal_key(10, 42).unwrap();
        assert_eq!(node.internal_key(0).unwrap(), 42);
    }

    #[test]
    fn split_counts_sum_to_max_plus_one() {
        assert_eq!(
            LEAF_NODE_LEFT_SPLIT_COUNT + LEAF_NODE_RIGHT_SPLIT_COUNT,
            LEAF_NODE_MAX_CELLS + 1
        );
        assert!(LEAF_NODE_RIGHT_SPLIT_COUNT >= LEAF_NODE_LEFT_SPLIT_COUNT);
    }
}
