//! The B+tree itself: search, insert, and the split/promotion machinery that keeps the
//! tree balanced. Built directly on the node codec (`btree::NodeView`) and the pager —
//! every operation here re-borrows a page by number rather than holding more than one
//! page view alive at a time, since two `NodeView`s can never coexist against the same
//! `Pager` borrow.

use super::btree::{
    NodeType, NodeView, INTERNAL_NODE_MAX_KEYS, INVALID_PAGE_NUM, LEAF_NODE_LEFT_SPLIT_COUNT,
    LEAF_NODE_MAX_CELLS, LEAF_NODE_RIGHT_SPLIT_COUNT,
};
use super::cursor::Cursor;
use super::row::{Row, ROW_SIZE};
use crate::err;
use crate::errors::Error;
use crate::pager::{Pager, PAGE_SIZE};
use std::path::Path;

/// Outcome of `Tree::insert` — a duplicate key is a user error, not a storage fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateKey,
}

pub struct Tree {
    pager: Pager,
}

impl Tree {
    /// Opens (creating if absent) the database file at `path`. A brand new file gets a
    /// single root page, initialized as an empty leaf.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut pager = Pager::open(path)?;
        if pager.num_pages() == 0 {
            let root = pager.get(0)?;
            let mut node = NodeView::new(root);
            node.initialize_leaf()?;
            node.set_is_root(true);
        }
        Ok(Tree { pager })
    }

    pub fn root_page_num(&self) -> u32 {
        0
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.pager.close()
    }

    fn with_node<F, R>(&mut self, page_no: u32, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut NodeView) -> Result<R, Error>,
    {
        let page = self.pager.get(page_no)?;
        let mut node = NodeView::new(page);
        f(&mut node)
    }

    // --- search ---

    /// Descends from the root to the leaf that holds `key` or its insertion point.
    pub fn find(&mut self, key: u32) -> Result<Cursor, Error> {
        self.find_from(self.root_page_num(), key)
    }

    fn find_from(&mut self, page_no: u32, key: u32) -> Result<Cursor, Error> {
        let node_type = self.with_node(page_no, |n| n.node_type())?;
        match node_type {
            NodeType::Internal => {
                let child = self.with_node(page_no, |n| {
                    let slot = n.internal_find_child(key)?;
                    n.internal_child(slot)
                })?;
                self.find_from(child, key)
            }
            NodeType::Leaf => {
                let cell_no = self.with_node(page_no, |n| {
                    let num_cells = n.leaf_num_cells()?;
                    let (mut lo, mut hi) = (0u32, num_cells);
                    while lo < hi {
                        let mid = lo + (hi - lo) / 2;
                        let mid_key = n.leaf_key(mid)?;
                        if mid_key == key {
                            return Ok(mid);
                        }
                        if key < mid_key {
                            hi = mid;
                        } else {
                            lo = mid + 1;
                        }
                    }
                    Ok(lo)
                })?;
                Ok(Cursor {
                    page_no,
                    cell_no,
                    end_of_table: false,
                })
            }
        }
    }

    /// A cursor at the first row in key order, for a full ascending scan.
    pub fn scan_start(&mut self) -> Result<Cursor, Error> {
        let mut cursor = self.find(0)?;
        let num_cells = self.with_node(cursor.page_no, |n| n.leaf_num_cells())?;
        cursor.end_of_table = num_cells == 0;
        Ok(cursor)
    }

    /// Moves `cursor` to the next row in key order, following the leaf chain when the
    /// current leaf is exhausted.
    pub fn advance(&mut self, cursor: &mut Cursor) -> Result<(), Error> {
        cursor.cell_no += 1;
        let num_cells = self.with_node(cursor.page_no, |n| n.leaf_num_cells())?;
        if cursor.cell_no >= num_cells {
            let next_leaf = self.with_node(cursor.page_no, |n| n.leaf_next_leaf())?;
            if next_leaf == 0 {
                cursor.end_of_table = true;
            } else {
                cursor.page_no = next_leaf;
                cursor.cell_no = 0;
            }
        }
        Ok(())
    }

    pub fn read_row(&mut self, cursor: &Cursor) -> Result<Row, Error> {
        self.with_node(cursor.page_no, |n| {
            let bytes = n.leaf_value(cursor.cell_no)?;
            Row::decode(bytes)
        })
    }

    /// The greatest key in the subtree rooted at `page_no`.
    fn max_key(&mut self, page_no: u32) -> Result<u32, Error> {
        let leaf_max = self.with_node(page_no, |n| match n.node_type()? {
            NodeType::Leaf => Ok(Some(n.own_max_key()?)),
            NodeType::Internal => Ok(None),
        })?;
        if let Some(key) = leaf_max {
            return Ok(key);
        }
        let right_child = self.with_node(page_no, |n| n.internal_right_child())?;
        if right_child == INVALID_PAGE_NUM {
            return Err(err!(Storage, "internal node {} has no right child", page_no));
        }
        self.max_key(right_child)
    }

    // --- insert ---

    pub fn insert(&mut self, key: u32, row: &Row) -> Result<InsertOutcome, Error> {
        let cursor = self.find(key)?;
        let num_cells = self.with_node(cursor.page_no, |n| n.leaf_num_cells())?;
        if cursor.cell_no < num_cells {
            let existing = self.with_node(cursor.page_no, |n| n.leaf_key(cursor.cell_no))?;
            if existing == key {
                return Ok(InsertOutcome::DuplicateKey);
            }
        }
        self.leaf_insert(&cursor, key, row)?;
        Ok(InsertOutcome::Inserted)
    }

    fn leaf_insert(&mut self, cursor: &Cursor, key: u32, row: &Row) -> Result<(), Error> {
        let num_cells = self.with_node(cursor.page_no, |n| n.leaf_num_cells())?;
        if (num_cells as usize) < LEAF_NODE_MAX_CELLS {
            let row_bytes = row.encode();
            self.with_node(cursor.page_no, |n| {
                let mut i = num_cells;
                while i > cursor.cell_no {
                    let prev_key = n.leaf_key(i - 1)?;
                    let prev_value = n.leaf_value(i - 1)?.to_vec();
                    n.set_leaf_cell(i, prev_key, &prev_value)?;
                    i -= 1;
                }
                n.set_leaf_cell(cursor.cell_no, key, &row_bytes)?;
                n.set_leaf_num_cells(num_cells + 1)
            })
        } else {
            self.leaf_split_and_insert(cursor, key, row)
        }
    }

    /// Splits a full leaf, inserting the new cell into whichever half it belongs in, and
    /// either makes a new root (if the leaf was the root) or threads the new sibling into
    /// the parent.
    fn leaf_split_and_insert(&mut self, cursor: &Cursor, key: u32, row: &Row) -> Result<(), Error> {
        let old_page = cursor.page_no;
        let old_max_before = self.with_node(old_page, |n| n.own_max_key())?;
        let (old_parent, old_next_leaf, old_is_root) =
            self.with_node(old_page, |n| Ok((n.parent()?, n.leaf_next_leaf()?, n.is_root())))?;

        let new_page = self.pager.new_page_no();
        self.with_node(new_page, |n| n.initialize_leaf())?;
        self.with_node(new_page, |n| {
            n.set_parent(old_parent)?;
            n.set_leaf_next_leaf(old_next_leaf)
        })?;
        self.with_node(old_page, |n| n.set_leaf_next_leaf(new_page))?;

        let old_cells: Vec<(u32, Vec<u8>)> = self.with_node(old_page, |n| {
            let num_cells = n.leaf_num_cells()?;
            let mut cells = Vec::with_capacity(num_cells as usize);
            for i in 0..num_cells {
                cells.push((n.leaf_key(i)?, n.leaf_value(i)?.to_vec()));
            }
            Ok(cells)
        })?;

        let row_bytes = row.encode().to_vec();
        let total = LEAF_NODE_MAX_CELLS + 1;
        for i in (0..total).rev() {
            let (dest_page, dest_idx) = if i >= LEAF_NODE_LEFT_SPLIT_COUNT {
                (new_page, i - LEAF_NODE_LEFT_SPLIT_COUNT)
            } else {
                (old_page, i)
            };
            let (cell_key, cell_value): (u32, &[u8]) = match i.cmp(&(cursor.cell_no as usize)) {
                std::cmp::Ordering::Equal => (key, &row_bytes),
                std::cmp::Ordering::Greater => {
                    let (k, v) = &old_cells[i - 1];
                    (*k, v.as_slice())
                }
                std::cmp::Ordering::Less => {
                    let (k, v) = &old_cells[i];
                    (*k, v.as_slice())
                }
            };
            self.with_node(dest_page, |n| n.set_leaf_cell(dest_idx as u32, cell_key, cell_value))?;
        }

        self.with_node(old_page, |n| n.set_leaf_num_cells(LEAF_NODE_LEFT_SPLIT_COUNT as u32))?;
        self.with_node(new_page, |n| n.set_leaf_num_cells(LEAF_NODE_RIGHT_SPLIT_COUNT as u32))?;

        if old_is_root {
            self.create_new_root(new_page)
        } else {
            let new_max = self.with_node(old_page, |n| n.own_max_key())?;
            self.with_node(old_parent, |n| n.update_internal_key(old_max_before, new_max))?;
            self.internal_insert(old_parent, new_page)
        }
    }

    /// Replaces the current root with a fresh internal node whose two children are a
    /// copy of the old root (now demoted) and `right_child_page`.
    fn create_new_root(&mut self, right_child_page: u32) -> Result<(), Error> {
        let root = self.root_page_num();
        let left_page = self.pager.new_page_no();

        let root_bytes: [u8; PAGE_SIZE] = *self.pager.get(root)?;
        let left_buf = self.pager.get(left_page)?;
        *left_buf = root_bytes;

        let left_type = self.with_node(left_page, |n| {
            n.set_is_root(false);
            n.node_type()
        })?;
        if left_type == NodeType::Internal {
            let num_keys = self.with_node(left_page, |n| n.internal_num_keys())?;
            for i in 0..=num_keys {
                let child = self.with_node(left_page, |n| n.internal_child(i))?;
                self.with_node(child, |n| n.set_parent(left_page))?;
            }
        }

        let left_max = self.max_key(left_page)?;

        self.with_node(root, |n| n.initialize_internal())?;
        self.with_node(root, |n| {
            n.set_is_root(true);
            n.set_internal_num_keys(1)?;
            n.set_internal_child(0, left_page)?;
            n.set_internal_key(0, left_max)?;
            n.set_internal_right_child(right_child_page)
        })?;

        self.with_node(left_page, |n| n.set_parent(root))?;
        self.with_node(right_child_page, |n| n.set_parent(root))?;
        Ok(())
    }

    /// Threads `child_page` into `parent_page`, splitting the parent first if it's full.
    fn internal_insert(&mut self, parent_page: u32, child_page: u32) -> Result<(), Error> {
        let child_max = self.max_key(child_page)?;
        let num_keys = self.with_node(parent_page, |n| n.internal_num_keys())?;

        if num_keys as usize >= INTERNAL_NODE_MAX_KEYS {
            return self.internal_split_and_insert(parent_page, child_page);
        }

        let right_child = self.with_node(parent_page, |n| n.internal_right_child())?;
        if right_child == INVALID_PAGE_NUM {
            self.with_node(parent_page, |n| n.set_internal_right_child(child_page))?;
            self.with_node(child_page, |n| n.set_parent(parent_page))?;
            return Ok(());
        }

        let right_child_max = self.max_key(right_child)?;
        if child_max > right_child_max {
            self.with_node(parent_page, |n| {
                n.set_internal_num_keys(num_keys + 1)?;
                n.set_internal_child(num_keys, right_child)?;
                n.set_internal_key(num_keys, right_child_max)?;
                n.set_internal_right_child(child_page)
            })?;
        } else {
            let slot = self.with_node(parent_page, |n| n.internal_find_child(child_max))?;
            self.with_node(parent_page, |n| {
                n.set_internal_num_keys(num_keys + 1)?;
                let mut j = num_keys;
                while j > slot {
                    let prev_child = n.internal_child(j - 1)?;
                    let prev_key = n.internal_key(j - 1)?;
                    n.set_internal_child(j, prev_child)?;
                    n.set_internal_key(j, prev_key)?;
                    j -= 1;
                }
                n.set_internal_child(slot, child_page)?;
                n.set_internal_key(slot, child_max)
            })?;
        }
        self.with_node(child_page, |n| n.set_parent(parent_page))?;
        Ok(())
    }

    /// Splits a full internal node: moves its upper half (including its right child) to
    /// a new sibling, inserts the triggering child on whichever side it belongs, and
    /// propagates the new split point up to the grandparent.
    fn internal_split_and_insert(&mut self, parent_page: u32, incoming_child: u32) -> Result<(), Error> {
        let old_max = self.max_key(parent_page)?;
        let parent_was_root = self.with_node(parent_page, |n| Ok(n.is_root()))?;

        let new_node = self.pager.new_page_no();
        self.with_node(new_node, |n| n.initialize_internal())?;

        let (old_parent_page, grandparent) = if parent_was_root {
            self.create_new_root(new_node)?;
            let root = self.root_page_num();
            let left = self.with_node(root, |n| n.internal_child(0))?;
            (left, root)
        } else {
            let gp = self.with_node(parent_page, |n| n.parent())?;
            (parent_page, gp)
        };

        let right_child_page = self.with_node(old_parent_page, |n| n.internal_right_child())?;
        self.internal_insert(new_node, right_child_page)?;

        let mut num_keys = self.with_node(old_parent_page, |n| n.internal_num_keys())?;
        let move_from = INTERNAL_NODE_MAX_KEYS as u32 / 2 + 1;
        let mut i = INTERNAL_NODE_MAX_KEYS as u32;
        while i > move_from {
            i -= 1;
            let child_page = self.with_node(old_parent_page, |n| n.internal_child(i))?;
            self.internal_insert(new_node, child_page)?;
            num_keys -= 1;
            self.with_node(old_parent_page, |n| n.set_internal_num_keys(num_keys))?;
        }

        let promoted = self.with_node(old_parent_page, |n| n.internal_child(num_keys - 1))?;
        self.with_node(old_parent_page, |n| n.set_internal_right_child(promoted))?;
        num_keys -= 1;
        self.with_node(old_parent_page, |n| n.set_internal_num_keys(num_keys))?;

        let incoming_max = self.max_key(incoming_child)?;
        let parent_max = self.max_key(old_parent_page)?;
        let destination = if incoming_max < parent_max { old_parent_page } else { new_node };
        self.internal_insert(destination, incoming_child)?;

        let new_parent_max = self.max_key(old_parent_page)?;
        self.with_node(grandparent, |n| n.update_internal_key(old_max, new_parent_max))?;
        if !parent_was_root {
            // `internal_insert` above already reparents `new_node` when it threads it in.
            self.internal_insert(grandparent, new_node)?;
        }
        Ok(())
    }

    // --- diagnostics ---

    /// Dumps the size constants the node codec derives from `PAGE_SIZE`/`ROW_SIZE`, in
    /// the order the REPL's `.constants` command prints them.
    pub fn constants_string() -> String {
        use super::btree::{COMMON_NODE_HEADER_SIZE, LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE};
        format!(
            "ROW_SIZE: {}\nCOMMON_NODE_HEADER_SIZE: {}\nLEAF_NODE_HEADER_SIZE: {}\nLEAF_NODE_CELL_SIZE: {}\nLEAF_NODE_MAX_CELLS: {}\n",
            ROW_SIZE, COMMON_NODE_HEADER_SIZE, LEAF_NODE_HEADER_SIZE, LEAF_NODE_CELL_SIZE, LEAF_NODE_MAX_CELLS,
        )
    }

    /// Depth-first, pre-order dump of the tree's page structure, for the REPL's `.btree`
    /// command.
    pub fn btree_string(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        self.print_node(self.root_page_num(), 0, &mut out)?;
        Ok(out)
    }

    fn print_node(&mut self, page_no: u32, depth: usize, out: &mut String) -> Result<(), Error> {
        let indent = "  ".repeat(depth);
        match self.with_node(page_no, |n| n.node_type())? {
            NodeType::Leaf => {
                let num_cells = self.with_node(page_no, |n| n.leaf_num_cells())?;
                out.push_str(&format!("{}- leaf (size {})\n", indent, num_cells));
                let key_indent = format!("{}  ", indent);
                for i in 0..num_cells {
                    let key = self.with_node(page_no, |n| n.leaf_key(i))?;
                    out.push_str(&format!("{}- {}\n", key_indent, key));
                }
            }
            NodeType::Internal => {
                let num_keys = self.with_node(page_no, |n| n.internal_num_keys())?;
                out.push_str(&format!("{}- internal (size {})\n", indent, num_keys));
                for i in 0..=num_keys {
                    let child = self.with_node(page_no, |n| n.internal_child(i))?;
                    self.print_node(child, depth + 1, out)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn row(id: u32) -> Row {
        Row::new(id, format!("user{id}"), format!("user{id}@x.com")).unwrap()
    }

    #[test]
    fn insert_and_scan_returns_ascending_order() {
        let tmp = NamedTempFile::new().unwrap();
        let mut tree = Tree::open(tmp.path()).unwrap();
        for id in [5, 1, 3, 2, 4] {
            assert_eq!(tree.insert(id, &row(id)).unwrap(), InsertOutcome::Inserted);
        }
        let mut cursor = tree.scan_start().unwrap();
        let mut seen = Vec::new();
        while !cursor.end_of_table {
            seen.push(tree.read_row(&cursor).unwrap().id);
            tree.advance(&mut cursor).unwrap();
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let tmp = NamedTempFile::new().unwrap();
        let mut tree = Tree::open(tmp.path()).unwrap();
        assert_eq!(tree.insert(1, &row(1)).unwrap(), InsertOutcome::Inserted);
        assert_eq!(tree.insert(1, &row(1)).unwrap(), InsertOutcome::DuplicateKey);
    }

    #[test]
    fn insert_enough_rows_to_force_leaf_split() {
        let tmp = NamedTempFile::new().unwrap();
        let mut tree = Tree::open(tmp.path()).unwrap();
        for id in 0..(LEAF_NODE_MAX_CELLS as u32 + 1) {
            assert_eq!(tree.insert(id, &row(id)).unwrap(), InsertOutcome::Inserted);
        }
        let mut cursor = tree.scan_start().unwrap();
        let mut count = 0;
        while !cursor.end_of_table {
            count += 1;
            tree.advance(&mut cursor).unwrap();
        }
        assert_eq!(count, LEAF_NODE_MAX_CELLS + 1);
    }

    #[test]
    fn insert_enough_rows_to_force_internal_split() {
        let tmp = NamedTempFile::new().unwrap();
        let mut tree = Tree::open(tmp.path()).unwrap();
        let rows = (LEAF_NODE_MAX_CELLS as u32 + 1) * (INTERNAL_NODE_MAX_KEYS as u32 + 2);
        for id in 0..rows {
            assert_eq!(tree.insert(id, &row(id)).unwrap(), InsertOutcome::Inserted);
        }
        let mut cursor = tree.scan_start().unwrap();
        let mut seen = Vec::new();
        while !cursor.end_of_table {
            seen.push(tree.read_row(&cursor).unwrap().id);
            tree.advance(&mut cursor).unwrap();
        }
        let expected: Vec<u32> = (0..rows).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn persists_across_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        {
            let mut tree = Tree::open(&path).unwrap();
            for id in 0..30u32 {
                tree.insert(id, &row(id)).unwrap();
            }
            tree.close().unwrap();
        }
        {
            let mut tree = Tree::open(&path).unwrap();
            let mut cursor = tree.scan_start().unwrap();
            let mut count = 0;
            while !cursor.end_of_table {
                count += 1;
                tree.advance(&mut cursor).unwrap();
            }
            assert_eq!(count, 30);
        }
    }
}
