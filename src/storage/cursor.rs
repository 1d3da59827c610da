//! A locator into the tree, produced by `Tree::find`/`Tree::scan_start` and advanced by
//! `Tree::advance`.
//!
//! Unlike the table's old cursor, this one doesn't borrow the tree for its lifetime — it's
//! a plain `Copy` value addressed by page/cell number, so the tree's own methods can reborrow
//! the pager page-by-page between cursor operations instead of holding one page pinned across
//! a whole scan.

#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pub page_no: u32,
    pub cell_no: u32,
    pub end_of_table: bool,
}
