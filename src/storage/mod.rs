pub mod btree;
pub mod cursor;
pub mod row;
pub mod tree;

pub use cursor::Cursor;
pub use row::Row;
pub use tree::{InsertOutcome, Tree};
