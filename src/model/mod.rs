//! Types that represent the core data model: the transaction `Table` and its cells.
mod amount;
mod column;
mod table;

pub use amount::{Amount, AmountError};
pub use column::TransactionColumn;
pub use table::{Cell, RowId, Table};
