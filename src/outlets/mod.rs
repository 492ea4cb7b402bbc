//! Outlet lookup service.
//!
//! Turns outlet questions into SQL with a language model, checks the SQL,
//! and runs it against a read-only SQLite database.

mod guard;
pub(crate) mod store;
mod text2sql;

pub use guard::SqlGuard;
pub use store::{format_rows, Outlet, OutletStore, SqlValue};
pub use text2sql::{OutletAnswer, Text2Sql};
