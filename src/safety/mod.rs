//! Read-only guard for generated analysis SQL.
//!
//! Every statement is parsed in the dialect of the target warehouse before it
//! is submitted. Only a single read-only query passes; anything else is
//! rejected as a query error without reaching the warehouse.

mod parser;

pub use parser::{ensure_read_only, ReadOnlyGuard};
