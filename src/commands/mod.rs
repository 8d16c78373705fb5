//! CLI command implementations
//!
//! Every command works on one resolved [`Inventory`](pcipaths_core::Inventory):
//! the snapshot is read once, resolved once, then rendered.

pub mod export;
mod list;

pub use list::{list_columns, run_list};
