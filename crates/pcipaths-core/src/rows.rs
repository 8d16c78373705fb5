//! Flat rows for presentation
//!
//! Renderers never look at [`ResolvedDevice`] directly; they get one [`Row`]
//! of strings per device, in a stable order.

use crate::filter::{Column, DisplayConfig};
use crate::record::{Inventory, ResolvedDevice};

/// One device projected onto a set of columns
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Row {
    /// Cell values, in column order
    pub cells: Vec<String>,
}

impl Row {
    /// Project `dev` onto `columns`
    pub fn project(dev: &ResolvedDevice, columns: &[Column]) -> Self {
        Self {
            cells: columns.iter().map(|c| c.value(dev)).collect(),
        }
    }
}

/// Project every matching device, sorted by cell values
pub fn project_rows(inventory: &Inventory, config: &DisplayConfig) -> Vec<Row> {
    let columns = config.columns();
    let mut rows: Vec<Row> = inventory
        .devices()
        .filter(|dev| config.matches(dev))
        .map(|dev| Row::project(dev, columns))
        .collect();
    rows.sort();
    rows
}
