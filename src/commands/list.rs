//! List command implementation

use pcipaths_core::rows::project_rows;
use pcipaths_core::{Column, DisplayConfig, Inventory, Row};

/// Print the device table, returning the number of rows shown
pub fn run_list(inventory: &Inventory, config: &DisplayConfig) -> usize {
    let rows = project_rows(inventory, config);
    if rows.is_empty() {
        return 0;
    }

    let lines = if config.is_default_layout() {
        classic_table(&rows)
    } else {
        column_table(config.columns(), &rows)
    };
    for line in lines {
        println!("{}", line);
    }
    rows.len()
}

/// List all column names
pub fn list_columns() {
    println!("Available columns:");
    println!();
    for column in Column::ALL {
        println!("  {:<22} {}", column.name(), column.header());
    }
}

/// `PCIDBG VEN/DEV Built-In Bridged ACPI+DevicePaths` layout
fn classic_table(rows: &[Row]) -> Vec<String> {
    let header = format!(
        "{:<7} {:<9} {:<8} {:<7} ACPI+DevicePaths",
        "PCIDBG", "VEN/DEV", "Built-In", "Bridged"
    );
    let mut lines = vec![header.clone(), "-".repeat(header.len())];
    for row in rows {
        if let [pcidebug, ven_dev, built_in, bridged, acpi, device_path] = row.cells.as_slice() {
            lines.push(format!(
                "{:<7} {:<9} {:<8} {:<7} {} = {}",
                pcidebug, ven_dev, built_in, bridged, acpi, device_path
            ));
        }
    }
    lines
}

/// Left-aligned columns padded to the widest cell
fn column_table(columns: &[Column], rows: &[Row]) -> Vec<String> {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.header().len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(&row.cells) {
            *width = (*width).max(cell.len());
        }
    }

    let render = |cells: Vec<&str>| {
        let last = cells.len().saturating_sub(1);
        cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                if idx == last {
                    cell.to_string()
                } else {
                    format!("{:<width$}", cell, width = widths[idx])
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    };

    let header = render(columns.iter().map(|c| c.header()).collect());
    let mut lines = vec![header.clone(), "-".repeat(header.len())];
    for row in rows {
        lines.push(render(row.cells.iter().map(String::as_str).collect()));
    }
    lines
}
