//! Export command implementation

use std::path::Path;

use pcipaths_core::plist::write_plist;
use pcipaths_core::{DisplayConfig, Inventory, PciPathError};

/// Write matching devices to a plist, returning the number of entries
pub fn run_export(
    inventory: &Inventory,
    config: &DisplayConfig,
    output: &Path,
) -> Result<usize, PciPathError> {
    let count = write_plist(output, inventory, config)?;
    if count > 0 {
        log::info!("Wrote {} entries to {}", count, output.display());
    }
    Ok(count)
}
