//! Property list export
//!
//! Writes an XML plist mapping each resolved device path to the properties
//! firmware configuration tools expect:
//!
//! ```xml
//! <key>PciRoot(0x0)/Pci(0x1C,0x4)/Pci(0x0,0x0)</key>
//! <dict>
//!     <key>device_type</key>
//!     <string>Ethernet controller</string>
//!     <key>model</key>
//!     <string>Intel I225-V</string>
//!     <key>slot-name</key>
//!     <string>Internal@0,28,4/0,0</string>
//! </dict>
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use crate::class::class_name;
use crate::device_path::PciPath;
use crate::error::{PciPathError, Result};
use crate::filter::DisplayConfig;
use crate::record::{Inventory, ResolvedDevice};

/// Properties exported for one device path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlistEntry {
    /// `device_type` value
    pub device_type: String,
    /// `model` value
    pub model: String,
    /// `slot-name` value
    pub slot_name: String,
}

impl PlistEntry {
    fn from_device(dev: &ResolvedDevice, path: &PciPath) -> Self {
        let model = dev
            .friendly_name
            .clone()
            .or_else(|| dev.name.clone())
            .unwrap_or_else(|| dev.ven_dev.clone());
        let device_type = dev
            .class_code
            .and_then(class_name)
            .unwrap_or("PCI device")
            .to_string();
        Self {
            device_type,
            model,
            slot_name: slot_name(path),
        }
    }
}

/// `Internal@root,dev,func/dev,func...` with decimal numbers
pub fn slot_name(path: &PciPath) -> String {
    let mut slot = format!("Internal@{}", path.root);
    for (idx, hop) in path.hops.iter().enumerate() {
        let sep = if idx == 0 { ',' } else { '/' };
        slot.push(sep);
        slot.push_str(&format!("{},{}", hop.device, hop.function));
    }
    slot
}

/// Collect export entries keyed by device path
///
/// Devices without a resolvable device path are skipped. When two devices
/// share a path the first one wins.
pub fn export_entries<'a>(
    devices: impl IntoIterator<Item = &'a ResolvedDevice>,
) -> BTreeMap<String, PlistEntry> {
    let mut entries = BTreeMap::new();
    for dev in devices {
        let Some(device_path) = dev.device_path.as_deref() else {
            log::debug!("{}: no device path, not exported", dev.instance_key);
            continue;
        };
        let Some(path) = PciPath::parse(device_path) else {
            continue;
        };
        if entries.contains_key(device_path) {
            log::warn!("{}: duplicate device path {}", dev.instance_key, device_path);
            continue;
        }
        entries.insert(device_path.to_string(), PlistEntry::from_device(dev, &path));
    }
    entries
}

/// Render export entries as an XML plist document
pub fn to_plist_string(entries: &BTreeMap<String, PlistEntry>) -> String {
    let mut output = String::new();
    output.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    output.push_str(
        "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
    );
    output.push_str("<plist version=\"1.0\">\n<dict>\n");
    for (device_path, entry) in entries {
        output.push_str(&format!("\t<key>{}</key>\n\t<dict>\n", escape(device_path)));
        for (key, value) in [
            ("device_type", &entry.device_type),
            ("model", &entry.model),
            ("slot-name", &entry.slot_name),
        ] {
            output.push_str(&format!("\t\t<key>{}</key>\n", key));
            output.push_str(&format!("\t\t<string>{}</string>\n", escape(value)));
        }
        output.push_str("\t</dict>\n");
    }
    output.push_str("</dict>\n</plist>\n");
    output
}

/// Write export entries to a plist file, returning the number written
pub fn write_entries(path: &Path, entries: &BTreeMap<String, PlistEntry>) -> Result<usize> {
    std::fs::write(path, to_plist_string(entries)).map_err(|source| PciPathError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(entries.len())
}

/// Export the devices matching `config` to a plist file
///
/// Nothing is written when no device matches; the returned count is 0.
pub fn write_plist(
    path: impl AsRef<Path>,
    inventory: &Inventory,
    config: &DisplayConfig,
) -> Result<usize> {
    let entries = export_entries(inventory.devices().filter(|dev| config.matches(dev)));
    if entries.is_empty() {
        return Ok(0);
    }
    write_entries(path.as_ref(), &entries)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
