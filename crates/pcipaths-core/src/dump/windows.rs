//! Windows device property table
//!
//! The table has one property per line:
//!
//! ```text
//! InstanceId KeyName Data
//! PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08 DEVPKEY_Device_Parent ACPI\PNP0A08\0
//! PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08 DEVPKEY_Device_LocationPaths {PCIROOT(0)#PCI(0100), ACPI(_SB_)#ACPI(PCI0)#ACPI(PEG0)}
//! PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08 DEVPKEY_PciDevice_BaseClass 6
//! ```
//!
//! Only `PCI\...` instances and the PCI host bridges `ACPI\PNP0A03\<uid>` /
//! `ACPI\PNP0A08\<uid>` are kept. Host bridges become root buses; their
//! trailing instance segment is the root UID.

use std::collections::BTreeMap;

use crate::codec::{pack_class_code, parse_hex};
use crate::record::{RawDeviceRecord, Snapshot};

/// Header line printed before the table
pub const HEADER: &str = "InstanceId KeyName Data";

const ROOT_BRIDGE_PREFIXES: [&str; 2] = ["ACPI\\PNP0A03\\", "ACPI\\PNP0A08\\"];

/// One table row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLine<'a> {
    /// Device instance id
    pub instance: &'a str,
    /// `DEVPKEY_*` property name
    pub key: &'a str,
    /// Property value, rest of the line
    pub data: &'a str,
}

/// Split one table row, rejecting instances that are not PCI related
pub fn parse_line(line: &str) -> Option<TableLine<'_>> {
    let mut parts = line.trim().splitn(3, ' ');
    let instance = parts.next()?;
    let key = parts.next()?;
    let data = parts.next()?.trim();
    if !key.starts_with("DEVPKEY_") || data.is_empty() || !is_pci_instance(instance) {
        return None;
    }
    Some(TableLine {
        instance,
        key,
        data,
    })
}

/// Check for a `PCI\...` instance or a PCI host bridge
pub fn is_pci_instance(instance: &str) -> bool {
    let upper = instance.trim_start_matches('{').to_ascii_uppercase();
    upper.starts_with("PCI\\") || root_uid(&upper).is_some()
}

/// Root UID of a host bridge instance id (`ACPI\PNP0A08\1` -> 1)
pub fn root_uid(instance: &str) -> Option<u32> {
    let upper = instance.to_ascii_uppercase();
    let uid = ROOT_BRIDGE_PREFIXES
        .iter()
        .find_map(|prefix| upper.strip_prefix(prefix))?;
    parse_hex(uid)
}

/// Parse a whole table into a snapshot
pub fn parse(text: &str) -> Snapshot {
    let mut snapshot = Snapshot::default();
    let mut order: Vec<String> = Vec::new();
    let mut entries: BTreeMap<String, Entry> = BTreeMap::new();

    for line in text.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with(HEADER) {
            continue;
        }
        let Some(row) = parse_line(line) else {
            log::trace!("skipping table line '{}'", line);
            continue;
        };

        if let Some(uid) = root_uid(row.instance) {
            snapshot.roots.insert(row.instance.to_string(), uid);
            continue;
        }

        let entry = entries.entry(row.instance.to_string()).or_insert_with(|| {
            order.push(row.instance.to_string());
            Entry::new(row.instance)
        });
        entry.apply(row.key, row.data);
    }

    for key in order {
        let Some(entry) = entries.remove(&key) else {
            continue;
        };
        let record = entry.finish();
        // Host bridges are often only seen as a parent reference.
        if let Some(parent) = &record.parent_key {
            if let Some(uid) = root_uid(parent) {
                snapshot.roots.entry(parent.clone()).or_insert(uid);
            }
        }
        snapshot.records.push(record);
    }

    snapshot
}

/// Properties collected for one instance
struct Entry {
    record: RawDeviceRecord,
    base_class: Option<u8>,
    sub_class: Option<u8>,
    prog_if: Option<u8>,
}

impl Entry {
    fn new(instance: &str) -> Self {
        let mut record = RawDeviceRecord::new(instance);
        apply_instance_ids(&mut record, instance);
        Self {
            record,
            base_class: None,
            sub_class: None,
            prog_if: None,
        }
    }

    fn apply(&mut self, key: &str, data: &str) {
        match key {
            "DEVPKEY_Device_Parent" => self.record.parent_key = Some(data.to_string()),
            "DEVPKEY_NAME" => self.record.friendly_name = Some(data.to_string()),
            "DEVPKEY_Device_LocationInfo" => self.record.location_debug = Some(data.to_string()),
            "DEVPKEY_Device_LocationPaths" => {
                self.record.raw_location_paths = split_multi_string(data);
                self.record.name = last_acpi_name(&self.record.raw_location_paths);
            }
            "DEVPKEY_PciDevice_BaseClass" => self.base_class = data.parse().ok(),
            "DEVPKEY_PciDevice_SubClass" => self.sub_class = data.parse().ok(),
            "DEVPKEY_PciDevice_ProgIf" => self.prog_if = data.parse().ok(),
            _ => log::trace!("{}: ignoring {}", self.record.instance_key, key),
        }
    }

    fn finish(mut self) -> RawDeviceRecord {
        self.record.class_code = pack_class_code(self.base_class, self.sub_class, self.prog_if);
        self.record
    }
}

/// Fill vendor, device and subsystem ids from `PCI\VEN_vvvv&DEV_dddd&SUBSYS_ssssvvvv`
fn apply_instance_ids(record: &mut RawDeviceRecord, instance: &str) {
    let upper = instance.trim_start_matches('{').to_ascii_uppercase();
    let Some(hardware_id) = upper.strip_prefix("PCI\\").and_then(|s| s.split('\\').next()) else {
        return;
    };
    for field in hardware_id.split('&') {
        if let Some(ven) = field.strip_prefix("VEN_") {
            record.vendor_id = u16::from_str_radix(ven, 16).ok();
        } else if let Some(dev) = field.strip_prefix("DEV_") {
            record.device_id = u16::from_str_radix(dev, 16).ok();
        } else if let Some(subsys) = field.strip_prefix("SUBSYS_") {
            if let Ok(value) = u32::from_str_radix(subsys, 16) {
                record.subsystem_id = Some((value >> 16) as u16);
                record.subsystem_vendor_id = Some((value & 0xFFFF) as u16);
            }
        }
    }
}

/// Split a `{a, b}` multi-string value; a bare value is a single entry
fn split_multi_string(data: &str) -> Vec<String> {
    let data = data.trim();
    let inner = data
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(data);
    inner
        .split(", ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Name of the device's own ACPI object, if it has one
fn last_acpi_name(paths: &[String]) -> Option<String> {
    let acpi = paths
        .iter()
        .find(|p| p.get(..5).is_some_and(|h| h.eq_ignore_ascii_case("ACPI(")))?;
    let last = acpi.rsplit('#').next()?;
    if !last.get(..5)?.eq_ignore_ascii_case("ACPI(") {
        return None;
    }
    let inner = last.get(5..)?.strip_suffix(')')?;
    let name = inner.trim_end_matches('_');
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r"InstanceId KeyName Data
ACPI\PNP0A08\0 DEVPKEY_NAME PCI Express Root Complex
PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08 DEVPKEY_Device_Parent ACPI\PNP0A08\0
PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08 DEVPKEY_NAME PCI Express Root Port
PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08 DEVPKEY_Device_LocationPaths {PCIROOT(0)#PCI(0100), ACPI(_SB_)#ACPI(PCI0)#ACPI(PEG0)}
PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08 DEVPKEY_PciDevice_BaseClass 6
PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08 DEVPKEY_PciDevice_SubClass 4
PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08 DEVPKEY_PciDevice_ProgIf 0
PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08 DEVPKEY_Device_LocationInfo PCI bus 0, device 1, function 0
PCI\VEN_10DE&DEV_1B80&SUBSYS_119E10DE&REV_A1\4&1BD7BFCF&0&0008 DEVPKEY_Device_Parent PCI\VEN_8086&DEV_1901&SUBSYS_86941043&REV_07\3&11583659&0&08
PCI\VEN_10DE&DEV_1B80&SUBSYS_119E10DE&REV_A1\4&1BD7BFCF&0&0008 DEVPKEY_NAME NVIDIA GeForce GTX 1080
PCI\VEN_10DE&DEV_1B80&SUBSYS_119E10DE&REV_A1\4&1BD7BFCF&0&0008 DEVPKEY_Device_LocationPaths {PCIROOT(0)#PCI(0100)#PCI(0000), ACPI(_SB_)#ACPI(PCI0)#ACPI(PEG0)#ACPI(PEGP)}
USB\VID_046D&PID_C52B\5&2A4B8F3&0&2 DEVPKEY_NAME USB Receiver
";

    #[test]
    fn test_parse_records() {
        let snap = parse(DUMP);
        assert_eq!(snap.records.len(), 2);
        assert_eq!(snap.roots.get("ACPI\\PNP0A08\\0"), Some(&0));

        let port = &snap.records[0];
        assert_eq!(port.ids(), Some((0x8086, 0x1901)));
        assert_eq!(port.subsystem_id, Some(0x8694));
        assert_eq!(port.subsystem_vendor_id, Some(0x1043));
        assert_eq!(port.class_code, Some(0x060400));
        assert_eq!(port.parent_key.as_deref(), Some("ACPI\\PNP0A08\\0"));
        assert_eq!(port.raw_device_path(), Some("PCIROOT(0)#PCI(0100)"));
        assert_eq!(port.name.as_deref(), Some("PEG0"));
        assert_eq!(
            port.location_debug.as_deref(),
            Some("PCI bus 0, device 1, function 0")
        );

        let gpu = &snap.records[1];
        assert_eq!(gpu.ids(), Some((0x10de, 0x1b80)));
        assert_eq!(gpu.friendly_name.as_deref(), Some("NVIDIA GeForce GTX 1080"));
        assert_eq!(gpu.class_code, None);
    }

    #[test]
    fn test_root_uid() {
        assert_eq!(root_uid("ACPI\\PNP0A08\\0"), Some(0));
        assert_eq!(root_uid("acpi\\pnp0a03\\1"), Some(1));
        assert_eq!(root_uid("ACPI\\PNP0C0A\\1"), None);
    }

    #[test]
    fn test_parent_only_root_registered() {
        let snap = parse(
            "PCI\\VEN_8086&DEV_A0E8\\3&0&A8 DEVPKEY_Device_Parent ACPI\\PNP0A08\\2\n",
        );
        assert_eq!(snap.roots.get("ACPI\\PNP0A08\\2"), Some(&2));
    }

    #[test]
    fn test_last_acpi_name() {
        let named = vec!["ACPI(_SB_)#ACPI(PCI0)#ACPI(XHC_)".to_string()];
        assert_eq!(last_acpi_name(&named).as_deref(), Some("XHC"));
        let unnamed = vec!["ACPI(_SB_)#ACPI(PCI0)#PCI(0000)".to_string()];
        assert_eq!(last_acpi_name(&unnamed), None);
    }

    #[test]
    fn test_single_location_path() {
        assert_eq!(split_multi_string("PCIROOT(0)#PCI(1F03)"), vec!["PCIROOT(0)#PCI(1F03)"]);
        assert_eq!(split_multi_string("{A, B}"), vec!["A", "B"]);
    }

    #[test]
    fn test_resolves_end_to_end() {
        let inv = crate::resolve(&parse(DUMP));
        let gpu = inv
            .get("PCI\\VEN_10DE&DEV_1B80&SUBSYS_119E10DE&REV_A1\\4&1BD7BFCF&0&0008")
            .unwrap();
        assert_eq!(
            gpu.device_path.as_deref(),
            Some("PciRoot(0x0)/Pci(0x1,0x0)/Pci(0x0,0x0)")
        );
        assert_eq!(gpu.acpi_path.as_deref(), Some("/PCI0.PEG0.PEGP"));
        assert_eq!(gpu.pcidebug, "??:??.?");
        assert!(!gpu.bridged);
    }
}
