//! Device records
//!
//! [`RawDeviceRecord`] is what a dump adapter harvests for one PCI function.
//! [`ResolvedDevice`] is the same function after resolution, and
//! [`Inventory`] is the resolver's output keyed by instance key.

use std::collections::BTreeMap;

use crate::codec::{location_to_bdf, UNKNOWN_BDF};
use crate::error::{PciPathError, Result};
use crate::{dump, UNKNOWN_ACPI_PATH, UNKNOWN_DEVICE_PATH};

/// One PCI function as reported by the OS
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDeviceRecord {
    /// Opaque key, unique within one snapshot
    pub instance_key: String,
    /// PCI vendor id
    pub vendor_id: Option<u16>,
    /// PCI device id
    pub device_id: Option<u16>,
    /// Subsystem vendor id
    pub subsystem_vendor_id: Option<u16>,
    /// Subsystem id
    pub subsystem_id: Option<u16>,
    /// Packed `(base << 16) | (sub << 8) | prog_if`
    pub class_code: Option<u32>,
    /// Raw `bus N, device N, function N` style location
    pub location_debug: Option<String>,
    /// Raw firmware location strings (`PciRoot(...)` and `ACPI(...)`)
    pub raw_location_paths: Vec<String>,
    /// Instance key of the parent device or root bus
    pub parent_key: Option<String>,
    /// Human readable label
    pub friendly_name: Option<String>,
    /// Node name without unit address, used for name lookups
    pub name: Option<String>,
    /// The platform flagged this device as built in
    pub built_in_hint: bool,
}

impl RawDeviceRecord {
    /// Create an empty record for `instance_key`
    pub fn new(instance_key: impl Into<String>) -> Self {
        Self {
            instance_key: instance_key.into(),
            ..Default::default()
        }
    }

    /// Vendor and device id, if both are known
    pub fn ids(&self) -> Option<(u16, u16)> {
        Some((self.vendor_id?, self.device_id?))
    }

    /// First raw location starting with `PciRoot(`
    pub fn raw_device_path(&self) -> Option<&str> {
        self.find_location("PciRoot(")
    }

    /// First raw location starting with `ACPI(`
    pub fn raw_acpi_path(&self) -> Option<&str> {
        self.find_location("ACPI(")
    }

    fn find_location(&self, prefix: &str) -> Option<&str> {
        self.raw_location_paths
            .iter()
            .map(|p| p.trim())
            .find(|p| {
                p.get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            })
    }
}

/// One device-source snapshot
///
/// `roots` maps the instance keys of root buses (PCI host bridges) to their
/// directly observed root UID. Root buses carry no vendor/device id and are
/// never reported as devices, but parent chains end at them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// PCI functions in source order
    pub records: Vec<RawDeviceRecord>,
    /// Root bus instance key -> root UID
    pub roots: BTreeMap<String, u32>,
}

impl Snapshot {
    /// Parse a dump in either supported format
    pub fn parse(text: &str) -> Result<Self> {
        let snapshot = match dump::detect(text) {
            Some(dump::DumpFormat::Ioreg) => dump::ioreg::parse(text),
            Some(dump::DumpFormat::WindowsTable) => dump::windows::parse(text),
            None => return Err(PciPathError::UnrecognizedDump),
        };
        if snapshot.records.is_empty() {
            return Err(PciPathError::EmptySnapshot);
        }
        log::info!(
            "Parsed {} device records and {} root buses",
            snapshot.records.len(),
            snapshot.roots.len()
        );
        Ok(snapshot)
    }

    /// Load and parse a dump file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PciPathError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}

/// A PCI function after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    /// Instance key from the snapshot
    pub instance_key: String,
    /// PCI vendor id
    pub vendor_id: u16,
    /// PCI device id
    pub device_id: u16,
    /// Subsystem vendor id
    pub subsystem_vendor_id: Option<u16>,
    /// Subsystem id
    pub subsystem_id: Option<u16>,
    /// Packed class code
    pub class_code: Option<u32>,
    /// `bb:dd.f` locator or `??:??.?`
    pub pcidebug: String,
    /// `vvvv:dddd`
    pub ven_dev: String,
    /// Enumerated natively by firmware
    pub built_in: bool,
    /// Reached through an address-only PCI bridge hop
    pub bridged: bool,
    /// Exposed ACPI path (`/PCI0.PEG0.GFX0`)
    pub acpi_path: Option<String>,
    /// Normalized UEFI device path
    pub device_path: Option<String>,
    /// Device path with bytes over 0xFF clamped to 0
    pub overflow_device_path: Option<String>,
    /// Resolved root segment (`PciRoot(0x0)`)
    pub pci_root: String,
    /// `pciVVVV,DDDD@addr` identity if this device is an unnamed bridge
    pub pci_bridge_tag: Option<String>,
    /// Parent instance key
    pub parent_key: Option<String>,
    /// Human readable label
    pub friendly_name: Option<String>,
    /// Node name without unit address
    pub name: Option<String>,
}

impl ResolvedDevice {
    pub(crate) fn from_raw(raw: &RawDeviceRecord, vendor_id: u16, device_id: u16) -> Self {
        let pcidebug = raw
            .location_debug
            .as_deref()
            .map(location_to_bdf)
            .unwrap_or_else(|| UNKNOWN_BDF.to_string());
        Self {
            instance_key: raw.instance_key.clone(),
            vendor_id,
            device_id,
            subsystem_vendor_id: raw.subsystem_vendor_id,
            subsystem_id: raw.subsystem_id,
            class_code: raw.class_code,
            pcidebug,
            ven_dev: crate::codec::format_vendev(vendor_id, device_id),
            built_in: raw.built_in_hint,
            bridged: true,
            acpi_path: None,
            device_path: None,
            overflow_device_path: None,
            pci_root: crate::device_path::root_segment(0),
            pci_bridge_tag: None,
            parent_key: raw.parent_key.clone(),
            friendly_name: raw.friendly_name.clone(),
            name: raw.name.clone(),
        }
    }

    /// ACPI path or the `Unknown ACPI Path` sentinel
    pub fn acpi_path_or_unknown(&self) -> &str {
        self.acpi_path.as_deref().unwrap_or(UNKNOWN_ACPI_PATH)
    }

    /// Device path or the `Unknown Device Path` sentinel
    pub fn device_path_or_unknown(&self) -> &str {
        self.device_path.as_deref().unwrap_or(UNKNOWN_DEVICE_PATH)
    }

    /// Overflow-safe device path or the `Unknown Device Path` sentinel
    pub fn overflow_device_path_or_unknown(&self) -> &str {
        self.overflow_device_path
            .as_deref()
            .unwrap_or(UNKNOWN_DEVICE_PATH)
    }
}

/// Resolver output keyed by instance key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    devices: BTreeMap<String, ResolvedDevice>,
}

impl Inventory {
    pub(crate) fn new(devices: BTreeMap<String, ResolvedDevice>) -> Self {
        Self { devices }
    }

    /// Look up a device by instance key
    pub fn get(&self, instance_key: &str) -> Option<&ResolvedDevice> {
        self.devices.get(instance_key)
    }

    /// All devices in instance key order
    pub fn devices(&self) -> impl Iterator<Item = &ResolvedDevice> {
        self.devices.values()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if no device survived resolution
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
