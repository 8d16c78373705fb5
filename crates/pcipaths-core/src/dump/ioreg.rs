//! ioreg service tree parsing
//!
//! `ioreg -lw0 -p IODeviceTree` prints one `+-o NAME@ADDR  <class ...>` line
//! per registry entry, indented two columns per level, followed by the
//! entry's properties between braces:
//!
//! ```text
//!     +-o PCI0@0  <class IOACPIPlatformDevice, id 0x100000120, registered>
//!     | | {
//!     | |   "compatible" = <"PNP0A08","PNP0A03">
//!     | | }
//!     | +-o GFX0@2  <class IOPCIDevice, id 0x100000130, registered>
//!     |     {
//!     |       "vendor-id" = <86800000>
//!     |     }
//! ```
//!
//! The tree is parsed into an arena of [`IoregNode`]s. Each PCI function then
//! gets raw location strings synthesized from its ancestry, in the same
//! spelling the Windows adapter reads, so the resolver handles both sources
//! identically.

use std::collections::BTreeMap;

use crate::acpi::is_acpi_name;
use crate::codec::{decode_vendev, le_word, pack_class_code, parse_hex};
use crate::record::{RawDeviceRecord, Snapshot};

/// One registry entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoregNode {
    /// Entry name without unit address
    pub name: String,
    /// Unit address after `@`, if any
    pub unit_address: Option<String>,
    /// IOKit class
    pub class: String,
    /// Registry entry id (`0x100000130`)
    pub id: Option<String>,
    /// Nesting level, 0 for the root entry
    pub depth: usize,
    /// Arena index of the parent entry
    pub parent: Option<usize>,
    /// Raw property values keyed by property name
    pub properties: BTreeMap<String, String>,
}

impl IoregNode {
    fn key(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("node{}", index))
    }

    fn is_pci_function(&self) -> bool {
        self.class == "IOPCIDevice" || self.properties.contains_key("vendor-id")
    }

    fn is_host_bridge(&self) -> bool {
        self.properties
            .get("compatible")
            .map(|v| string_list(v))
            .unwrap_or_default()
            .iter()
            .any(|c| c.eq_ignore_ascii_case("PNP0A03") || c.eq_ignore_ascii_case("PNP0A08"))
    }

    fn is_platform(&self) -> bool {
        self.class == "IOPlatformExpertDevice"
    }

    fn data(&self, key: &str) -> Option<Vec<u8>> {
        self.properties.get(key).and_then(|v| data_bytes(v))
    }

    fn string(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(|v| string_value(v))
    }

    /// `Pci(d,f)` operand from a `d,f` or `d` unit address
    fn pci_address(&self) -> Option<String> {
        let addr = self.unit_address.as_deref()?;
        let (device, function) = addr.split_once(',').unwrap_or((addr, "0"));
        parse_hex(device)?;
        parse_hex(function)?;
        Some(format!("{},{}", device, function))
    }
}

/// Root bus: a PNP0A03/PNP0A08 host bridge, or a `PC*` entry directly
/// below the platform node when firmware omitted `compatible`
fn is_root_bus(nodes: &[IoregNode], index: usize) -> bool {
    let node = &nodes[index];
    if node.is_host_bridge() {
        return true;
    }
    node.name.starts_with("PC")
        && node.parent.is_some_and(|p| nodes[p].is_platform())
}

/// Match a `+-o` entry line, returning its depth and the text after `+-o `
pub fn node_line(line: &str) -> Option<(usize, &str)> {
    let pos = line.find("+-o ")?;
    if !line[..pos].chars().all(|c| c == ' ' || c == '|') {
        return None;
    }
    Some((pos / 2, &line[pos + 4..]))
}

/// Match a `"key" = value` property line
fn property_line(line: &str) -> Option<(&str, &str)> {
    let body = line.trim_start_matches([' ', '|']).strip_prefix('"')?;
    let (key, rest) = body.split_once('"')?;
    let value = rest.trim_start().strip_prefix('=')?.trim();
    Some((key, value))
}

/// Parse the header text of an entry line
fn parse_header(text: &str) -> IoregNode {
    let (name_part, meta) = match text.split_once("  <") {
        Some((name, meta)) => (name.trim(), meta.trim_end().trim_end_matches('>')),
        None => (text.trim(), ""),
    };
    let (name, unit_address) = match name_part.split_once('@') {
        Some((name, addr)) => (name.to_string(), Some(addr.to_string())),
        None => (name_part.to_string(), None),
    };

    let mut node = IoregNode {
        name,
        unit_address,
        ..Default::default()
    };
    for field in meta.split(',').map(str::trim) {
        if let Some(class) = field.strip_prefix("class ") {
            node.class = class.to_string();
        } else if let Some(id) = field.strip_prefix("id ") {
            node.id = Some(id.to_string());
        }
    }
    node
}

/// Parse the service tree into an arena; parents always precede children
pub fn parse_tree(text: &str) -> Vec<IoregNode> {
    let mut nodes: Vec<IoregNode> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    for line in text.lines() {
        if let Some((depth, header)) = node_line(line) {
            let mut node = parse_header(header);
            stack.truncate(depth);
            node.depth = depth;
            node.parent = stack.last().copied();
            stack.push(nodes.len());
            nodes.push(node);
        } else if let Some((key, value)) = property_line(line) {
            if let Some(node) = nodes.last_mut() {
                node.properties.insert(key.to_string(), value.to_string());
            }
        }
    }

    nodes
}

/// Parse a whole ioreg dump into a snapshot
pub fn parse(text: &str) -> Snapshot {
    let nodes = parse_tree(text);
    let mut snapshot = Snapshot::default();

    for (index, node) in nodes.iter().enumerate() {
        if !node.is_pci_function() {
            continue;
        }
        let (record, root) = build_record(&nodes, index);
        if let Some((key, uid)) = root {
            snapshot.roots.insert(key, uid);
        }
        snapshot.records.push(record);
    }

    snapshot
}

/// Build the record for the PCI function at `index`, plus its root bus
fn build_record(nodes: &[IoregNode], index: usize) -> (RawDeviceRecord, Option<(String, u32)>) {
    let node = &nodes[index];
    let mut record = RawDeviceRecord::new(node.key(index));

    let raw_vendor = node.data("vendor-id").unwrap_or_default();
    let raw_device = node.data("device-id").unwrap_or_default();
    record.vendor_id = le_word(&raw_vendor);
    record.device_id = le_word(&raw_device);
    if record.ids().is_none() {
        log::debug!(
            "{}@{}: ids {}",
            node.name,
            node.unit_address.as_deref().unwrap_or("?"),
            decode_vendev(&raw_vendor, &raw_device)
        );
    }
    record.subsystem_vendor_id = node.data("subsystem-vendor-id").as_deref().and_then(le_word);
    record.subsystem_id = node.data("subsystem-id").as_deref().and_then(le_word);
    record.class_code = node.data("class-code").and_then(|b| match b.as_slice() {
        [prog_if, sub, base, ..] => pack_class_code(Some(*base), Some(*sub), Some(*prog_if)),
        _ => None,
    });
    record.location_debug = node.string("pcidebug");
    record.friendly_name = node.string("model");
    record.name = Some(node.name.clone());
    record.built_in_hint =
        node.properties.contains_key("built-in") || node.properties.contains_key("IOBuiltin");
    record.parent_key = node.parent.map(|p| nodes[p].key(p));

    // Collect this function and its PCI ancestors, nearest first.
    let mut chain = vec![index];
    let mut top = node.parent;
    while let Some(parent) = top {
        if !nodes[parent].is_pci_function() {
            break;
        }
        chain.push(parent);
        top = nodes[parent].parent;
    }
    chain.reverse();

    let Some(root_index) = top.filter(|&r| is_root_bus(nodes, r)) else {
        log::debug!("{}: no PCI root bus above {}", record.instance_key, node.name);
        return (record, None);
    };
    let root = &nodes[root_index];
    let uid = root.string("_UID").and_then(|u| parse_hex(&u)).unwrap_or(0);

    let hops: Option<Vec<String>> = chain.iter().map(|&i| nodes[i].pci_address()).collect();
    if let Some(hops) = &hops {
        let mut path = format!("PciRoot({:x})", uid);
        for hop in hops {
            path.push_str(&format!("#Pci({})", hop));
        }
        record.raw_location_paths.push(path);
    }

    if is_acpi_name(&root.name) {
        let mut path = format!("ACPI(_SB)#ACPI({})", root.name);
        for &i in &chain {
            let hop = &nodes[i];
            if is_acpi_name(&hop.name) {
                path.push_str(&format!("#ACPI({})", hop.name));
            } else {
                path.push_str(&format!("#PCI({})", hop.unit_address.as_deref().unwrap_or("0")));
            }
        }
        record.raw_location_paths.push(path);
    }

    (record, Some((root.key(root_index), uid)))
}

/// Decode `<86800000>` into bytes; string data (`<"...">`) is rejected
fn data_bytes(value: &str) -> Option<Vec<u8>> {
    let hex = value.strip_prefix('<')?.strip_suffix('>')?;
    if hex.contains('"') || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Decode `"text"` or `<"text">` into the first string
fn string_value(value: &str) -> Option<String> {
    string_list(value).into_iter().next()
}

/// Decode `<"a","b">` into all strings
fn string_list(value: &str) -> Vec<String> {
    let inner = value
        .strip_prefix('<')
        .and_then(|v| v.strip_suffix('>'))
        .unwrap_or(value);
    inner
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            s.strip_prefix('"')?.strip_suffix('"').map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"+-o Root  <class IORegistryEntry, id 0x100000100, retain 24>
  +-o MacPro7,1  <class IOPlatformExpertDevice, id 0x100000110, registered, matched, active, busy 0 (0 ms), retain 30>
    +-o PCI0@0  <class IOACPIPlatformDevice, id 0x100000120, registered, matched, active, busy 0 (0 ms), retain 20>
    | | {
    | |   "compatible" = <"PNP0A08","PNP0A03">
    | |   "_UID" = "0"
    | | }
    | |
    | +-o PEG0@1  <class IOPCIDevice, id 0x100000130, registered, matched, active, busy 0 (0 ms), retain 12>
    | | | {
    | | |   "vendor-id" = <86800000>
    | | |   "device-id" = <01190000>
    | | |   "class-code" = <00040600>
    | | |   "pcidebug" = "0:1:0"
    | | |   "acpi-path" = "IOACPIPlane:/_SB/PCI0@0/PEG0@10000"
    | | | }
    | | |
    | | +-o pci-bridge@0  <class IOPCIDevice, id 0x100000140, registered, matched, active, busy 0 (0 ms), retain 11>
    | |   | {
    | |   |   "vendor-id" = <02100000>
    | |   |   "device-id" = <78140000>
    | |   |   "pcidebug" = "1:0:0"
    | |   | }
    | |   |
    | |   +-o GFX0@0  <class IOPCIDevice, id 0x100000150, registered, matched, active, busy 0 (0 ms), retain 15>
    | |       {
    | |         "vendor-id" = <02100000>
    | |         "device-id" = <1f730000>
    | |         "pcidebug" = "3:0:0"
    | |         "model" = <"Radeon RX 5700 XT">
    | |       }
    | |
    | +-o XHC@14  <class IOPCIDevice, id 0x100000160, registered, matched, active, busy 0 (0 ms), retain 14>
    |     {
    |       "vendor-id" = <86800000>
    |       "device-id" = <eda30000>
    |       "built-in" = <00>
    |       "pcidebug" = "0:20:0"
    |     }
    |
    +-o PMU@0  <class IOService, id 0x100000170, registered, matched, active, busy 0 (0 ms), retain 8>
"#;

    #[test]
    fn test_parse_tree_depths() {
        let nodes = parse_tree(DUMP);
        let names: Vec<(&str, usize)> = nodes.iter().map(|n| (n.name.as_str(), n.depth)).collect();
        assert_eq!(
            names,
            vec![
                ("Root", 0),
                ("MacPro7,1", 1),
                ("PCI0", 2),
                ("PEG0", 3),
                ("pci-bridge", 4),
                ("GFX0", 5),
                ("XHC", 3),
                ("PMU", 2),
            ]
        );
        assert_eq!(nodes[6].parent, Some(2));
        assert_eq!(nodes[7].parent, Some(1));
        assert_eq!(nodes[3].class, "IOPCIDevice");
        assert_eq!(nodes[3].id.as_deref(), Some("0x100000130"));
    }

    #[test]
    fn test_parse_records() {
        let snap = parse(DUMP);
        assert_eq!(snap.records.len(), 4);
        assert_eq!(snap.roots.get("0x100000120"), Some(&0));

        let peg = &snap.records[0];
        assert_eq!(peg.ids(), Some((0x8086, 0x1901)));
        assert_eq!(peg.class_code, Some(0x060400));
        assert_eq!(peg.parent_key.as_deref(), Some("0x100000120"));

        let gfx = &snap.records[2];
        assert_eq!(gfx.friendly_name.as_deref(), Some("Radeon RX 5700 XT"));
        assert_eq!(
            gfx.raw_location_paths,
            vec![
                "PciRoot(0)#Pci(1,0)#Pci(0,0)#Pci(0,0)".to_string(),
                "ACPI(_SB)#ACPI(PCI0)#ACPI(PEG0)#PCI(0)#ACPI(GFX0)".to_string(),
            ]
        );

        let xhc = &snap.records[3];
        assert!(xhc.built_in_hint);
        assert_eq!(xhc.ids(), Some((0x8086, 0xa3ed)));
    }

    #[test]
    fn test_resolves_end_to_end() {
        let inv = crate::resolve(&parse(DUMP));

        let gfx = inv.get("0x100000150").unwrap();
        assert_eq!(gfx.pcidebug, "03:00.0");
        assert_eq!(
            gfx.device_path.as_deref(),
            Some("PciRoot(0x0)/Pci(0x1,0x0)/Pci(0x0,0x0)/Pci(0x0,0x0)")
        );
        assert_eq!(gfx.acpi_path.as_deref(), Some("/PCI0.PEG0.pci1002,1478@0,0.GFX0"));

        let bridge = inv.get("0x100000140").unwrap();
        assert_eq!(bridge.pci_bridge_tag.as_deref(), Some("pci1002,1478@0,0"));
        assert!(bridge.bridged);

        let xhc = inv.get("0x100000160").unwrap();
        assert_eq!(xhc.pcidebug, "00:14.0");
        assert_eq!(xhc.device_path.as_deref(), Some("PciRoot(0x0)/Pci(0x14,0x0)"));
        assert!(xhc.built_in);
    }

    #[test]
    fn test_root_bus_without_compatible() {
        let dump = r#"+-o Root  <class IORegistryEntry, id 0x1>
  +-o iMac20,1  <class IOPlatformExpertDevice, id 0x2>
    +-o PCI0@0  <class IOACPIPlatformDevice, id 0x3>
    | +-o GFX0@2  <class IOPCIDevice, id 0x4>
    |     {
    |       "vendor-id" = <86800000>
    |       "device-id" = <c59b0000>
    |     }
    |
    +-o PCX0@0  <class IOACPIPlatformDevice, id 0x5>
      +-o PXSX@0  <class IOService, id 0x6>
        +-o NIC0@0  <class IOPCIDevice, id 0x7>
            {
              "vendor-id" = <e4140000>
              "device-id" = <b4160000>
            }
"#;
        let snap = parse(dump);
        assert_eq!(snap.roots.get("0x3"), Some(&0));
        assert_eq!(snap.roots.len(), 1);

        let inv = crate::resolve(&snap);
        let gfx = inv.get("0x4").unwrap();
        assert_eq!(gfx.device_path.as_deref(), Some("PciRoot(0x0)/Pci(0x2,0x0)"));
        assert_eq!(gfx.acpi_path.as_deref(), Some("/PCI0.GFX0"));

        // NIC0 sits below PXSX, which is neither PCI nor a root bus
        let nic = inv.get("0x7").unwrap();
        assert_eq!(nic.device_path, None);
    }

    #[test]
    fn test_value_decoding() {
        assert_eq!(data_bytes("<86800000>"), Some(vec![0x86, 0x80, 0, 0]));
        assert_eq!(data_bytes("<8680000>"), None);
        assert_eq!(data_bytes("<\"PCI0\">"), None);
        assert_eq!(string_value("\"0:2:0\"").as_deref(), Some("0:2:0"));
        assert_eq!(string_value("<\"GFX0\">").as_deref(), Some("GFX0"));
        assert_eq!(string_list("<\"PNP0A08\",\"PNP0A03\">"), vec!["PNP0A08", "PNP0A03"]);
    }

    #[test]
    fn test_missing_ids_logged_not_fatal() {
        let dump = "+-o PCI0@0  <class IOACPIPlatformDevice, id 0x1>\n  | {\n  |   \"compatible\" = <\"PNP0A03\">\n  | }\n  +-o DEV0@2  <class IOPCIDevice, id 0x2>\n    {\n      \"vendor-id\" = <8680>\n    }\n";
        let snap = parse(dump);
        assert_eq!(snap.records.len(), 1);
        assert_eq!(snap.records[0].ids(), None);
        assert!(crate::resolve(&snap).is_empty());
    }
}
