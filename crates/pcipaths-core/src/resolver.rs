//! Bridge and parent resolution
//!
//! Resolution runs in three passes over the whole snapshot:
//!
//! 1. **Derive**: per record, sanitize the raw UEFI and ACPI locations,
//!    annotate unnamed bridge hops with their `dev,func` address and tag a
//!    record that is itself an unnamed bridge with `pciVVVV,DDDD@addr`.
//! 2. **Roots**: walk each record's parent chain to the root bus it hangs
//!    off and rewrite the leading `PciRoot(...)` segment to match.
//! 3. **Bridges**: copy every bridge tag into the ACPI paths of the devices
//!    below that bridge.
//!
//! Pass 3 reads the output of pass 1 for *all* records, so the passes must
//! run in order. Records are kept in a plain map keyed by instance key;
//! parent links are looked up by key, never followed as pointers.

use std::collections::{BTreeMap, BTreeSet};

use crate::acpi::{self, AcpiComponent};
use crate::device_path::{leading_segment, replace_root, root_segment, PciPath};
use crate::record::{Inventory, RawDeviceRecord, ResolvedDevice, Snapshot};

/// Resolve every device in `snapshot`
///
/// Records without both a vendor and a device id are dropped before any
/// pass runs. A record that cannot be resolved keeps sentinel paths and is
/// still returned.
pub fn resolve(snapshot: &Snapshot) -> Inventory {
    let mut devices = BTreeMap::new();
    for raw in &snapshot.records {
        let Some((vendor, device)) = raw.ids() else {
            log::debug!("{}: missing vendor/device id, skipping", raw.instance_key);
            continue;
        };
        if devices.contains_key(&raw.instance_key) {
            log::warn!("{}: duplicate instance key, keeping the first", raw.instance_key);
            continue;
        }
        devices.insert(raw.instance_key.clone(), derive(raw, vendor, device));
    }

    resolve_roots(&mut devices, &snapshot.roots);
    patch_bridges(&mut devices);

    for dev in devices.values() {
        if dev.device_path.is_none() || dev.acpi_path.is_none() {
            log::warn!(
                "{} ({}): unresolved {}{}",
                dev.instance_key,
                dev.ven_dev,
                if dev.acpi_path.is_none() { "ACPI path " } else { "" },
                if dev.device_path.is_none() { "device path" } else { "" },
            );
        }
    }
    log::info!("Resolved {} PCI devices", devices.len());

    Inventory::new(devices)
}

/// Pass 1: derive the per-record paths
fn derive(raw: &RawDeviceRecord, vendor: u16, device: u16) -> ResolvedDevice {
    let mut dev = ResolvedDevice::from_raw(raw, vendor, device);

    let pci_path = raw.raw_device_path().and_then(PciPath::parse);
    if let Some(path) = &pci_path {
        dev.device_path = Some(path.to_string());
        dev.overflow_device_path = Some(path.overflow_safe().to_string());
        dev.pci_root = path.root_segment();
    }

    let Some(components) = raw.raw_acpi_path().and_then(acpi::parse_acpi_components) else {
        return dev;
    };

    // Below the system-bus root the components line up with the device path
    // segments: PCI0 <-> PciRoot, then one component per Pci() hop.
    let mut exposed: Vec<AcpiComponent> = components.iter().skip(1).cloned().collect();
    if let Some(path) = &pci_path {
        if exposed.len() == path.depth() {
            for (component, hop) in exposed.iter_mut().skip(1).zip(&path.hops) {
                if let AcpiComponent::Bridge(addr) = component {
                    *addr = Some(hop.unit_address());
                }
            }
        } else {
            log::debug!(
                "{}: ACPI path has {} segments, device path has {}; not annotating",
                raw.instance_key,
                exposed.len(),
                path.depth()
            );
        }

        let last_is_bridge = matches!(exposed.last(), Some(AcpiComponent::Bridge(_)));
        if let Some(hop) = path.hops.last().filter(|_| last_is_bridge) {
            let tag = format!("pci{:04x},{:04x}@{}", vendor, device, hop.unit_address());
            if let Some(last) = exposed.last_mut() {
                *last = AcpiComponent::Tagged(tag.clone());
            }
            dev.pci_bridge_tag = Some(tag);
        }
    }

    let named_only = components
        .iter()
        .all(|c| matches!(c, AcpiComponent::Named(_)));
    dev.bridged = !matches!(components.last(), Some(AcpiComponent::Named(_)));
    dev.built_in |= named_only && components.len() > 1;
    dev.acpi_path = acpi::render_exposed(&exposed);
    dev
}

/// Outcome of walking one parent chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootWalk {
    /// Reached a root bus with this UID
    Found(u32),
    /// Reached a key that is neither a device nor a root bus
    Orphan,
    /// Visited a key twice
    Cycle,
}

/// Follow parent links from `start` until a root bus is reached
fn walk_to_root<'a>(
    start: &'a str,
    parents: &BTreeMap<&'a str, Option<&'a str>>,
    roots: &BTreeMap<String, u32>,
) -> RootWalk {
    let mut seen = BTreeSet::new();
    let mut key = start;
    // Every step visits a new key, so this is bounded by the snapshot size.
    loop {
        if let Some(uid) = roots.get(key) {
            return RootWalk::Found(*uid);
        }
        if !seen.insert(key) {
            return RootWalk::Cycle;
        }
        match parents.get(key).copied().flatten() {
            Some(parent) => key = parent,
            None => return RootWalk::Orphan,
        }
    }
}

/// Pass 2: resolve roots and rewrite mismatching `PciRoot(...)` segments
fn resolve_roots(devices: &mut BTreeMap<String, ResolvedDevice>, roots: &BTreeMap<String, u32>) {
    let walks: Vec<(String, RootWalk)> = {
        let parents: BTreeMap<&str, Option<&str>> = devices
            .iter()
            .map(|(key, dev)| (key.as_str(), dev.parent_key.as_deref()))
            .collect();
        devices
            .values()
            .filter_map(|dev| {
                let parent = dev.parent_key.as_deref()?;
                Some((dev.instance_key.clone(), walk_to_root(parent, &parents, roots)))
            })
            .collect()
    };

    for (key, walk) in walks {
        let Some(dev) = devices.get_mut(&key) else {
            continue;
        };
        let uid = match walk {
            RootWalk::Found(uid) => uid,
            RootWalk::Orphan => {
                log::debug!("{}: parent chain ends outside the snapshot", key);
                0
            }
            RootWalk::Cycle => {
                log::warn!("{}: parent chain loops, using default root", key);
                0
            }
        };
        let root = root_segment(uid);
        if let Some(path) = &dev.device_path {
            if leading_segment(path) != root {
                log::debug!("{}: rewriting {} to {}", key, leading_segment(path), root);
                dev.device_path = Some(replace_root(path, &root));
                let safe_root = root_segment(crate::codec::clamp_byte(uid));
                dev.overflow_device_path = dev
                    .overflow_device_path
                    .as_deref()
                    .map(|p| replace_root(p, &safe_root));
            }
        }
        dev.pci_root = root;
    }
}

/// Pass 3: propagate bridge tags into descendant ACPI paths
fn patch_bridges(devices: &mut BTreeMap<String, ResolvedDevice>) {
    let bridges: Vec<(String, String, String)> = devices
        .values()
        .filter_map(|dev| {
            Some((
                dev.instance_key.clone(),
                dev.device_path.clone()?,
                dev.pci_bridge_tag.clone()?,
            ))
        })
        .collect();

    // Collect every patch first so no pass-3 write is visible to another read.
    let mut patches: Vec<(String, usize, String)> = Vec::new();
    for (bridge_key, bridge_path, tag) in &bridges {
        let depth = bridge_path.split('/').count();
        for dev in devices.values() {
            if &dev.instance_key == bridge_key || dev.built_in || dev.acpi_path.is_none() {
                continue;
            }
            let Some(path) = dev.device_path.as_deref() else {
                continue;
            };
            let below = path
                .strip_prefix(bridge_path.as_str())
                .is_some_and(|rest| rest.starts_with('/'));
            if below {
                patches.push((dev.instance_key.clone(), depth, tag.clone()));
            }
        }
    }

    for (key, index, tag) in patches {
        let Some(dev) = devices.get_mut(&key) else {
            continue;
        };
        let Some(path) = dev.acpi_path.as_deref() else {
            continue;
        };
        let (mut segments, separators) = acpi::split_segments(path);
        match segments.get_mut(index) {
            Some(segment) => {
                log::trace!("{}: segment {} '{}' -> '{}'", key, index, segment, tag);
                *segment = tag;
                dev.acpi_path = Some(acpi::join_segments(&segments, &separators));
            }
            None => log::debug!("{}: ACPI path too short to patch segment {}", key, index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, ven: u16, dev: u16, paths: &[&str], parent: Option<&str>) -> RawDeviceRecord {
        let mut raw = RawDeviceRecord::new(key);
        raw.vendor_id = Some(ven);
        raw.device_id = Some(dev);
        raw.raw_location_paths = paths.iter().map(|p| p.to_string()).collect();
        raw.parent_key = parent.map(str::to_string);
        raw
    }

    fn snapshot(records: Vec<RawDeviceRecord>, roots: &[(&str, u32)]) -> Snapshot {
        Snapshot {
            records,
            roots: roots.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_named_device() {
        let snap = snapshot(
            vec![record(
                "igpu",
                0x8086,
                0x5912,
                &["PCIROOT(0)#PCI(0200)", "ACPI(_SB_)#ACPI(PCI0)#ACPI(GFX0)"],
                Some("root0"),
            )],
            &[("root0", 0)],
        );
        let inv = resolve(&snap);
        let dev = inv.get("igpu").unwrap();
        assert_eq!(dev.device_path.as_deref(), Some("PciRoot(0x0)/Pci(0x2,0x0)"));
        assert_eq!(dev.acpi_path.as_deref(), Some("/PCI0.GFX0"));
        assert!(dev.built_in);
        assert!(!dev.bridged);
        assert_eq!(dev.pci_bridge_tag, None);
    }

    #[test]
    fn test_unnamed_bridge_gets_tag() {
        let snap = snapshot(
            vec![record(
                "bridge",
                0x8086,
                0x1901,
                &["PCIROOT(0)#PCI(0100)", "ACPI(_SB_)#ACPI(PCI0)#PCI(0100)"],
                None,
            )],
            &[],
        );
        let inv = resolve(&snap);
        let dev = inv.get("bridge").unwrap();
        assert_eq!(dev.pci_bridge_tag.as_deref(), Some("pci8086,1901@1,0"));
        assert_eq!(dev.acpi_path.as_deref(), Some("/PCI0.pci8086,1901@1,0"));
        assert!(dev.bridged);
        assert!(!dev.built_in);
    }

    #[test]
    fn test_bridge_placeholders_annotated() {
        let snap = snapshot(
            vec![record(
                "nic",
                0x14e4,
                0x43a0,
                &[
                    "PCIROOT(0)#PCI(1C04)#PCI(0000)#PCI(0300)",
                    "ACPI(_SB_)#ACPI(PCI0)#ACPI(RP05)#PCI(0000)#ACPI(ARPT)",
                ],
                None,
            )],
            &[],
        );
        let dev = resolve(&snap).get("nic").cloned().unwrap();
        assert_eq!(dev.acpi_path.as_deref(), Some("/PCI0.RP05.pci-bridge@0,0.ARPT"));
        assert!(!dev.bridged);
        assert!(!dev.built_in);
    }

    #[test]
    fn test_mismatched_lengths_skip_annotation() {
        let snap = snapshot(
            vec![record(
                "dev",
                0x1b21,
                0x2142,
                &["PCIROOT(0)#PCI(1C00)", "ACPI(_SB_)#ACPI(PCI0)#PCI(0000)#ACPI(XHC2)"],
                None,
            )],
            &[],
        );
        let dev = resolve(&snap).get("dev").cloned().unwrap();
        assert_eq!(dev.acpi_path.as_deref(), Some("/PCI0.pci-bridge.XHC2"));
    }

    #[test]
    fn test_missing_ids_excluded() {
        let mut no_dev = record("no-dev", 0x8086, 0, &["PCIROOT(0)#PCI(0200)"], None);
        no_dev.device_id = None;
        let mut no_ven = record("no-ven", 0, 0x1901, &["PCIROOT(0)#PCI(0100)"], None);
        no_ven.vendor_id = None;
        let ok = record("ok", 0x8086, 0x1901, &[], None);
        let inv = resolve(&snapshot(vec![no_dev, no_ven, ok], &[]));
        assert_eq!(inv.len(), 1);
        assert!(inv.get("no-dev").is_none());
        assert!(inv.get("no-ven").is_none());
        let dev = inv.get("ok").unwrap();
        assert_eq!(dev.device_path_or_unknown(), crate::UNKNOWN_DEVICE_PATH);
        assert_eq!(dev.acpi_path_or_unknown(), crate::UNKNOWN_ACPI_PATH);
    }

    #[test]
    fn test_three_level_chain_gets_root() {
        let snap = snapshot(
            vec![
                record("A", 0x10de, 0x1b80, &["PCIROOT(0)#PCI(0100)#PCI(0000)"], Some("B")),
                record("B", 0x8086, 0x1901, &["PCIROOT(0)#PCI(0100)"], Some("C")),
            ],
            &[("C", 1)],
        );
        let inv = resolve(&snap);
        assert_eq!(inv.get("A").unwrap().pci_root, "PciRoot(0x1)");
        assert_eq!(inv.get("B").unwrap().pci_root, "PciRoot(0x1)");
        assert_eq!(
            inv.get("A").unwrap().device_path.as_deref(),
            Some("PciRoot(0x1)/Pci(0x1,0x0)/Pci(0x0,0x0)")
        );
        assert_eq!(
            inv.get("B").unwrap().overflow_device_path.as_deref(),
            Some("PciRoot(0x1)/Pci(0x1,0x0)")
        );
    }

    #[test]
    fn test_cycle_terminates_with_default_root() {
        let snap = snapshot(
            vec![
                record("A", 0x8086, 0x0001, &["PCIROOT(2)#PCI(0100)"], Some("B")),
                record("B", 0x8086, 0x0002, &["PCIROOT(2)#PCI(0200)"], Some("A")),
            ],
            &[],
        );
        let inv = resolve(&snap);
        for key in ["A", "B"] {
            let dev = inv.get(key).unwrap();
            assert_eq!(dev.pci_root, "PciRoot(0x0)");
            assert!(dev.device_path.as_deref().unwrap().starts_with("PciRoot(0x0)/"));
        }
    }

    #[test]
    fn test_orphan_parent_uses_default_root() {
        let snap = snapshot(
            vec![record("A", 0x8086, 0x0001, &["PCIROOT(3)#PCI(0100)"], Some("gone"))],
            &[],
        );
        let dev = resolve(&snap).get("A").cloned().unwrap();
        assert_eq!(dev.pci_root, "PciRoot(0x0)");
        assert_eq!(dev.device_path.as_deref(), Some("PciRoot(0x0)/Pci(0x1,0x0)"));
    }

    #[test]
    fn test_no_parent_keeps_observed_root() {
        let snap = snapshot(
            vec![record("A", 0x8086, 0x0001, &["PCIROOT(3)#PCI(0100)"], None)],
            &[],
        );
        let dev = resolve(&snap).get("A").cloned().unwrap();
        assert_eq!(dev.pci_root, "PciRoot(0x3)");
    }

    #[test]
    fn test_walk_to_root_bounded() {
        let parents: BTreeMap<&str, Option<&str>> =
            [("A", Some("B")), ("B", Some("C")), ("C", Some("A"))].into_iter().collect();
        let roots = BTreeMap::new();
        assert_eq!(walk_to_root("A", &parents, &roots), RootWalk::Cycle);
        assert_eq!(walk_to_root("X", &parents, &roots), RootWalk::Orphan);
    }

    #[test]
    fn test_patch_descendant_acpi_path() {
        let mut devices = BTreeMap::new();
        let mut bridge = ResolvedDevice::from_raw(&RawDeviceRecord::new("B"), 0x8086, 0x1901);
        bridge.device_path = Some("PciRoot(0x0)/Pci(0x1,0x0)".to_string());
        bridge.pci_bridge_tag = Some("pci8086,1901@1,0".to_string());
        let mut gpu = ResolvedDevice::from_raw(&RawDeviceRecord::new("D"), 0x10de, 0x1b80);
        gpu.device_path = Some("PciRoot(0x0)/Pci(0x1,0x0)/Pci(0x0,0x0)".to_string());
        gpu.acpi_path = Some("/PCI0.pci-bridge.GFX0".to_string());
        devices.insert("B".to_string(), bridge);
        devices.insert("D".to_string(), gpu);

        patch_bridges(&mut devices);
        assert_eq!(
            devices["D"].acpi_path.as_deref(),
            Some("/PCI0.pci8086,1901@1,0.GFX0")
        );
    }

    #[test]
    fn test_patch_skips_built_in_and_siblings() {
        let mut devices = BTreeMap::new();
        let mut bridge = ResolvedDevice::from_raw(&RawDeviceRecord::new("B"), 0x8086, 0x1901);
        bridge.device_path = Some("PciRoot(0x0)/Pci(0x1,0x0)".to_string());
        bridge.pci_bridge_tag = Some("pci8086,1901@1,0".to_string());
        let mut builtin = ResolvedDevice::from_raw(&RawDeviceRecord::new("I"), 0x8086, 0x0001);
        builtin.built_in = true;
        builtin.device_path = Some("PciRoot(0x0)/Pci(0x1,0x0)/Pci(0x0,0x0)".to_string());
        builtin.acpi_path = Some("/PCI0.PEG0.GFX0".to_string());
        let mut sibling = ResolvedDevice::from_raw(&RawDeviceRecord::new("S"), 0x8086, 0x0002);
        sibling.device_path = Some("PciRoot(0x0)/Pci(0x1,0x1)/Pci(0x0,0x0)".to_string());
        sibling.acpi_path = Some("/PCI0.pci-bridge.XHC0".to_string());
        devices.insert("B".to_string(), bridge);
        devices.insert("I".to_string(), builtin);
        devices.insert("S".to_string(), sibling);

        patch_bridges(&mut devices);
        assert_eq!(devices["I"].acpi_path.as_deref(), Some("/PCI0.PEG0.GFX0"));
        assert_eq!(devices["S"].acpi_path.as_deref(), Some("/PCI0.pci-bridge.XHC0"));
    }

    #[test]
    fn test_nested_bridges_end_to_end() {
        let snap = snapshot(
            vec![
                record(
                    "up",
                    0x8086,
                    0x1901,
                    &["PCIROOT(0)#PCI(0100)", "ACPI(_SB_)#ACPI(PCI0)#PCI(0100)"],
                    Some("root"),
                ),
                record(
                    "down",
                    0x1002,
                    0x1478,
                    &[
                        "PCIROOT(0)#PCI(0100)#PCI(0000)",
                        "ACPI(_SB_)#ACPI(PCI0)#PCI(0100)#PCI(0000)",
                    ],
                    Some("up"),
                ),
                record(
                    "gpu",
                    0x1002,
                    0x731f,
                    &[
                        "PCIROOT(0)#PCI(0100)#PCI(0000)#PCI(0000)",
                        "ACPI(_SB_)#ACPI(PCI0)#PCI(0100)#PCI(0000)#PCI(0000)",
                    ],
                    Some("down"),
                ),
            ],
            &[("root", 0)],
        );
        let inv = resolve(&snap);
        assert_eq!(
            inv.get("down").unwrap().acpi_path.as_deref(),
            Some("/PCI0.pci8086,1901@1,0.pci1002,1478@0,0")
        );
        assert_eq!(
            inv.get("gpu").unwrap().acpi_path.as_deref(),
            Some("/PCI0.pci8086,1901@1,0.pci1002,1478@0,0.pci1002,731f@0,0")
        );
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let snap = snapshot(
            vec![
                record("b", 0x8086, 0x1901, &["PCIROOT(0)#PCI(0100)", "ACPI(_SB_)#ACPI(PCI0)#PCI(0100)"], Some("r")),
                record("a", 0x10de, 0x1b80, &["PCIROOT(0)#PCI(0100)#PCI(0000)", "ACPI(_SB_)#ACPI(PCI0)#PCI(0100)#ACPI(GFX0)"], Some("b")),
            ],
            &[("r", 0)],
        );
        assert_eq!(resolve(&snap), resolve(&snap));
    }
}
