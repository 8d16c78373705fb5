//! UEFI device path sanitizing
//!
//! Raw location strings come in several spellings depending on the source:
//!
//! - Windows: `PCIROOT(0)#PCI(1C04)#PCI(0000)`
//! - synthesized from ioreg: `PciRoot(0)#Pci(1c,4)#Pci(0,0)`
//! - already normalized: `PciRoot(0x0)/Pci(0x1C,0x4)/Pci(0x0,0x0)`
//!
//! All of them are parsed into a [`PciPath`] which renders the normalized
//! `PciRoot(0x0)/Pci(0x1C,0x4)/Pci(0x0,0x0)` form.
//!
//! # Combined hop addresses
//!
//! A hop written as one hex number (`PCI(1C04)`) is decomposed with the
//! device in the high byte and the function in the low byte. Other tools in
//! this family have used the reverse order; downstream consumers compare
//! paths as strings, so only this one convention is supported.

use core::fmt;

use crate::codec::{clamp_byte, hex_word, parse_hex};

/// One `Pci(device,function)` hop below the root bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciHop {
    /// Device (slot) number
    pub device: u32,
    /// Function number
    pub function: u32,
}

impl PciHop {
    /// Split a combined hop address: device high byte, function low byte
    pub fn from_combined(addr: u32) -> Self {
        Self {
            device: (addr >> 8) & 0xFF,
            function: addr & 0xFF,
        }
    }

    /// Unit address suffix used in ACPI and bridge names (`1c,4`)
    pub fn unit_address(&self) -> String {
        format!("{:x},{:x}", self.device, self.function)
    }

    fn clamped(&self) -> Self {
        Self {
            device: clamp_byte(self.device),
            function: clamp_byte(self.function),
        }
    }
}

impl fmt::Display for PciHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pci({},{})",
            hex_word(self.device.into(), 0),
            hex_word(self.function.into(), 0)
        )
    }
}

/// A parsed UEFI PCI device path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciPath {
    /// Root bridge UID
    pub root: u32,
    /// Hops from the root bridge down to the device
    pub hops: Vec<PciHop>,
}

impl PciPath {
    /// Parse a raw location string
    ///
    /// Returns `None` if the string does not start with `PciRoot(` (any case)
    /// or if the root or any hop fails to parse.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if !starts_with_ignore_case(raw, "PciRoot(") {
            return None;
        }

        let mut tokens = raw.split(['#', '/']).map(unwrap_segment);
        let root = parse_hex(tokens.next()?)?;
        let hops = tokens.map(parse_hop).collect::<Option<Vec<_>>>()?;

        Some(Self { root, hops })
    }

    /// Number of `/`-separated segments, root included
    pub fn depth(&self) -> usize {
        self.hops.len() + 1
    }

    /// The `PciRoot(...)` segment alone
    pub fn root_segment(&self) -> String {
        root_segment(self.root)
    }

    /// Variant with every byte over 0xFF clamped to 0
    pub fn overflow_safe(&self) -> Self {
        Self {
            root: clamp_byte(self.root),
            hops: self.hops.iter().map(PciHop::clamped).collect(),
        }
    }
}

impl fmt::Display for PciPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root_segment())?;
        for hop in &self.hops {
            write!(f, "/{}", hop)?;
        }
        Ok(())
    }
}

/// Normalized full-precision and overflow-safe renderings of one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePaths {
    /// Full precision path
    pub full: String,
    /// Path with bytes over 0xFF clamped to 0
    pub overflow: String,
}

/// Sanitize a raw location string into both path renderings
///
/// Returns `None` when no path can be derived; callers show
/// [`UNKNOWN_DEVICE_PATH`](crate::UNKNOWN_DEVICE_PATH) in both slots.
pub fn sanitize_device_path(raw: &str) -> Option<DevicePaths> {
    let path = PciPath::parse(raw)?;
    Some(DevicePaths {
        full: path.to_string(),
        overflow: path.overflow_safe().to_string(),
    })
}

/// Render a `PciRoot(...)` segment
pub fn root_segment(root: u32) -> String {
    format!("PciRoot({})", hex_word(root.into(), 0))
}

/// Replace the leading `PciRoot(...)` segment, keeping the rest verbatim
pub fn replace_root(path: &str, root: &str) -> String {
    match path.find('/') {
        Some(idx) => format!("{}{}", root, &path[idx..]),
        None => root.to_string(),
    }
}

/// Leading `PciRoot(...)` segment of a normalized path
pub fn leading_segment(path: &str) -> &str {
    path.split('/').next().unwrap_or(path)
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Strip `PciRoot(`, `Pci(` and `)` wrappers from one segment
fn unwrap_segment(segment: &str) -> &str {
    let segment = segment.trim();
    let inner = if starts_with_ignore_case(segment, "PciRoot(") {
        &segment["PciRoot(".len()..]
    } else if starts_with_ignore_case(segment, "Pci(") {
        &segment["Pci(".len()..]
    } else {
        segment
    };
    inner.strip_suffix(')').unwrap_or(inner).trim()
}

fn parse_hop(token: &str) -> Option<PciHop> {
    match token.split_once(',') {
        Some((device, function)) => Some(PciHop {
            device: parse_hex(device)?,
            function: parse_hex(function)?,
        }),
        None => Some(PciHop::from_combined(parse_hex(token)?)),
    }
}
