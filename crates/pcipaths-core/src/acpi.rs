//! ACPI path formatting
//!
//! A raw ACPI location such as `ACPI(_SB_)#ACPI(PCI0)#ACPI(RP05)#PCI(0000)`
//! lists one component per namespace level. Named objects contribute their
//! name; address-only PCI-to-PCI bridges (no ACPI object) contribute the
//! `pci-bridge` placeholder.

use core::fmt;

/// Placeholder for a PCI hop without an ACPI name
pub const PCI_BRIDGE: &str = "pci-bridge";

/// One level of an ACPI path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcpiComponent {
    /// Named ACPI object (at most four characters)
    Named(String),
    /// Unnamed PCI hop, optionally annotated with its `dev,func` address
    Bridge(Option<String>),
    /// Vendor/device tagged bridge identity (`pci8086,1901@1,0`)
    Tagged(String),
}

impl fmt::Display for AcpiComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) | Self::Tagged(name) => write!(f, "{}", name),
            Self::Bridge(None) => write!(f, "{}", PCI_BRIDGE),
            Self::Bridge(Some(addr)) => write!(f, "{}@{}", PCI_BRIDGE, addr),
        }
    }
}

/// Parse a raw ACPI location into its components
///
/// Returns `None` if the string does not start with `ACPI(` or if any
/// segment is neither a valid ACPI name nor a `PCI(...)` hop.
pub fn parse_acpi_components(raw: &str) -> Option<Vec<AcpiComponent>> {
    let raw = raw.trim();
    if !has_prefix(raw, "ACPI(") {
        return None;
    }

    raw.split('#').map(parse_component).collect()
}

/// Format a raw ACPI location as a dotted path (`_SB.PCI0.pci-bridge`)
pub fn format_acpi_path(raw: &str) -> Option<String> {
    let components = parse_acpi_components(raw)?;
    Some(join_dotted(&components))
}

/// Join components with `.`
pub fn join_dotted(components: &[AcpiComponent]) -> String {
    components
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Drop the system-bus root and render the exposed `/`-prefixed path
///
/// Returns `None` when nothing remains below the root.
pub fn exposed_path(components: &[AcpiComponent]) -> Option<String> {
    components
        .split_first()
        .and_then(|(_, rest)| render_exposed(rest))
}

/// Render components that already exclude the root as `/PCI0.GFX0`
pub fn render_exposed(components: &[AcpiComponent]) -> Option<String> {
    if components.is_empty() {
        return None;
    }
    Some(format!("/{}", join_dotted(components)))
}

/// Split an exposed ACPI path into segments, keeping the separators
///
/// The leading `/` yields an empty first segment, so index `n` lines up with
/// segment `n` of a `/`-split UEFI device path of the same device.
pub fn split_segments(path: &str) -> (Vec<String>, Vec<char>) {
    let mut segments = vec![String::new()];
    let mut separators = Vec::new();
    for ch in path.chars() {
        if ch == '/' || ch == '.' {
            separators.push(ch);
            segments.push(String::new());
        } else if let Some(last) = segments.last_mut() {
            last.push(ch);
        }
    }
    (segments, separators)
}

/// Inverse of [`split_segments`]
pub fn join_segments(segments: &[String], separators: &[char]) -> String {
    let mut out = String::new();
    for (idx, segment) in segments.iter().enumerate() {
        if idx > 0 {
            if let Some(sep) = separators.get(idx - 1) {
                out.push(*sep);
            }
        }
        out.push_str(segment);
    }
    out
}

/// Check for a valid ACPI name segment (1-4 of `A-Z`, `0-9`, `_`)
pub fn is_acpi_name(name: &str) -> bool {
    (1..=4).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn has_prefix(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn parse_component(segment: &str) -> Option<AcpiComponent> {
    let segment = segment.trim();
    if has_prefix(segment, "ACPI(") {
        let inner = segment["ACPI(".len()..].strip_suffix(')')?;
        let name = trim_name_padding(inner.trim());
        if is_acpi_name(name) {
            return Some(AcpiComponent::Named(name.to_string()));
        }
        log::trace!("rejecting ACPI component '{}'", segment);
        None
    } else if has_prefix(segment, "PCI(") {
        Some(AcpiComponent::Bridge(None))
    } else {
        None
    }
}

/// ACPI names are padded to four characters with `_` (`_SB_`)
fn trim_name_padding(name: &str) -> &str {
    let trimmed = name.trim_end_matches('_');
    if trimmed.is_empty() {
        name
    } else {
        trimmed
    }
}
