//! Display columns and match predicates
//!
//! A [`DisplayConfig`] selects which columns to show and which devices to
//! keep. It can be built from command-line flags or loaded from TOML:
//!
//! ```toml
//! columns = ["pcidebug", "ven_dev", "acpi_path", "device_path"]
//! name = "GFX0"
//!
//! [[match]]
//! column = "bridged"
//! value = "no"
//! ```
//!
//! All comparisons are case-insensitive.

use core::fmt;
use core::str::FromStr;
use std::path::Path;

use crate::error::{PciPathError, Result};
use crate::record::ResolvedDevice;

/// A displayable device attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum Column {
    /// `bb:dd.f` locator
    PciDebug,
    /// `vvvv:dddd`
    VenDev,
    /// `YES`/`NO`
    BuiltIn,
    /// `YES`/`NO`
    Bridged,
    /// Exposed ACPI path
    AcpiPath,
    /// UEFI device path
    DevicePath,
    /// Node name
    Name,
    /// Human readable label
    FriendlyName,
    /// Resolved `PciRoot(...)` segment
    PciRoot,
    /// Overflow-safe device path
    OverflowDevicePath,
}

impl Column {
    /// Every column, in display order
    pub const ALL: [Column; 10] = [
        Column::PciDebug,
        Column::VenDev,
        Column::BuiltIn,
        Column::Bridged,
        Column::AcpiPath,
        Column::DevicePath,
        Column::Name,
        Column::FriendlyName,
        Column::PciRoot,
        Column::OverflowDevicePath,
    ];

    /// Columns of the classic listing
    pub const DEFAULT: [Column; 6] = [
        Column::PciDebug,
        Column::VenDev,
        Column::BuiltIn,
        Column::Bridged,
        Column::AcpiPath,
        Column::DevicePath,
    ];

    /// Configuration name of this column
    pub fn name(&self) -> &'static str {
        match self {
            Self::PciDebug => "pcidebug",
            Self::VenDev => "ven_dev",
            Self::BuiltIn => "built_in",
            Self::Bridged => "bridged",
            Self::AcpiPath => "acpi_path",
            Self::DevicePath => "device_path",
            Self::Name => "name",
            Self::FriendlyName => "friendly_name",
            Self::PciRoot => "pci_root",
            Self::OverflowDevicePath => "overflow_device_path",
        }
    }

    /// Table header for this column
    pub fn header(&self) -> &'static str {
        match self {
            Self::PciDebug => "PCIDBG",
            Self::VenDev => "VEN/DEV",
            Self::BuiltIn => "Built-In",
            Self::Bridged => "Bridged",
            Self::AcpiPath => "ACPI Path",
            Self::DevicePath => "Device Path",
            Self::Name => "Name",
            Self::FriendlyName => "Friendly Name",
            Self::PciRoot => "Root",
            Self::OverflowDevicePath => "Overflow Device Path",
        }
    }

    /// Value of this column for `dev`
    pub fn value(&self, dev: &ResolvedDevice) -> String {
        match self {
            Self::PciDebug => dev.pcidebug.clone(),
            Self::VenDev => dev.ven_dev.clone(),
            Self::BuiltIn => yes_no(dev.built_in).to_string(),
            Self::Bridged => yes_no(dev.bridged).to_string(),
            Self::AcpiPath => dev.acpi_path_or_unknown().to_string(),
            Self::DevicePath => dev.device_path_or_unknown().to_string(),
            Self::Name => dev.name.clone().unwrap_or_default(),
            Self::FriendlyName => dev.friendly_name.clone().unwrap_or_default(),
            Self::PciRoot => dev.pci_root.clone(),
            Self::OverflowDevicePath => dev.overflow_device_path_or_unknown().to_string(),
        }
    }
}

/// Render a flag the way the listing shows it
pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "YES"
    } else {
        "NO"
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = PciPathError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().replace('-', "_");
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(&wanted))
            .or_else(|| match wanted.to_ascii_lowercase().as_str() {
                "pcidbg" | "bdf" => Some(Column::PciDebug),
                "vendev" | "ids" => Some(Column::VenDev),
                "builtin" => Some(Column::BuiltIn),
                "acpi" => Some(Column::AcpiPath),
                "path" | "devicepath" => Some(Column::DevicePath),
                _ => None,
            })
            .ok_or_else(|| PciPathError::InvalidColumn(s.to_string()))
    }
}

impl TryFrom<String> for Column {
    type Error = PciPathError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A `column = value` equality test
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Predicate {
    /// Column to compare
    pub column: Column,
    /// Expected value
    pub value: String,
}

impl Predicate {
    /// Check `dev` against this predicate
    pub fn matches(&self, dev: &ResolvedDevice) -> bool {
        self.column.value(dev).eq_ignore_ascii_case(self.value.trim())
    }
}

impl FromStr for Predicate {
    type Err = PciPathError;

    fn from_str(s: &str) -> Result<Self> {
        let (column, value) = s
            .split_once('=')
            .ok_or_else(|| PciPathError::InvalidPredicate(s.to_string()))?;
        Ok(Self {
            column: column.parse()?,
            value: value.trim().to_string(),
        })
    }
}

/// Which columns to show and which devices to keep
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct DisplayConfig {
    /// Columns to show; empty means the classic listing
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Predicates that must all hold
    #[serde(default, rename = "match")]
    pub predicates: Vec<Predicate>,
    /// Only keep devices with this node name
    #[serde(default)]
    pub name: Option<String>,
}

impl DisplayConfig {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PciPathError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PciPathError::ConfigParse(e.to_string()))
    }

    /// Columns to render
    pub fn columns(&self) -> &[Column] {
        if self.columns.is_empty() {
            &Column::DEFAULT
        } else {
            &self.columns
        }
    }

    /// True when the classic listing layout applies
    pub fn is_default_layout(&self) -> bool {
        self.columns.is_empty() || self.columns == Column::DEFAULT
    }

    /// Check `dev` against the name filter and every predicate
    pub fn matches(&self, dev: &ResolvedDevice) -> bool {
        if let Some(name) = &self.name {
            let dev_name = dev.name.as_deref().unwrap_or_default();
            if !dev_name.eq_ignore_ascii_case(name) {
                return false;
            }
        }
        self.predicates.iter().all(|p| p.matches(dev))
    }
}
