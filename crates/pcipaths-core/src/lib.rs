//! pcipaths-core - ACPI and UEFI device path reconstruction
//!
//! This crate turns the raw per-device attributes found in an OS device dump
//! into normalized firmware paths for every PCI function:
//!
//! - a UEFI device path (`PciRoot(0x0)/Pci(0x1,0x0)/Pci(0x0,0x0)`)
//! - an ACPI path with the system-bus root stripped (`/PCI0.PEG0.GFX0`)
//! - a `bb:dd.f` debug locator and a `vvvv:dddd` id pair
//!
//! # Pipeline
//!
//! ```text
//! dump text ──► Snapshot ──► resolver (derive, roots, bridges) ──► Inventory ──► rows
//! ```
//!
//! The [`dump`] module parses the two supported dump formats (an `ioreg`
//! service tree and a flat Windows `InstanceId KeyName Data` table) into a
//! [`Snapshot`]. [`resolve`] runs the three resolution passes over the whole
//! snapshot and returns an [`Inventory`] keyed by instance key.
//!
//! # Example
//!
//! ```ignore
//! use pcipaths_core::{resolve, Snapshot};
//!
//! let snapshot = Snapshot::parse(&dump_text)?;
//! let inventory = resolve(&snapshot);
//! for dev in inventory.devices() {
//!     println!("{} {}", dev.ven_dev, dev.device_path_or_unknown());
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod acpi;
pub mod class;
pub mod codec;
pub mod device_path;
pub mod dump;
pub mod error;
pub mod filter;
pub mod plist;
pub mod record;
pub mod resolver;
pub mod rows;

pub use error::{PciPathError, Result};
pub use filter::{Column, DisplayConfig, Predicate};
pub use record::{Inventory, RawDeviceRecord, ResolvedDevice, Snapshot};
pub use resolver::resolve;
pub use rows::Row;

/// Fallback shown when no ACPI path could be reconstructed
pub const UNKNOWN_ACPI_PATH: &str = "Unknown ACPI Path";

/// Fallback shown when no UEFI device path could be reconstructed
pub const UNKNOWN_DEVICE_PATH: &str = "Unknown Device Path";
