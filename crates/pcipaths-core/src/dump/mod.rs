//! Device dump adapters
//!
//! Two text formats are understood:
//!
//! - [`ioreg`]: the indented service tree printed by
//!   `ioreg -lw0 -p IODeviceTree`
//! - [`windows`]: a flat `InstanceId KeyName Data` table of SetupAPI device
//!   properties
//!
//! Both produce a [`Snapshot`](crate::Snapshot); the resolver never sees the
//! raw text.

pub mod ioreg;
pub mod windows;

/// Supported dump formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    /// ioreg service tree
    Ioreg,
    /// Windows `InstanceId KeyName Data` table
    WindowsTable,
}

/// Guess the format of a dump from its content
pub fn detect(text: &str) -> Option<DumpFormat> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    if first.starts_with(windows::HEADER) || windows::parse_line(first).is_some() {
        return Some(DumpFormat::WindowsTable);
    }
    if text.lines().any(|l| ioreg::node_line(l).is_some()) {
        return Some(DumpFormat::Ioreg);
    }
    None
}
