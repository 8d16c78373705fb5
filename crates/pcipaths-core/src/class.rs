//! PCI class code names
//!
//! Used for the `device_type` of exported entries. Only the common
//! base/sub-class pairs are named; anything else falls back to the base class.

/// Human readable name for a packed 24-bit class code
pub fn class_name(class_code: u32) -> Option<&'static str> {
    let base = ((class_code >> 16) & 0xFF) as u8;
    let sub = ((class_code >> 8) & 0xFF) as u8;
    subclass_name(base, sub).or_else(|| base_class_name(base))
}

fn subclass_name(base: u8, sub: u8) -> Option<&'static str> {
    let name = match (base, sub) {
        (0x01, 0x01) => "IDE interface",
        (0x01, 0x04) => "RAID bus controller",
        (0x01, 0x06) => "SATA controller",
        (0x01, 0x08) => "Non-Volatile memory controller",
        (0x02, 0x00) => "Ethernet controller",
        (0x02, 0x80) => "Network controller",
        (0x03, 0x00) => "VGA compatible controller",
        (0x03, 0x02) => "3D controller",
        (0x03, 0x80) => "Display controller",
        (0x04, 0x01) => "Multimedia audio controller",
        (0x04, 0x03) => "Audio device",
        (0x05, 0x00) => "RAM memory",
        (0x06, 0x00) => "Host bridge",
        (0x06, 0x01) => "ISA bridge",
        (0x06, 0x04) => "PCI bridge",
        (0x07, 0x00) => "Serial controller",
        (0x07, 0x80) => "Communication controller",
        (0x08, 0x80) => "System peripheral",
        (0x0c, 0x03) => "USB controller",
        (0x0c, 0x05) => "SMBus",
        (0x0c, 0x80) => "Serial bus controller",
        (0x0d, 0x11) => "Bluetooth",
        (0x11, 0x80) => "Signal processing controller",
        _ => return None,
    };
    Some(name)
}

fn base_class_name(base: u8) -> Option<&'static str> {
    let name = match base {
        0x00 => "Unclassified device",
        0x01 => "Mass storage controller",
        0x02 => "Network controller",
        0x03 => "Display controller",
        0x04 => "Multimedia controller",
        0x05 => "Memory controller",
        0x06 => "Bridge",
        0x07 => "Communication controller",
        0x08 => "Generic system peripheral",
        0x09 => "Input device controller",
        0x0a => "Docking station",
        0x0b => "Processor",
        0x0c => "Serial bus controller",
        0x0d => "Wireless controller",
        0x0e => "Intelligent controller",
        0x0f => "Satellite communications controller",
        0x10 => "Encryption controller",
        0x11 => "Signal processing controller",
        0x12 => "Processing accelerators",
        _ => return None,
    };
    Some(name)
}
