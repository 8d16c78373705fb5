//! Address encoding helpers
//!
//! Stateless conversions shared by the dump adapters and the resolver: hex
//! rendering, little-endian id decoding, `bb:dd.f` locators and class-code
//! packing. The decoding functions are total and report failure through
//! sentinels or `None`, never by panicking.

/// Sentinel for an undecodable vendor/device pair
pub const UNKNOWN_VENDEV: &str = "????:????";

/// Sentinel for an undecodable bus/device/function locator
pub const UNKNOWN_BDF: &str = "??:??.?";

/// Render `n` as `0x` followed by uppercase hex, zero padded to `pad` digits
pub fn hex_word(n: u64, pad: usize) -> String {
    format!("0x{:0width$X}", n, width = pad)
}

/// Parse a hex number with or without a `0x` prefix
pub fn parse_hex(s: &str) -> Option<u32> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Decode a little-endian 16-bit word from the first two bytes of `raw`
///
/// Anything other than exactly two or four bytes is rejected; ioreg pads
/// 16-bit ids to a 32-bit cell, so the upper half must then be zero.
pub fn le_word(raw: &[u8]) -> Option<u16> {
    match raw {
        [lo, hi] => Some(u16::from_le_bytes([*lo, *hi])),
        [lo, hi, 0, 0] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

/// Byte-swap two little-endian id words into a `(vendor, device)` pair
pub fn parse_vendev(raw_vendor: &[u8], raw_device: &[u8]) -> Option<(u16, u16)> {
    Some((le_word(raw_vendor)?, le_word(raw_device)?))
}

/// Render a vendor/device pair as lowercase `vvvv:dddd`
pub fn format_vendev(vendor: u16, device: u16) -> String {
    format!("{:04x}:{:04x}", vendor, device)
}

/// Decode two raw little-endian id words into `vvvv:dddd`
///
/// Returns [`UNKNOWN_VENDEV`] for any malformed input.
pub fn decode_vendev(raw_vendor: &[u8], raw_device: &[u8]) -> String {
    match parse_vendev(raw_vendor, raw_device) {
        Some((vendor, device)) => format_vendev(vendor, device),
        None => UNKNOWN_VENDEV.to_string(),
    }
}

/// Render OS-reported decimal bus, device and function numbers as `bb:dd.f`
///
/// Returns [`UNKNOWN_BDF`] if any component is not a decimal number.
pub fn format_bdf(bus: &str, device: &str, function: &str) -> String {
    let parse = |s: &str| s.trim().parse::<u32>().ok();
    match (parse(bus), parse(device), parse(function)) {
        (Some(b), Some(d), Some(f)) => format!("{:02x}:{:02x}.{:x}", b, d, f),
        _ => UNKNOWN_BDF.to_string(),
    }
}

/// Normalize a raw debug location into a `bb:dd.f` locator
///
/// Two spellings are understood:
/// - ioreg `pcidebug`: `"0:2:0"`, optionally followed by `(...)`
/// - Windows location info: `PCI bus 0, device 2, function 0`
pub fn location_to_bdf(raw: &str) -> String {
    let raw = raw.trim().trim_matches('"');
    let raw = raw.split('(').next().unwrap_or(raw);

    if raw.contains(':') {
        let parts: Vec<&str> = raw.split(':').collect();
        if let [bus, device, function] = parts.as_slice() {
            return format_bdf(bus, device, function);
        }
        return UNKNOWN_BDF.to_string();
    }

    let mut bus = None;
    let mut device = None;
    let mut function = None;
    for part in raw.split(',') {
        let mut words = part.split_whitespace().rev();
        let (Some(value), Some(label)) = (words.next(), words.next()) else {
            continue;
        };
        match label.to_ascii_lowercase().as_str() {
            "bus" => bus = Some(value),
            "device" => device = Some(value),
            "function" => function = Some(value),
            _ => {}
        }
    }
    match (bus, device, function) {
        (Some(b), Some(d), Some(f)) => format_bdf(b, d, f),
        _ => UNKNOWN_BDF.to_string(),
    }
}

/// Pack base class, sub-class and programming interface into one 24-bit code
///
/// Returns `None` until all three bytes are known.
pub fn pack_class_code(base: Option<u8>, sub: Option<u8>, prog_if: Option<u8>) -> Option<u32> {
    Some(((base? as u32) << 16) | ((sub? as u32) << 8) | prog_if? as u32)
}

/// Clamp a value that must fit an 8-bit firmware field; overflow becomes 0
pub fn clamp_byte(value: u32) -> u32 {
    if value > 0xFF {
        0
    } else {
        value
    }
}
