//! Maps arbitrary branch names onto identifiers that are safe to use as
//! directory names and URL path segments.
//!
//! Names that are already safe pass through unchanged. Everything else is
//! rewritten and suffixed with a digest of the original name, so two distinct
//! branch names never share an identifier even when their rewritten forms
//! coincide. The output for a given input must never change: existing child
//! projects are stored under these identifiers.

use sha1::{Digest, Sha1};

/// Longest identifier ever produced.
pub const MAX_SAFE_LENGTH: usize = 32;
const MIN_HASH_LENGTH: usize = 6;
const MAX_HASH_LENGTH: usize = 12;

const DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

const RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Encode a branch name. Total and deterministic.
pub fn mangle(name: &str) -> String {
    if is_safe_verbatim(name) {
        return name.to_string();
    }

    let mut buf = String::with_capacity(name.len() + 16);
    for unit in name.encode_utf16() {
        if is_safe_unit(unit) && unit != u16::from(b'-') {
            buf.push(char::from(unit as u8));
        } else if is_separator(unit) {
            lead_digit(&mut buf);
            buf.push('-');
        } else if unit <= 0xff {
            lead_digit(&mut buf);
            push_hex(&mut buf, unit as u8);
        } else {
            lead_digit(&mut buf);
            push_hex(&mut buf, (unit >> 8) as u8);
            push_hex(&mut buf, (unit & 0xff) as u8);
        }
    }
    lead_digit(&mut buf);

    let digest = digest(name);
    if buf.len() + 1 + MIN_HASH_LENGTH <= MAX_SAFE_LENGTH {
        let hash_len = MAX_HASH_LENGTH.min(MAX_SAFE_LENGTH - buf.len() - 1);
        buf.push('.');
        buf.push_str(&digest[..hash_len]);
        return buf;
    }

    // Too long: keep both ends of the rewritten name and put the digest
    // between them.
    let prefix_len = (MAX_SAFE_LENGTH - MAX_HASH_LENGTH - 2) / 2;
    let suffix_len = MAX_SAFE_LENGTH - MAX_HASH_LENGTH - 2 - prefix_len;
    let mut out = String::with_capacity(MAX_SAFE_LENGTH);
    out.push_str(&buf[..prefix_len]);
    out.push('.');
    out.push_str(&digest[..MAX_HASH_LENGTH]);
    out.push('.');
    out.push_str(&buf[buf.len() - suffix_len..]);
    out
}

fn is_safe_verbatim(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_SAFE_LENGTH {
        return false;
    }
    if name.starts_with('-') || name.ends_with('.') {
        return false;
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return false;
    }
    let upper = name.to_ascii_uppercase();
    !RESERVED.contains(&upper.as_str())
}

fn is_safe_unit(unit: u16) -> bool {
    unit < 0x80 && {
        let c = unit as u8;
        c.is_ascii_alphanumeric() || c == b'-'
    }
}

fn is_separator(unit: u16) -> bool {
    matches!(
        unit,
        0x2f /* / */ | 0x20 /* space */ | 0x2e /* . */ | 0x5f /* _ */ | 0x2d /* - */
    )
}

/// The output never starts with a separator or an escape marker.
fn lead_digit(buf: &mut String) {
    if buf.is_empty() {
        buf.push('0');
    }
}

fn push_hex(buf: &mut String, byte: u8) {
    buf.push('_');
    buf.push_str(&format!("{byte:02x}"));
}

/// SHA-1 of the UTF-8 bytes packed five bits at a time, least significant
/// bits first. The trailing partial group is dropped.
fn digest(name: &str) -> String {
    let bytes = Sha1::digest(name.as_bytes());
    let mut out = String::with_capacity(32);
    let mut bits = 0u32;
    let mut data = 0u32;
    for &b in bytes.iter() {
        while bits >= 5 {
            out.push(char::from(DIGITS[(data & 0x1f) as usize]));
            bits -= 5;
            data >>= 5;
        }
        data |= u32::from(b) << bits;
        bits += 8;
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
