//! Hex formatting and parsing for node addresses.
//!
//! Addresses show up in log fields, store keys and every persisted record, so
//! formatting goes through a reused thread-local buffer instead of allocating
//! a fresh `String` per byte.

use std::{cell::RefCell, fmt::Write};

thread_local! {
    static HEX_BUFFER: RefCell<String> = RefCell::new(String::with_capacity(64));
}

/// Formats a 20-byte address as lowercase hex with a "0x" prefix and hands the
/// borrowed string to `f`.
pub fn with_address<T, F>(address: &[u8; 20], f: F) -> T
where
    F: FnOnce(&str) -> T,
{
    HEX_BUFFER.with(|buffer| {
        let mut buf = buffer.borrow_mut();
        buf.clear();
        buf.push_str("0x");
        for byte in address {
            let _ = write!(&mut buf, "{byte:02x}");
        }
        f(&buf)
    })
}

/// Owned variant of [`with_address`].
#[must_use]
pub fn format_address(address: &[u8; 20]) -> String {
    with_address(address, str::to_owned)
}

/// Parses a hex string into a fixed-size byte array.
///
/// The "0x" prefix is optional and digits are case-insensitive. Returns `None`
/// on a length mismatch or a non-hex character.
#[must_use]
pub fn parse_hex_array<const N: usize>(hex: &str) -> Option<[u8; N]> {
    let digits = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")).unwrap_or(hex);
    if digits.len() != N * 2 {
        return None;
    }

    let mut array = [0u8; N];
    for (slot, pair) in array.iter_mut().zip(digits.as_bytes().chunks_exact(2)) {
        *slot = (hex_digit(pair[0])? << 4) | hex_digit(pair[1])?;
    }
    Some(array)
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
