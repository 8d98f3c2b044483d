//! Console rendering of received datagrams

use std::fmt::Write;
use std::net::{IpAddr, Ipv4Addr};

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Label used for datagrams that originated on this host
pub const SELF_LABEL: &str = "You";

/// Render bytes as `0xHH ` groups (uppercase, each followed by a space)
pub fn to_hex_display(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 5);
    for &b in bytes {
        out.push_str("0x");
        out.push(HEX_DIGITS[(b >> 4) as usize] as char);
        out.push(HEX_DIGITS[(b & 0x0F) as usize] as char);
        out.push(' ');
    }
    out
}

/// Inverse of [`to_hex_display`]. Returns `None` on any malformed group.
pub fn parse_hex_display(text: &str) -> Option<Vec<u8>> {
    text.split_whitespace()
        .map(|group| {
            let digits = group.strip_prefix("0x")?;
            if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            u8::from_str_radix(digits, 16).ok()
        })
        .collect()
}

/// Decode a payload as text, dropping surrounding whitespace and control bytes
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c <= ' ' || c.is_whitespace())
        .to_string()
}

/// "You" for our own datagrams, the numeric sender address otherwise
pub fn origin_label(source: IpAddr, local: Ipv4Addr) -> String {
    match source {
        IpAddr::V4(v4) if v4 == local => SELF_LABEL.to_string(),
        other => other.to_string(),
    }
}

/// Format one received datagram as a console line: `[<label>] <data>\n`
pub fn format_datagram(payload: &[u8], source: IpAddr, local: Ipv4Addr, hex: bool) -> String {
    let data = if hex {
        to_hex_display(payload)
    } else {
        decode_text(payload)
    };

    let mut line = String::with_capacity(data.len() + 24);
    let _ = writeln!(line, "[{}] {}", origin_label(source, local), data);
    line
}
