//! String escaping and number formatting.

use crate::error::{Result, TetherError};
use bytes::BufMut;

const HEX: &[u8; 16] = b"0123456789abcdef";

fn is_safe(b: u8, escape_html: bool) -> bool {
    b >= 0x20 && b != b'"' && b != b'\\' && !(escape_html && matches!(b, b'<' | b'>' | b'&'))
}

/// Write `s` as a quoted JSON string.
///
/// Control characters become `\n`, `\r`, `\t` or `\u00XX`. With
/// `escape_html` set, `<`, `>` and `&` are written as `\u003c`, `\u003e`
/// and `\u0026`. U+2028 and U+2029 are always escaped because they end lines in
/// script source.
pub fn write_escaped<B: BufMut>(buf: &mut B, s: &str, escape_html: bool) {
    let bytes = s.as_bytes();
    buf.put_u8(b'"');
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b < 0x80 {
            if is_safe(b, escape_html) {
                i += 1;
                continue;
            }
            buf.put_slice(&bytes[start..i]);
            match b {
                b'\\' | b'"' => {
                    buf.put_u8(b'\\');
                    buf.put_u8(b);
                }
                b'\n' => buf.put_slice(b"\\n"),
                b'\r' => buf.put_slice(b"\\r"),
                b'\t' => buf.put_slice(b"\\t"),
                _ => {
                    buf.put_slice(b"\\u00");
                    buf.put_u8(HEX[(b >> 4) as usize]);
                    buf.put_u8(HEX[(b & 0x0f) as usize]);
                }
            }
            i += 1;
            start = i;
            continue;
        }
        // U+2028 and U+2029 are E2 80 A8 and E2 80 A9.
        if b == 0xe2 && i + 2 < bytes.len() && bytes[i + 1] == 0x80 && (bytes[i + 2] & !1) == 0xa8 {
            buf.put_slice(&bytes[start..i]);
            buf.put_slice(b"\\u202");
            buf.put_u8(HEX[(bytes[i + 2] & 0x0f) as usize]);
            i += 3;
            start = i;
            continue;
        }
        i += 1;
    }
    buf.put_slice(&bytes[start..]);
    buf.put_u8(b'"');
}

/// Precision a float was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatBits {
    F32,
    F64,
}

/// Format a float the way ECMAScript's `Number.prototype.toString` does.
///
/// Shortest round-trip digits, plain decimal inside `[1e-6, 1e21)`, exponent
/// form outside it with exponents like `e+21` and `e-7`. NaN and infinities
/// are rejected.
pub fn format_float(value: f64, bits: FloatBits) -> Result<String> {
    if !value.is_finite() {
        return Err(TetherError::UnsupportedValue {
            value: value.to_string(),
        });
    }
    let abs = value.abs();
    let exponent = abs != 0.0
        && match bits {
            FloatBits::F64 => !(1e-6..1e21).contains(&abs),
            FloatBits::F32 => !(1e-6f32..1e21f32).contains(&(abs as f32)),
        };

    let mut text = match (bits, exponent) {
        (FloatBits::F64, false) => format!("{}", value),
        (FloatBits::F64, true) => format!("{:e}", value),
        (FloatBits::F32, false) => format!("{}", value as f32),
        (FloatBits::F32, true) => format!("{:e}", value as f32),
    };
    if let Some(e) = text.find('e') {
        if !text[e + 1..].starts_with('-') {
            text.insert(e + 1, '+');
        }
    }
    Ok(text)
}
