// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Directory attribute-name escaping
//!
//! Directory schemas only accept ASCII letters, digits and hyphens in
//! attribute names. Request attribute keys are arbitrary strings, so every
//! character outside that set is written as `--` followed by exactly four
//! lowercase hex digits, one escape per UTF-16 code unit. A hyphen stays
//! literal when the next character is alphanumeric or when it ends the key;
//! any other hyphen is escaped too, so `--` in an encoded name always starts
//! an escape.
//!
//! ```text
//! profileId        -> profileId
//! auth-token       -> auth-token
//! cert.subject     -> cert--002esubject
//! a--b             -> a--002d-b
//! ```

use thiserror::Error;

const ESCAPE_MARKER: &str = "--";
const HEX_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyCodecError {
    #[error("Unexpected character {ch:?} at offset {offset} in encoded key")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("Truncated escape sequence at offset {0}")]
    TruncatedEscape(usize),

    #[error("Invalid hex digits in escape sequence at offset {0}")]
    InvalidHex(usize),

    #[error("Escaped code units do not form valid UTF-16 before offset {0}")]
    InvalidUtf16(usize),
}

pub fn encode_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut encoded = String::with_capacity(key.len());

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_ascii_alphanumeric() {
            encoded.push(ch);
            continue;
        }

        if ch == '-' && chars.get(i + 1).is_none_or(|next| next.is_ascii_alphanumeric()) {
            encoded.push(ch);
            continue;
        }

        let mut units = [0u16; 2];
        for unit in ch.encode_utf16(&mut units) {
            encoded.push_str(ESCAPE_MARKER);
            encoded.push_str(&format!("{:04x}", unit));
        }
    }

    encoded
}

/// Reverse `encode_key`. Hex digits are accepted in either case.
pub fn decode_key(encoded: &str) -> Result<String, KeyCodecError> {
    if let Some((offset, ch)) = encoded
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '-'))
    {
        return Err(KeyCodecError::UnexpectedChar { ch, offset });
    }

    // ASCII only from here, byte offsets are char offsets.
    let bytes = encoded.as_bytes();
    let mut decoded = String::with_capacity(encoded.len());
    let mut units: Vec<u16> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if encoded[i..].starts_with(ESCAPE_MARKER) {
            let start = i + ESCAPE_MARKER.len();
            let hex = encoded
                .get(start..start + HEX_WIDTH)
                .ok_or(KeyCodecError::TruncatedEscape(i))?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(KeyCodecError::InvalidHex(i));
            }
            let unit = u16::from_str_radix(hex, 16).map_err(|_| KeyCodecError::InvalidHex(i))?;
            units.push(unit);
            i = start + HEX_WIDTH;
            continue;
        }

        flush_units(&mut units, &mut decoded, i)?;
        decoded.push(char::from(bytes[i]));
        i += 1;
    }

    flush_units(&mut units, &mut decoded, i)?;
    Ok(decoded)
}

fn flush_units(units: &mut Vec<u16>, decoded: &mut String, offset: usize) -> Result<(), KeyCodecError> {
    if units.is_empty() {
        return Ok(());
    }
    let text = String::from_utf16(units).map_err(|_| KeyCodecError::InvalidUtf16(offset))?;
    decoded.push_str(&text);
    units.clear();
    Ok(())
}
