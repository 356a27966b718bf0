// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! DER Framing
//!
//! Minimal DER tag/length/value framing used to validate certificate-shaped
//! attribute values before they enter or leave the attribute store. Only the
//! outer framing is checked; the inner ASN.1 structure is opaque to the core.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements DER framing validation for structured binary values

use thiserror::Error;

/// Universal SEQUENCE tag (constructed)
pub const TAG_SEQUENCE: u8 = 0x30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerError {
    #[error("DER value is empty")]
    Empty,

    #[error("DER value truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Unsupported DER tag 0x{0:02x}")]
    UnexpectedTag(u8),

    #[error("Indefinite or non-minimal DER length encoding")]
    InvalidLength,

    #[error("{0} trailing bytes after DER value")]
    TrailingBytes(usize),
}

/// A single tag/length/value element borrowed from a DER buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u8,
    /// Full encoding including header
    pub raw: &'a [u8],
    /// Content octets only
    pub content: &'a [u8],
}

/// Parse the first TLV in `input`, returning it and the unconsumed remainder.
pub fn read_tlv(input: &[u8]) -> Result<(Tlv<'_>, &[u8]), DerError> {
    let (&tag, rest) = input.split_first().ok_or(DerError::Empty)?;
    if tag & 0x1f == 0x1f {
        // High tag numbers never appear at the top level of X.509 structures.
        return Err(DerError::UnexpectedTag(tag));
    }

    let (&first, rest) = rest.split_first().ok_or(DerError::Truncated {
        needed: 2,
        available: input.len(),
    })?;

    let (length, rest) = if first & 0x80 == 0 {
        (first as usize, rest)
    } else {
        let count = (first & 0x7f) as usize;
        if count == 0 || count > std::mem::size_of::<usize>() {
            return Err(DerError::InvalidLength);
        }
        if rest.len() < count {
            return Err(DerError::Truncated {
                needed: count,
                available: rest.len(),
            });
        }
        let (len_bytes, rest) = rest.split_at(count);
        if len_bytes[0] == 0 {
            return Err(DerError::InvalidLength);
        }
        let length = len_bytes
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        if length < 0x80 {
            return Err(DerError::InvalidLength);
        }
        (length, rest)
    };

    if rest.len() < length {
        return Err(DerError::Truncated {
            needed: length,
            available: rest.len(),
        });
    }

    let header_len = input.len() - rest.len();
    let (content, remainder) = rest.split_at(length);
    let tlv = Tlv {
        tag,
        raw: &input[..header_len + length],
        content,
    };
    Ok((tlv, remainder))
}

/// Require `input` to be exactly one TLV carrying `expected_tag`.
pub fn expect_single(input: &[u8], expected_tag: u8) -> Result<Tlv<'_>, DerError> {
    let (tlv, rest) = read_tlv(input)?;
    if tlv.tag != expected_tag {
        return Err(DerError::UnexpectedTag(tlv.tag));
    }
    if !rest.is_empty() {
        return Err(DerError::TrailingBytes(rest.len()));
    }
    Ok(tlv)
}

/// Split the content octets of a constructed value into its child TLVs.
pub fn children(content: &[u8]) -> Result<Vec<Tlv<'_>>, DerError> {
    let mut out = Vec::new();
    let mut rest = content;
    while !rest.is_empty() {
        let (tlv, remainder) = read_tlv(rest)?;
        out.push(tlv);
        rest = remainder;
    }
    Ok(out)
}

/// Encode a definite length in minimal DER form.
pub fn encode_length(length: usize, out: &mut Vec<u8>) {
    if length < 0x80 {
        out.push(length as u8);
        return;
    }
    let bytes = length.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

/// Wrap already-encoded children in a SEQUENCE.
pub fn encode_sequence<'a>(children: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let body: Vec<u8> = children.into_iter().flatten().copied().collect();
    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(TAG_SEQUENCE);
    encode_length(body.len(), &mut out);
    out.extend_from_slice(&body);
    out
}
