// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Request Attribute Store
//!
//! Type-erased extension data attached to every request. Each value is held in
//! exactly one of two storage-agnostic shapes:
//!
//! | Shape | Used for |
//! |-------|----------|
//! | `Scalar(String)` | strings, booleans, integers, big integers (decimal), byte arrays and DER values (base64) |
//! | `Map(BTreeMap<String, String>)` | string arrays and vectors (keyed `"0"`, `"1"`, ...), string maps, authentication tokens, arrays of DER values or big integers |
//!
//! Typed access goes through the [`AttributeCodec`] trait so the lifecycle
//! engine and the repositories never need to know concrete value types.
//! The shape of a key is fixed by its first write: writing a map over a
//! scalar (or the reverse) fails instead of coercing.
//!
//! Typed getters return `None` both when a key is absent and when its stored
//! content cannot be decoded as the requested type.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements the generic attribute encode/decode contract

use base64::{engine::general_purpose::STANDARD, Engine as _};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::domain::auth_token::AuthToken;
use crate::domain::certificate::{
    CertificateExtensions, CertificateInfo, DerEncodable, X509Certificate,
};
use crate::domain::der::DerError;

// ============================================================================
// Values
// ============================================================================

/// A stored attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Scalar(String),
    Map(BTreeMap<String, String>),
}

impl AttributeValue {
    pub fn shape(&self) -> AttributeShape {
        match self {
            Self::Scalar(_) => AttributeShape::Scalar,
            Self::Map(_) => AttributeShape::Map,
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Scalar(_) => None,
            Self::Map(m) => Some(m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeShape {
    Scalar,
    Map,
}

impl fmt::Display for AttributeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Map => write!(f, "map"),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Write-side failures. Reads never fail; they return `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    #[error("Attribute key must not be empty")]
    InvalidKey,

    #[error("Attribute '{key}' has an empty map key")]
    InvalidMapKey { key: String },

    #[error("Attribute '{key}' holds a {existing} value and cannot be overwritten with a {attempted} value")]
    ShapeMismatch {
        key: String,
        existing: AttributeShape,
        attempted: AttributeShape,
    },
}

/// Reasons a stored value could not be read back as a given type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected a {expected} value, found a {found} value")]
    WrongShape {
        expected: AttributeShape,
        found: AttributeShape,
    },

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("invalid boolean: {0}")]
    InvalidBoolean(String),

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("invalid DER: {0}")]
    InvalidDer(#[from] DerError),

    #[error("array index {0} is missing")]
    MissingIndex(usize),
}

// ============================================================================
// Codec
// ============================================================================

/// Symmetric mapping between a typed value and its stored shape.
///
/// `T::decode(&value.encode())` must return a value equal to `value` for
/// every valid `value`, including empty collections and zero.
pub trait AttributeCodec: Sized {
    fn encode(&self) -> AttributeValue;
    fn decode(value: &AttributeValue) -> Result<Self, DecodeError>;
}

fn expect_scalar(value: &AttributeValue) -> Result<&str, DecodeError> {
    value.as_scalar().ok_or(DecodeError::WrongShape {
        expected: AttributeShape::Scalar,
        found: AttributeShape::Map,
    })
}

fn expect_map(value: &AttributeValue) -> Result<&BTreeMap<String, String>, DecodeError> {
    value.as_map().ok_or(DecodeError::WrongShape {
        expected: AttributeShape::Map,
        found: AttributeShape::Scalar,
    })
}

/// Arrays are stored as a map keyed by decimal index.
fn encode_indexed<I>(items: I) -> AttributeValue
where
    I: IntoIterator<Item = String>,
{
    AttributeValue::Map(
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), item))
            .collect(),
    )
}

/// Every index `0..len` must be present, which also rules out foreign keys.
fn decode_indexed(value: &AttributeValue) -> Result<Vec<&str>, DecodeError> {
    let map = expect_map(value)?;
    (0..map.len())
        .map(|index| {
            map.get(&index.to_string())
                .map(String::as_str)
                .ok_or(DecodeError::MissingIndex(index))
        })
        .collect()
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    STANDARD
        .decode(encoded)
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

fn decode_big_int(s: &str) -> Result<BigInt, DecodeError> {
    s.parse::<BigInt>()
        .map_err(|_| DecodeError::InvalidNumber(s.to_string()))
}

impl AttributeCodec for String {
    fn encode(&self) -> AttributeValue {
        AttributeValue::Scalar(self.clone())
    }

    fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
        expect_scalar(value).map(str::to_string)
    }
}

impl AttributeCodec for bool {
    fn encode(&self) -> AttributeValue {
        AttributeValue::Scalar(self.to_string())
    }

    fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
        match expect_scalar(value)? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(DecodeError::InvalidBoolean(other.to_string())),
        }
    }
}

macro_rules! impl_integer_codec {
    ($($ty:ty),*) => {
        $(
            impl AttributeCodec for $ty {
                fn encode(&self) -> AttributeValue {
                    AttributeValue::Scalar(self.to_string())
                }

                fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
                    let s = expect_scalar(value)?;
                    s.parse::<$ty>()
                        .map_err(|_| DecodeError::InvalidNumber(s.to_string()))
                }
            }
        )*
    };
}

impl_integer_codec!(i32, i64, u32, u64);

impl AttributeCodec for BigInt {
    fn encode(&self) -> AttributeValue {
        AttributeValue::Scalar(self.to_string())
    }

    fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
        decode_big_int(expect_scalar(value)?)
    }
}

impl AttributeCodec for Vec<BigInt> {
    fn encode(&self) -> AttributeValue {
        encode_indexed(self.iter().map(BigInt::to_string))
    }

    fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
        decode_indexed(value)?.into_iter().map(decode_big_int).collect()
    }
}

impl AttributeCodec for Vec<u8> {
    fn encode(&self) -> AttributeValue {
        AttributeValue::Scalar(STANDARD.encode(self))
    }

    fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
        decode_base64(expect_scalar(value)?)
    }
}

impl AttributeCodec for Vec<String> {
    fn encode(&self) -> AttributeValue {
        encode_indexed(self.iter().cloned())
    }

    fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
        Ok(decode_indexed(value)?
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}

impl AttributeCodec for BTreeMap<String, String> {
    fn encode(&self) -> AttributeValue {
        AttributeValue::Map(self.clone())
    }

    fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
        expect_map(value).cloned()
    }
}

impl AttributeCodec for AuthToken {
    fn encode(&self) -> AttributeValue {
        AttributeValue::Map(self.as_map().clone())
    }

    fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
        expect_map(value).map(|m| AuthToken::from(m.clone()))
    }
}

macro_rules! impl_der_codec {
    ($($ty:ty),*) => {
        $(
            impl AttributeCodec for $ty {
                fn encode(&self) -> AttributeValue {
                    AttributeValue::Scalar(STANDARD.encode(self.to_der()))
                }

                fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
                    let der = decode_base64(expect_scalar(value)?)?;
                    Ok(<$ty>::from_der(&der)?)
                }
            }
        )*
    };
}

impl_der_codec!(X509Certificate, CertificateInfo, CertificateExtensions);

macro_rules! impl_der_array_codec {
    ($($ty:ty),*) => {
        $(
            impl AttributeCodec for Vec<$ty> {
                fn encode(&self) -> AttributeValue {
                    encode_indexed(self.iter().map(|item| STANDARD.encode(item.to_der())))
                }

                fn decode(value: &AttributeValue) -> Result<Self, DecodeError> {
                    decode_indexed(value)?
                        .into_iter()
                        .map(|encoded| -> Result<$ty, DecodeError> {
                            let der = decode_base64(encoded)?;
                            Ok(<$ty>::from_der(&der)?)
                        })
                        .collect()
                }
            }
        )*
    };
}

impl_der_array_codec!(X509Certificate, CertificateInfo);

// ============================================================================
// Store
// ============================================================================

/// String-keyed attribute bag owned by a single request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeStore {
    values: BTreeMap<String, AttributeValue>,
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value, enforcing key validity and the per-key shape.
    pub fn put(&mut self, key: &str, value: AttributeValue) -> Result<(), AttributeError> {
        if key.is_empty() {
            return Err(AttributeError::InvalidKey);
        }
        if let AttributeValue::Map(map) = &value {
            if map.keys().any(String::is_empty) {
                return Err(AttributeError::InvalidMapKey { key: key.to_string() });
            }
        }
        if let Some(existing) = self.values.get(key) {
            if existing.shape() != value.shape() {
                return Err(AttributeError::ShapeMismatch {
                    key: key.to_string(),
                    existing: existing.shape(),
                    attempted: value.shape(),
                });
            }
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    /// Encode and store a typed value.
    pub fn set<T: AttributeCodec>(&mut self, key: &str, value: &T) -> Result<(), AttributeError> {
        self.put(key, value.encode())
    }

    /// Read a typed value; `None` when absent or undecodable.
    pub fn get_as<T: AttributeCodec>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?;
        match T::decode(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(key = %key, error = %e, "Attribute could not be decoded");
                None
            }
        }
    }

    pub fn set_string(&mut self, key: &str, value: impl Into<String>) -> Result<(), AttributeError> {
        self.put(key, AttributeValue::Scalar(value.into()))
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(AttributeValue::as_scalar)
    }

    pub fn get_map(&self, key: &str) -> Option<&BTreeMap<String, String>> {
        self.values.get(key).and_then(AttributeValue::as_map)
    }

    /// Set one entry of a map-shaped attribute, creating the map if needed.
    pub fn set_map_entry(
        &mut self,
        key: &str,
        map_key: &str,
        value: impl Into<String>,
    ) -> Result<(), AttributeError> {
        let mut map = match self.values.get(key) {
            Some(AttributeValue::Map(existing)) => existing.clone(),
            Some(AttributeValue::Scalar(_)) => {
                return Err(AttributeError::ShapeMismatch {
                    key: key.to_string(),
                    existing: AttributeShape::Scalar,
                    attempted: AttributeShape::Map,
                })
            }
            None => BTreeMap::new(),
        };
        map.insert(map_key.to_string(), value.into());
        self.put(key, AttributeValue::Map(map))
    }

    pub fn get_map_entry(&self, key: &str, map_key: &str) -> Option<&str> {
        self.get_map(key)?.get(map_key).map(String::as_str)
    }

    /// Remove a key entirely; a later write may choose a new shape.
    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
