// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

use crate::domain::der::{self, DerError, TAG_SEQUENCE};

/// Structured binary values that travel through the attribute store as DER.
///
/// The request core never interprets certificate contents; it only needs a
/// canonical byte form that can be validated on the way back in.
pub trait DerEncodable: Sized {
    fn to_der(&self) -> Vec<u8>;
    fn from_der(der: &[u8]) -> Result<Self, DerError>;
}

/// Signed X.509 certificate (`Certificate ::= SEQUENCE { tbs, alg, sig }`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X509Certificate {
    der: Vec<u8>,
}

impl X509Certificate {
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
}

impl DerEncodable for X509Certificate {
    fn to_der(&self) -> Vec<u8> {
        self.der.clone()
    }

    fn from_der(der: &[u8]) -> Result<Self, DerError> {
        der::expect_single(der, TAG_SEQUENCE)?;
        Ok(Self { der: der.to_vec() })
    }
}

/// Unsigned certificate body (`TBSCertificate`) as assembled by enrollment
/// profiles before the signing step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateInfo {
    der: Vec<u8>,
}

impl CertificateInfo {
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
}

impl DerEncodable for CertificateInfo {
    fn to_der(&self) -> Vec<u8> {
        self.der.clone()
    }

    fn from_der(der: &[u8]) -> Result<Self, DerError> {
        der::expect_single(der, TAG_SEQUENCE)?;
        Ok(Self { der: der.to_vec() })
    }
}

/// `Extensions ::= SEQUENCE OF Extension`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateExtensions {
    entries: Vec<Vec<u8>>,
}

impl CertificateExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one DER-encoded `Extension` (itself a SEQUENCE).
    pub fn push(&mut self, extension_der: &[u8]) -> Result<(), DerError> {
        der::expect_single(extension_der, TAG_SEQUENCE)?;
        self.entries.push(extension_der.to_vec());
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DerEncodable for CertificateExtensions {
    fn to_der(&self) -> Vec<u8> {
        der::encode_sequence(self.entries())
    }

    fn from_der(der: &[u8]) -> Result<Self, DerError> {
        let outer = der::expect_single(der, TAG_SEQUENCE)?;
        let mut extensions = Self::new();
        for child in der::children(outer.content)? {
            if child.tag != TAG_SEQUENCE {
                return Err(DerError::UnexpectedTag(child.tag));
            }
            extensions.entries.push(child.raw.to_vec());
        }
        Ok(extensions)
    }
}
