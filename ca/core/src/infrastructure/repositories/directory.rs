// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Directory-shaped request repository
//!
//! Each request is one entry `cn=<id>,<base_dn>` with object classes `top`,
//! `request` and `extensibleObject`. Core fields map to fixed attribute
//! names; every attribute-store key becomes one or more `ext-` attributes:
//!
//! ```text
//! scalar  profileId = caUserCert      -> ext-profileId: caUserCert
//! map     agentApprovals = {0: alice} -> ext-agentApprovals;0: alice
//! ```
//!
//! Keys and map keys are escaped with [`encode_key`], so the `;` separating
//! a key from its map key can never appear inside either. Maps without
//! entries have no directory representation and are not stored.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::key_codec::{decode_key, encode_key};
use crate::domain::attributes::{AttributeStore, AttributeValue};
use crate::domain::repository::{
    DirectoryConfig, RepositoryError, RequestIdStream, RequestRepository,
};
use crate::domain::request::{Request, RequestId, RequestRecord, RequestStatus};

pub const OBJECT_CLASSES: [&str; 3] = ["top", "request", "extensibleObject"];

const REQUEST_OBJECT_CLASS: &str = "request";
const EXT_PREFIX: &str = "ext-";
const MAP_SEPARATOR: char = ';';
const GENERALIZED_TIME: &str = "%Y%m%d%H%M%S%.9fZ";
const GENERALIZED_TIME_PARSE: &str = "%Y%m%d%H%M%S%.fZ";

const ATTR_REQUEST_ID: &str = "requestId";
const ATTR_STATE: &str = "requestState";
const ATTR_TYPE: &str = "requestType";
const ATTR_SOURCE_ID: &str = "requestSourceId";
const ATTR_OWNER: &str = "requestOwner";
const ATTR_CONTEXT: &str = "requestContext";
const ATTR_CREATED: &str = "dateOfCreate";
const ATTR_MODIFIED: &str = "dateOfModify";

/// A single directory entry as written to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub object_classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

impl DirectoryEntry {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn required(&self, name: &str) -> Result<&str, RepositoryError> {
        self.attribute(name).ok_or_else(|| {
            RepositoryError::Serialization(format!("{}: missing attribute {}", self.dn, name))
        })
    }
}

// ============================================================================
// Mapping
// ============================================================================

pub fn request_dn(id: RequestId, base_dn: &str) -> String {
    format!("cn={},{}", id, base_dn)
}

/// Map a request onto its directory entry
pub fn request_to_entry(request: &Request, base_dn: &str) -> DirectoryEntry {
    let mut attributes = BTreeMap::new();
    attributes.insert(ATTR_REQUEST_ID.to_string(), request.id().to_string());
    attributes.insert(ATTR_STATE.to_string(), request.status().as_str().to_string());
    attributes.insert(ATTR_TYPE.to_string(), request.request_type().to_string());
    attributes.insert(ATTR_CREATED.to_string(), format_time(request.created_at()));
    attributes.insert(ATTR_MODIFIED.to_string(), format_time(request.modified_at()));
    if let Some(source_id) = request.source_id() {
        attributes.insert(ATTR_SOURCE_ID.to_string(), source_id.to_string());
    }
    if let Some(owner) = request.owner() {
        attributes.insert(ATTR_OWNER.to_string(), owner.to_string());
    }
    if let Some(context) = request.context() {
        attributes.insert(ATTR_CONTEXT.to_string(), context.to_string());
    }

    for (key, value) in request.attributes().iter() {
        let name = format!("{}{}", EXT_PREFIX, encode_key(key));
        match value {
            AttributeValue::Scalar(s) => {
                attributes.insert(name, s.clone());
            }
            AttributeValue::Map(map) if map.is_empty() => {
                // Bare `ext-<key>;` keeps the map shape with no entries
                attributes.insert(format!("{}{}", name, MAP_SEPARATOR), String::new());
            }
            AttributeValue::Map(map) => {
                for (map_key, v) in map {
                    attributes.insert(
                        format!("{}{}{}", name, MAP_SEPARATOR, encode_key(map_key)),
                        v.clone(),
                    );
                }
            }
        }
    }

    DirectoryEntry {
        dn: request_dn(request.id(), base_dn),
        object_classes: OBJECT_CLASSES.iter().map(|c| c.to_string()).collect(),
        attributes,
    }
}

/// Rebuild a request from its directory entry
pub fn entry_to_request(entry: &DirectoryEntry) -> Result<Request, RepositoryError> {
    if !entry.object_classes.iter().any(|c| c == REQUEST_OBJECT_CLASS) {
        return Err(RepositoryError::Serialization(format!(
            "{}: not a request entry",
            entry.dn
        )));
    }

    let id: RequestId = entry
        .required(ATTR_REQUEST_ID)?
        .parse()
        .map_err(|e| RepositoryError::Serialization(format!("{}: bad request id: {}", entry.dn, e)))?;
    let status: RequestStatus = entry
        .required(ATTR_STATE)?
        .parse()
        .map_err(|e| RepositoryError::Serialization(format!("{}: {}", entry.dn, e)))?;

    let mut attributes = AttributeStore::new();
    for (name, value) in &entry.attributes {
        let Some(encoded) = name.strip_prefix(EXT_PREFIX) else {
            continue;
        };
        let result = match encoded.split_once(MAP_SEPARATOR) {
            Some((key, "")) => {
                let key = decode_key(key).map_err(|e| bad_attribute(entry, name, e))?;
                if attributes.contains_key(&key) {
                    Ok(())
                } else {
                    attributes.put(&key, AttributeValue::Map(BTreeMap::new()))
                }
            }
            Some((key, map_key)) => {
                let key = decode_key(key).map_err(|e| bad_attribute(entry, name, e))?;
                let map_key = decode_key(map_key).map_err(|e| bad_attribute(entry, name, e))?;
                attributes.set_map_entry(&key, &map_key, value.clone())
            }
            None => {
                let key = decode_key(encoded).map_err(|e| bad_attribute(entry, name, e))?;
                attributes.set_string(&key, value.clone())
            }
        };
        result.map_err(|e| bad_attribute(entry, name, e))?;
    }

    Ok(Request::restore(RequestRecord {
        id,
        status,
        request_type: entry.required(ATTR_TYPE)?.to_string(),
        source_id: entry.attribute(ATTR_SOURCE_ID).map(str::to_string),
        owner: entry.attribute(ATTR_OWNER).map(str::to_string),
        created_at: parse_time(entry, ATTR_CREATED)?,
        modified_at: parse_time(entry, ATTR_MODIFIED)?,
        context: entry.attribute(ATTR_CONTEXT).map(str::to_string),
        attributes,
    }))
}

fn bad_attribute(entry: &DirectoryEntry, name: &str, error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Serialization(format!("{}: attribute {}: {}", entry.dn, name, error))
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format(GENERALIZED_TIME).to_string()
}

fn parse_time(entry: &DirectoryEntry, name: &str) -> Result<DateTime<Utc>, RepositoryError> {
    let raw = entry.required(name)?;
    NaiveDateTime::parse_from_str(raw, GENERALIZED_TIME_PARSE)
        .map(|t| t.and_utc())
        .map_err(|e| RepositoryError::Serialization(format!("{}: {}: {}", entry.dn, name, e)))
}

// ============================================================================
// Repository
// ============================================================================

/// Request repository over an in-process directory tree
#[derive(Clone)]
pub struct DirectoryRequestRepository {
    config: DirectoryConfig,
    entries: Arc<RwLock<BTreeMap<RequestId, DirectoryEntry>>>,
    next_serial: Arc<AtomicU64>,
}

impl DirectoryRequestRepository {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            config,
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            next_serial: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn base_dn(&self) -> &str {
        &self.config.base_dn
    }

    /// Raw entry as stored, for inspection
    pub fn entry(&self, id: RequestId) -> Option<DirectoryEntry> {
        self.entries.read().get(&id).cloned()
    }

    /// Store a raw entry, as an external directory client would
    pub fn put_entry(&self, id: RequestId, entry: DirectoryEntry) {
        self.entries.write().insert(id, entry);
    }
}

#[async_trait]
impl RequestRepository for DirectoryRequestRepository {
    async fn new_request_id(&self) -> Result<RequestId, RepositoryError> {
        Ok(RequestId(self.next_serial.fetch_add(1, Ordering::SeqCst)))
    }

    async fn read(&self, id: RequestId) -> Result<Option<Request>, RepositoryError> {
        let entry = self.entries.read().get(&id).cloned();
        entry.as_ref().map(entry_to_request).transpose()
    }

    async fn insert(&self, request: &Request) -> Result<(), RepositoryError> {
        let entry = request_to_entry(request, &self.config.base_dn);
        let mut entries = self.entries.write();
        if entries.contains_key(&request.id()) {
            return Err(RepositoryError::AlreadyExists(entry.dn));
        }
        debug!(dn = %entry.dn, attributes = entry.attributes.len(), "Adding request entry");
        entries.insert(request.id(), entry);
        Ok(())
    }

    async fn update(&self, request: &Request) -> Result<(), RepositoryError> {
        let entry = request_to_entry(request, &self.config.base_dn);
        let mut entries = self.entries.write();
        match entries.get_mut(&request.id()) {
            Some(stored) => {
                debug!(dn = %entry.dn, "Replacing request entry");
                *stored = entry;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(entry.dn)),
        }
    }

    async fn raw_id_enumeration(&self) -> Result<RequestIdStream, RepositoryError> {
        let ids: Vec<RequestId> = self.entries.read().keys().copied().collect();
        Ok(stream::iter(ids).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth_token::AuthToken;
    use crate::domain::request::keys;

    const BASE_DN: &str = "ou=ca,ou=requests,o=aegis";

    fn repository() -> DirectoryRequestRepository {
        DirectoryRequestRepository::new(DirectoryConfig {
            base_dn: BASE_DN.to_string(),
        })
    }

    fn sample_request(id: u64) -> Request {
        let mut request = Request::new(RequestId(id), "enrollment").unwrap();
        request.set_source_id("ra-0042");
        request.set_context("web enrollment");
        request.set_owner("agent-alice");
        let attrs = request.attributes_mut();
        attrs.set_string("profileId", "caUserCert").unwrap();
        attrs.set_string("cert.subject", "CN=alice").unwrap();
        attrs.set_map_entry("auth-token", "uid", "alice").unwrap();
        attrs.set_map_entry("auth-token", "user dn", "uid=alice,o=aegis").unwrap();
        attrs
            .set(keys::AGENT_APPROVALS, &vec!["agent-bob".to_string()])
            .unwrap();
        request
    }

    #[test]
    fn test_entry_layout() {
        let entry = request_to_entry(&sample_request(12), BASE_DN);

        assert_eq!(entry.dn, "cn=12,ou=ca,ou=requests,o=aegis");
        assert_eq!(entry.object_classes, vec!["top", "request", "extensibleObject"]);
        assert_eq!(entry.attribute("requestState"), Some("begin"));
        assert_eq!(entry.attribute("requestSourceId"), Some("ra-0042"));
        assert_eq!(entry.attribute("ext-profileId"), Some("caUserCert"));
        assert_eq!(entry.attribute("ext-cert--002esubject"), Some("CN=alice"));
        assert_eq!(entry.attribute("ext-auth-token;uid"), Some("alice"));
        assert_eq!(
            entry.attribute("ext-auth-token;user--0020dn"),
            Some("uid=alice,o=aegis")
        );
        assert_eq!(entry.attribute("ext-agentApprovals;0"), Some("agent-bob"));
    }

    #[test]
    fn test_entry_roundtrip() {
        let request = sample_request(3);
        let entry = request_to_entry(&request, BASE_DN);
        let restored = entry_to_request(&entry).unwrap();
        assert_eq!(restored, request);
    }

    #[test]
    fn test_entry_without_request_class_rejected() {
        let mut entry = request_to_entry(&sample_request(4), BASE_DN);
        entry.object_classes.retain(|c| c != "request");
        assert!(matches!(
            entry_to_request(&entry),
            Err(RepositoryError::Serialization(_))
        ));
    }

    #[test]
    fn test_entry_with_malformed_ext_name_rejected() {
        let mut entry = request_to_entry(&sample_request(5), BASE_DN);
        entry
            .attributes
            .insert("ext-broken--00".to_string(), "x".to_string());
        assert!(matches!(
            entry_to_request(&entry),
            Err(RepositoryError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_maps_survive_storage() {
        let repo = repository();
        let id = repo.new_request_id().await.unwrap();
        let mut request = Request::new(id, "enrollment").unwrap();
        request.attributes_mut().set("authToken", &AuthToken::new()).unwrap();
        request
            .attributes_mut()
            .set(keys::AGENT_APPROVALS, &Vec::<String>::new())
            .unwrap();
        request.set_issued_certificates(&[]).unwrap();

        repo.insert(&request).await.unwrap();
        let entry = repo.entry(id).unwrap();
        assert_eq!(entry.attribute("ext-authToken;"), Some(""));
        assert_eq!(entry.attribute("ext-issuedCerts;"), Some(""));

        let mut stored = repo.read(id).await.unwrap().unwrap();
        assert_eq!(stored, request);
        assert_eq!(stored.attributes().get_as::<AuthToken>("authToken"), Some(AuthToken::new()));
        assert!(stored.issued_certificates().is_empty());
        assert!(stored.attributes().get_map(keys::ISSUED_CERTS).is_some());

        // The shape commitment is still in force after the read
        assert!(stored.attributes_mut().set_string("authToken", "x").is_err());
    }

    #[tokio::test]
    async fn test_repository_insert_read_update() {
        let repo = repository();
        let id = repo.new_request_id().await.unwrap();
        let mut request = sample_request(id.0);

        repo.insert(&request).await.unwrap();
        assert_eq!(repo.read(id).await.unwrap(), Some(request.clone()));

        request
            .attributes_mut()
            .set_string(keys::REMOTE_REQUEST_ID, "remote-9")
            .unwrap();
        repo.update(&request).await.unwrap();

        let stored = repo.read(id).await.unwrap().unwrap();
        assert_eq!(stored.remote_request_id(), Some("remote-9"));
        assert_eq!(
            repo.entry(id).unwrap().attribute("ext-remoteReqID"),
            Some("remote-9")
        );
    }

    #[tokio::test]
    async fn test_update_missing_entry_fails() {
        let repo = repository();
        let request = sample_request(77);
        assert!(matches!(
            repo.update(&request).await,
            Err(RepositoryError::NotFound(dn)) if dn == "cn=77,ou=ca,ou=requests,o=aegis"
        ));
    }
}
