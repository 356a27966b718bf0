// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the `RequestRepository` port defined in
//! the domain layer, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve request aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemoryRequestRepository** - map-backed storage for tests and
//!   single-process deployments
//! - **DirectoryRequestRepository** - stores each request as a directory
//!   entry, attribute keys escaped with [`key_codec`]
//!
//! Use [`build_request_repository`] to pick one from a `StorageBackend`.

pub mod directory;
pub mod key_codec;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::repository::{
    RepositoryError, RequestIdStream, RequestRepository, StorageBackend,
};
use crate::domain::request::{Request, RequestId};

pub use directory::DirectoryRequestRepository;

/// Build the repository selected by `backend`
pub fn build_request_repository(backend: &StorageBackend) -> Arc<dyn RequestRepository> {
    match backend {
        StorageBackend::InMemory => Arc::new(InMemoryRequestRepository::new()),
        StorageBackend::Directory(config) => Arc::new(DirectoryRequestRepository::new(config.clone())),
    }
}

#[derive(Clone)]
pub struct InMemoryRequestRepository {
    requests: Arc<RwLock<BTreeMap<RequestId, Request>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryRequestRepository {
    pub fn new() -> Self {
        Self::with_first_id(1)
    }

    /// Start id allocation at `first_id`
    pub fn with_first_id(first_id: u64) -> Self {
        Self {
            requests: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: Arc::new(AtomicU64::new(first_id)),
        }
    }

    pub fn len(&self) -> usize {
        self.requests.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.read().is_empty()
    }
}

impl Default for InMemoryRequestRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn new_request_id(&self) -> Result<RequestId, RepositoryError> {
        Ok(RequestId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn read(&self, id: RequestId) -> Result<Option<Request>, RepositoryError> {
        Ok(self.requests.read().get(&id).cloned())
    }

    async fn insert(&self, request: &Request) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write();
        if requests.contains_key(&request.id()) {
            return Err(RepositoryError::AlreadyExists(request.id().to_string()));
        }
        requests.insert(request.id(), request.clone());
        Ok(())
    }

    async fn update(&self, request: &Request) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write();
        match requests.get_mut(&request.id()) {
            Some(stored) => {
                *stored = request.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(request.id().to_string())),
        }
    }

    async fn raw_id_enumeration(&self) -> Result<RequestIdStream, RepositoryError> {
        // Snapshot so the stream does not hold the lock across awaits
        let ids: Vec<RequestId> = self.requests.read().keys().copied().collect();
        Ok(stream::iter(ids).boxed())
    }
}
