// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interface
//!
//! Persistence contract for the `Request` aggregate, following the DDD
//! Repository pattern: the interface is defined in the domain layer and
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `RequestRepository` | `Request` | `InMemoryRequestRepository`, `DirectoryRequestRepository` |
//!
//! The lifecycle engine decides between `insert` and `update` using the
//! request's persistence sentinel; repositories never see a request twice
//! through `insert`.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::request::{Request, RequestId};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    Directory(DirectoryConfig),
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Base DN under which request entries are created, e.g. `ou=ca,ou=requests,o=aegis`
    pub base_dn: String,
}

/// Lazy enumeration of every request id in the queue, in ascending order.
pub type RequestIdStream = BoxStream<'static, RequestId>;

/// Repository interface for Request aggregates
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Allocate the next request id
    async fn new_request_id(&self) -> Result<RequestId, RepositoryError>;

    /// Read a request by id
    async fn read(&self, id: RequestId) -> Result<Option<Request>, RepositoryError>;

    /// Persist a request for the first time
    async fn insert(&self, request: &Request) -> Result<(), RepositoryError>;

    /// Overwrite a previously inserted request
    async fn update(&self, request: &Request) -> Result<(), RepositoryError>;

    /// Enumerate all stored ids. Each call starts a fresh enumeration.
    async fn raw_id_enumeration(&self) -> Result<RequestIdStream, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    /// Backend unreachable or refused the operation
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}
