// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Request listing helpers
//!
//! Thin iteration over the repository's raw id enumeration. Every query
//! starts a fresh enumeration and reads requests one at a time, so ids that
//! disappear mid-scan are skipped and statuses are as of the read.

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::repository::{RepositoryError, RequestRepository};
use crate::domain::request::{Request, RequestId, RequestStatus};

pub type RequestStream = BoxStream<'static, Result<Request, RepositoryError>>;

/// One page of a status listing
#[derive(Debug, Clone)]
pub struct RequestPage {
    pub requests: Vec<Request>,
    /// Pass as `after` to fetch the following page; `None` on the last page
    pub next_after: Option<RequestId>,
}

#[derive(Clone)]
pub struct RequestListing {
    repository: Arc<dyn RequestRepository>,
}

impl RequestListing {
    pub fn new(repository: Arc<dyn RequestRepository>) -> Self {
        Self { repository }
    }

    /// Every stored request, in id order
    pub async fn all_requests(&self) -> Result<RequestStream, RepositoryError> {
        let ids = self.repository.raw_id_enumeration().await?;
        let repository = Arc::clone(&self.repository);

        Ok(ids
            .then(move |id| {
                let repository = Arc::clone(&repository);
                async move { repository.read(id).await }
            })
            .filter_map(|read| async move { read.transpose() })
            .boxed())
    }

    /// Lazily yield the requests currently in `status`
    pub async fn requests_with_status(&self, status: RequestStatus) -> Result<RequestStream, RepositoryError> {
        Ok(self
            .all_requests()
            .await?
            .try_filter(move |request| futures::future::ready(request.status() == status))
            .boxed())
    }

    pub async fn ids_with_status(&self, status: RequestStatus) -> Result<Vec<RequestId>, RepositoryError> {
        self.requests_with_status(status)
            .await?
            .map_ok(|request| request.id())
            .try_collect()
            .await
    }

    /// Number of requests per status; statuses with no requests are omitted
    pub async fn count_by_status(&self) -> Result<BTreeMap<RequestStatus, usize>, RepositoryError> {
        self.all_requests()
            .await?
            .try_fold(BTreeMap::new(), |mut counts, request| async move {
                *counts.entry(request.status()).or_insert(0) += 1;
                Ok(counts)
            })
            .await
    }

    /// First request carrying the remote authority's `source_id`
    pub async fn find_by_source_id(&self, source_id: &str) -> Result<Option<Request>, RepositoryError> {
        let source_id = source_id.to_string();
        let mut matches = self
            .all_requests()
            .await?
            .try_filter(move |request| futures::future::ready(request.source_id() == Some(source_id.as_str())));
        matches.try_next().await
    }

    /// Up to `limit` requests in `status` with ids greater than `after`.
    ///
    /// `limit` must be at least one.
    pub async fn page(
        &self,
        status: RequestStatus,
        after: Option<RequestId>,
        limit: usize,
    ) -> Result<RequestPage, RepositoryError> {
        if limit == 0 {
            return Err(RepositoryError::InvalidQuery(
                "page limit must be at least 1".to_string(),
            ));
        }

        let mut requests: Vec<Request> = self
            .requests_with_status(status)
            .await?
            .try_filter(move |request| futures::future::ready(after.is_none_or(|after| request.id() > after)))
            .take(limit.saturating_add(1))
            .try_collect()
            .await?;

        let next_after = if requests.len() > limit {
            requests.truncate(limit);
            requests.last().map(Request::id)
        } else {
            None
        };

        Ok(RequestPage { requests, next_after })
    }
}
