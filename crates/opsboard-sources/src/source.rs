//! Metric source trait and the per-domain source registry.
//!
//! The trait is dyn-compatible so the poller, the connection handshake and
//! the REST layer can share one set of adapters and tests can inject fakes.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::join_all;
use opsboard_core::{Domain, Snapshot};

use crate::error::SourceResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// One external system producing snapshots for a single domain.
pub trait MetricSource: Send + Sync {
    /// Domain this source reports on.
    fn domain(&self) -> Domain;

    /// Take a fresh snapshot.
    fn fetch(&self) -> BoxFuture<'_, SourceResult<Snapshot>>;
}

/// Registered sources, at most one per domain.
#[derive(Clone, Default)]
pub struct SourceSet {
    sources: BTreeMap<Domain, Arc<dyn MetricSource>>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source, replacing any previous source for its domain.
    pub fn insert(&mut self, source: Arc<dyn MetricSource>) -> Option<Arc<dyn MetricSource>> {
        self.sources.insert(source.domain(), source)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.insert(source);
        self
    }

    pub fn get(&self, domain: Domain) -> Option<Arc<dyn MetricSource>> {
        self.sources.get(&domain).cloned()
    }

    /// Registered domains in handshake order.
    pub fn domains(&self) -> Vec<Domain> {
        self.sources.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Fetch every domain concurrently.
    ///
    /// Results are returned in domain order regardless of completion order.
    pub async fn fetch_all(&self) -> Vec<(Domain, SourceResult<Snapshot>)> {
        let futures = self.sources.iter().map(|(domain, source)| {
            let domain = *domain;
            let source = source.clone();
            async move { (domain, source.fetch().await) }
        });
        join_all(futures).await
    }
}

impl std::fmt::Debug for SourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSet")
            .field("domains", &self.domains())
            .finish()
    }
}
