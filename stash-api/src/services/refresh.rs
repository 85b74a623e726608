//! Full Cache Refresh
//!
//! Walks the whole catalog and populates every (object, type) pair that has
//! no cache entry yet. Per-item failures are logged and counted; a catalog
//! failure aborts the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_core::{Catalog, CatalogPage, ObjectKey, StashResult};
use std::sync::Arc;

use super::resolver::CacheResolver;

/// Summary of one refresh run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Catalog pages read
    pub pages: u32,
    /// (object, type) pairs examined
    pub checked: u64,
    /// Pairs that already had an entry
    pub already_cached: u64,
    /// Pairs that got a new entry
    pub populated: u64,
    /// Pairs that could not be populated
    pub failed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RefreshReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            pages: 0,
            checked: 0,
            already_cached: 0,
            populated: 0,
            failed: 0,
            started_at: now,
            finished_at: now,
        }
    }
}

/// Populates every catalog object that is missing from the cache.
#[derive(Clone)]
pub struct CacheRefresher {
    catalog: Arc<dyn Catalog>,
    resolver: CacheResolver,
    page_size: u32,
}

impl CacheRefresher {
    pub fn new(catalog: Arc<dyn Catalog>, resolver: CacheResolver, page_size: u32) -> Self {
        Self {
            catalog,
            resolver,
            page_size: page_size.max(1),
        }
    }

    /// Run a full refresh. Page 1 tells how many pages there are.
    pub async fn refresh_all(&self) -> StashResult<RefreshReport> {
        let mut report = RefreshReport::start();
        tracing::info!(page_size = self.page_size, "Cache refresh started");

        let first = self.catalog.page(1, self.page_size).await?;
        let pages = first.pages;
        self.process_page(first, &mut report).await;

        for page in 2..=pages {
            let next = self.catalog.page(page, self.page_size).await?;
            self.process_page(next, &mut report).await;
        }

        report.finished_at = Utc::now();
        tracing::info!(
            pages = report.pages,
            checked = report.checked,
            already_cached = report.already_cached,
            populated = report.populated,
            failed = report.failed,
            "Cache refresh finished"
        );
        Ok(report)
    }

    async fn process_page(&self, page: CatalogPage, report: &mut RefreshReport) {
        report.pages += 1;
        tracing::debug!(page = page.page, items = page.items.len(), "Refreshing catalog page");

        for item in page.items {
            for object_type in item.available_types {
                let key = ObjectKey::new(item.id, object_type);
                report.checked += 1;
                self.refresh_one(&key, report).await;
            }
        }
    }

    async fn refresh_one(&self, key: &ObjectKey, report: &mut RefreshReport) {
        match self.resolver.store().get(key).await {
            Ok(Some(_)) => {
                report.already_cached += 1;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache lookup failed during refresh");
                report.failed += 1;
                return;
            }
        }

        match self.resolver.resolve(key).await {
            Ok(Some(_)) => report.populated += 1,
            Ok(None) => {
                tracing::debug!(key = %key, "Nothing produced during refresh");
                report.failed += 1;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Populate failed during refresh");
                report.failed += 1;
            }
        }
    }
}
