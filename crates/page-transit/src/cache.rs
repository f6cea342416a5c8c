//! Page cache: previously fetched pages keyed by normalized URL.
//!
//! One cache belongs to one engine instance. Only the fetcher writes to it;
//! everything else gets a read-only view. Entries live as long as the engine.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::PageData;

/// In-memory page store.
#[derive(Debug, Default)]
pub struct PageCache {
    pages: RwLock<HashMap<String, Arc<PageData>>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a page is cached under this normalized URL.
    pub fn has(&self, url: &str) -> bool {
        self.read().contains_key(url)
    }

    /// The cached page for this normalized URL.
    pub fn get(&self, url: &str) -> Option<Arc<PageData>> {
        self.read().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All cached URLs, sorted.
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.read().keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Store a page under its own URL.
    pub(crate) fn insert(&self, page: Arc<PageData>) {
        tracing::debug!("caching page {}", page.url);
        self.write().insert(page.url.clone(), page);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<PageData>>> {
        self.pages.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<PageData>>> {
        self.pages
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
