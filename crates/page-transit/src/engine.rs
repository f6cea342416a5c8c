//! The transition engine: one live document, its cache, hooks and events.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use crate::cache::PageCache;
use crate::config::TransitConfig;
use crate::dom::Document;
use crate::events::{EventName, EventTrigger, HandlerId, OriginalEvent};
use crate::fetch::{FetchOptions, PageFetcher};
use crate::hooks::{ContentReplace, ContentReplaceArgs, FetchFailed, HookRegistry, PageLoad};
use crate::replace::{self, ReplaceReport};
use crate::types::{PageData, TransitResult};

/// Result of [`Transit::navigate`].
#[derive(Debug, Clone)]
pub struct NavigationOutcome {
    pub page: Arc<PageData>,
    /// Whether every container was swapped.
    pub replaced: bool,
}

/// A page-transition engine bound to one live document.
///
/// Engines share nothing: each owns its cache, hook registry and event
/// trigger. The engine is single-threaded and not `Send`.
pub struct Transit {
    config: TransitConfig,
    client: reqwest::Client,
    cache: PageCache,
    hooks: HookRegistry,
    events: Arc<EventTrigger>,
    document: Rc<RefCell<Document>>,
}

impl Transit {
    /// Create an engine with a default HTTP client.
    pub fn new(config: TransitConfig, document: Document) -> TransitResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("page-transit/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Self::with_client(config, document, client)
    }

    /// Create an engine that sends requests through `client`.
    pub fn with_client(
        config: TransitConfig,
        document: Document,
        client: reqwest::Client,
    ) -> TransitResult<Self> {
        let events = Arc::new(EventTrigger::new(config.event_prefix.clone()));
        let hooks = HookRegistry::new();
        bridge_legacy_events(&hooks, &events)?;

        Ok(Self {
            config,
            client,
            cache: PageCache::new(),
            hooks,
            events,
            document: Rc::new(RefCell::new(document)),
        })
    }

    pub fn config(&self) -> &TransitConfig {
        &self.config
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn events(&self) -> &EventTrigger {
        &self.events
    }

    /// Borrow the live document.
    pub fn document(&self) -> Ref<'_, Document> {
        self.document.borrow()
    }

    /// Fetch a page through the cache.
    pub async fn fetch_page(&self, url: &str, options: FetchOptions) -> TransitResult<Arc<PageData>> {
        PageFetcher::new(&self.client, &self.cache, &self.hooks, &self.config)
            .fetch(url, options)
            .await
    }

    /// Swap `containers` (or the configured ones) from `page` into the live
    /// document. True when every container was swapped.
    pub fn replace_content(&self, page: &PageData, containers: Option<&[String]>) -> bool {
        self.replace_content_report(page, containers).is_complete()
    }

    /// Like [`Self::replace_content`], returning the detailed report.
    pub fn replace_content_report(
        &self,
        page: &PageData,
        containers: Option<&[String]>,
    ) -> ReplaceReport {
        let containers = containers.unwrap_or(&self.config.containers);
        replace::replace_content(&mut self.document.borrow_mut(), page, containers)
    }

    pub fn trigger_event(&self, name: EventName, original: Option<&OriginalEvent>) {
        self.events.trigger(name, original);
    }

    /// Register a legacy event handler.
    pub fn on<F>(&self, name: EventName, handler: F) -> HandlerId
    where
        F: Fn(Option<&OriginalEvent>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.on(name, handler)
    }

    pub fn off(&self, name: EventName, id: HandlerId) -> bool {
        self.events.off(name, id)
    }

    /// Navigate the live document to `url` with default fetch options.
    pub async fn navigate(&self, url: &str) -> TransitResult<NavigationOutcome> {
        self.navigate_with(url, FetchOptions::default()).await
    }

    /// Fetch `url` and swap the configured containers into the live document.
    ///
    /// Animation and history are left to the caller; the legacy events
    /// around the swap still fire in their usual order.
    pub async fn navigate_with(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> TransitResult<NavigationOutcome> {
        self.trigger_event(EventName::TransitionStart, None);

        let page = self.fetch_page(url, options).await?;

        self.trigger_event(EventName::WillReplaceContent, None);
        let document = Rc::clone(&self.document);
        let args = ContentReplaceArgs {
            page: Arc::clone(&page),
            containers: self.config.containers.clone(),
        };
        let replaced = self
            .hooks
            .call::<ContentReplace, _, _>(args, move |args| async move {
                let report =
                    replace::replace_content(&mut document.borrow_mut(), &args.page, &args.containers);
                Ok(report.is_complete())
            })
            .await?;
        self.trigger_event(EventName::ContentReplaced, None);
        self.trigger_event(EventName::PageView, None);
        self.trigger_event(EventName::TransitionEnd, None);

        tracing::debug!("navigated to {} (complete: {replaced})", page.url);
        Ok(NavigationOutcome { page, replaced })
    }
}

impl std::fmt::Debug for Transit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transit")
            .field("config", &self.config)
            .field("cached_pages", &self.cache.len())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Mirror internal hooks as legacy events.
fn bridge_legacy_events(hooks: &HookRegistry, events: &Arc<EventTrigger>) -> TransitResult<()> {
    let trigger = Arc::clone(events);
    hooks.on_sync::<PageLoad, _>(move |args| {
        let name = if args.cache {
            EventName::PageRetrievedFromCache
        } else {
            EventName::PageLoaded
        };
        trigger.trigger(name, None);
        Ok(())
    })?;

    let trigger = Arc::clone(events);
    hooks.on_sync::<FetchFailed, _>(move |_| {
        trigger.trigger(EventName::ServerError, None);
        Ok(())
    })?;
    Ok(())
}
