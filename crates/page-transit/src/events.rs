//! Legacy event trigger.
//!
//! Replays lifecycle steps as named events: first as direct callbacks
//! registered with [`EventTrigger::on`], then as a namespaced
//! [`CustomEvent`] on a `tokio::sync::broadcast` channel for consumers that
//! prefer to observe the document. When nobody subscribes, the broadcast is
//! dropped.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 64;

/// Every legacy event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    AnimationInDone,
    AnimationInStart,
    AnimationOutDone,
    AnimationOutStart,
    AnimationSkipped,
    ClickLink,
    ContentReplaced,
    Disabled,
    Enabled,
    OpenPageInNewTab,
    PageLoaded,
    PageRetrievedFromCache,
    PageView,
    PopState,
    SamePage,
    SamePageWithHash,
    ServerError,
    TransitionStart,
    TransitionEnd,
    WillReplaceContent,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::AnimationInDone => "animationInDone",
            EventName::AnimationInStart => "animationInStart",
            EventName::AnimationOutDone => "animationOutDone",
            EventName::AnimationOutStart => "animationOutStart",
            EventName::AnimationSkipped => "animationSkipped",
            EventName::ClickLink => "clickLink",
            EventName::ContentReplaced => "contentReplaced",
            EventName::Disabled => "disabled",
            EventName::Enabled => "enabled",
            EventName::OpenPageInNewTab => "openPageInNewTab",
            EventName::PageLoaded => "pageLoaded",
            EventName::PageRetrievedFromCache => "pageRetrievedFromCache",
            EventName::PageView => "pageView",
            EventName::PopState => "popState",
            EventName::SamePage => "samePage",
            EventName::SamePageWithHash => "samePageWithHash",
            EventName::ServerError => "serverError",
            EventName::TransitionStart => "transitionStart",
            EventName::TransitionEnd => "transitionEnd",
            EventName::WillReplaceContent => "willReplaceContent",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The browser event that caused a trigger, when there is one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OriginalEvent {
    PopState { state: Option<serde_json::Value> },
    Click { href: String },
}

/// Namespaced event broadcast after the direct handlers ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEvent {
    /// `<prefix>:<name>`, e.g. `transit:pageView`.
    pub event_type: String,
    /// The bare event name.
    pub detail: String,
}

/// Identifies a registered handler for [`EventTrigger::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(Option<&OriginalEvent>) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct Handlers {
    next_id: u64,
    by_name: HashMap<EventName, Vec<(HandlerId, Handler)>>,
}

/// Direct-callback registry plus the custom event bus.
pub struct EventTrigger {
    prefix: String,
    handlers: Mutex<Handlers>,
    sender: broadcast::Sender<CustomEvent>,
}

impl EventTrigger {
    /// Create a trigger broadcasting under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            prefix: prefix.into(),
            handlers: Mutex::new(Handlers::default()),
            sender,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register a handler for `name`.
    pub fn on<F>(&self, name: EventName, handler: F) -> HandlerId
    where
        F: Fn(Option<&OriginalEvent>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let mut handlers = self.lock();
        handlers.next_id += 1;
        let id = HandlerId(handlers.next_id);
        handlers.by_name.entry(name).or_default().push((id, handler));
        id
    }

    /// Remove one handler. Returns false if it was not registered.
    pub fn off(&self, name: EventName, id: HandlerId) -> bool {
        let mut handlers = self.lock();
        let Some(list) = handlers.by_name.get_mut(&name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        list.len() != before
    }

    /// Remove every handler of `name`.
    pub fn off_all(&self, name: EventName) {
        self.lock().by_name.remove(&name);
    }

    pub fn handler_count(&self, name: EventName) -> usize {
        self.lock().by_name.get(&name).map_or(0, Vec::len)
    }

    /// Run every handler of `name` in registration order, then broadcast
    /// the custom event. A failing handler is logged and skipped.
    pub fn trigger(&self, name: EventName, original: Option<&OriginalEvent>) {
        let snapshot: Vec<Handler> = self
            .lock()
            .by_name
            .get(&name)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(original))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("{name} handler failed: {e:#}"),
                Err(_) => tracing::error!("{name} handler panicked"),
            }
        }

        let _ = self.sender.send(CustomEvent {
            event_type: format!("{}:{}", self.prefix, name),
            detail: name.as_str().to_string(),
        });
    }

    /// Subscribe to all future custom events.
    pub fn subscribe(&self) -> broadcast::Receiver<CustomEvent> {
        self.sender.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Handlers> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for EventTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTrigger")
            .field("prefix", &self.prefix)
            .field("events", &self.lock().by_name.len())
            .finish()
    }
}
