//! Page Transit: a headless page-transition engine that fetches, caches and swaps page content under lifecycle hooks.

pub mod cache;
pub mod config;
pub mod dom;
pub mod engine;
pub mod events;
pub mod fetch;
pub mod hooks;
pub mod location;
pub mod replace;
pub mod types;

pub use cache::PageCache;
pub use config::{resolve_config_path, TransitConfig};
pub use dom::{contextual_attr, Document};
pub use engine::{NavigationOutcome, Transit};
pub use events::{CustomEvent, EventName, EventTrigger, HandlerId, OriginalEvent};
pub use fetch::{FetchOptions, FetchResponse, Method, PageFetcher};
pub use hooks::{HookEvent, HookHandle, HookOptions, HookRegistry};
pub use location::{normalize_url, Location};
pub use replace::{replace_content, ReplaceReport, SkipReason, SkippedContainer};
pub use types::*;
