//! Lifecycle hooks: typed extension points around every engine step.
//!
//! Each hook is a zero-sized type implementing [`HookEvent`], which fixes its
//! name, the arguments handlers receive and the value the step produces.
//! Handlers are registered on a [`HookRegistry`] either as observers or as
//! the single replacing handler of a step.

pub mod registry;

use std::sync::Arc;

use crate::fetch::{FetchRequestArgs, FetchResponse, ResponseHead};
use crate::types::PageData;

pub use registry::{DefaultHandler, HookHandle, HookOptions, HookRegistry};

/// A named lifecycle event.
pub trait HookEvent: 'static {
    /// Name the event is registered and logged under.
    const NAME: &'static str;
    /// Arguments passed (cloned) to every handler.
    type Args: Clone + 'static;
    /// Result of the step the event wraps.
    type Output: 'static;
}

/// `page:load`: a page was obtained, from the cache or the network.
pub struct PageLoad;

#[derive(Debug, Clone)]
pub struct PageLoadArgs {
    pub page: Arc<PageData>,
    pub cache: bool,
}

impl HookEvent for PageLoad {
    const NAME: &'static str = "page:load";
    type Args = PageLoadArgs;
    type Output = ();
}

/// `fetch:request`: the network call itself. Replaceable: a handler may
/// return any [`FetchResponse`] instead of hitting the network.
pub struct FetchRequest;

impl HookEvent for FetchRequest {
    const NAME: &'static str = "fetch:request";
    type Args = FetchRequestArgs;
    type Output = FetchResponse;
}

/// `fetch:timeout`: the request timer expired.
pub struct FetchTimeout;

#[derive(Debug, Clone)]
pub struct FetchTimeoutArgs {
    pub url: String,
}

impl HookEvent for FetchTimeout {
    const NAME: &'static str = "fetch:timeout";
    type Args = FetchTimeoutArgs;
    type Output = ();
}

/// `fetch:error`: the server answered with a 500.
pub struct FetchFailed;

#[derive(Debug, Clone)]
pub struct FetchFailedArgs {
    pub status: u16,
    pub response: ResponseHead,
    pub url: String,
}

impl HookEvent for FetchFailed {
    const NAME: &'static str = "fetch:error";
    type Args = FetchFailedArgs;
    type Output = ();
}

/// `content:replace`: swapping containers into the live document.
/// Replaceable; the default is the content replacer and yields whether every
/// container was swapped.
pub struct ContentReplace;

#[derive(Debug, Clone)]
pub struct ContentReplaceArgs {
    pub page: Arc<PageData>,
    pub containers: Vec<String>,
}

impl HookEvent for ContentReplace {
    const NAME: &'static str = "content:replace";
    type Args = ContentReplaceArgs;
    type Output = bool;
}
