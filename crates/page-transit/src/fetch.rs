//! Page fetcher: cache lookup, the hookable network request, timeout and abort.
//!
//! The network call runs through the `fetch:request` hook, so a handler can
//! substitute any [`FetchResponse`] (a stub, another transport). Each request
//! runs under one [`CancellationToken`], cancelled by the timeout timer or by
//! the caller's token; the timer also raises a flag so that a timeout is
//! recognised even when the failure surfaces as a plain network error.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::PageCache;
use crate::config::TransitConfig;
use crate::hooks::{
    FetchFailed, FetchFailedArgs, FetchRequest, FetchTimeout, FetchTimeoutArgs, HookEvent,
    HookRegistry, PageLoad, PageLoadArgs,
};
use crate::location::Location;
use crate::types::{FetchError, PageData, TransitError, TransitResult};

/// HTTP method of a page request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// Per-call fetch options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: Method,
    pub body: Option<String>,
    /// Merged over the configured request headers.
    pub headers: BTreeMap<String, String>,
    /// Overrides the configured timeout. Zero disables the timer.
    pub timeout: Option<Duration>,
    /// Announce `page:load` for this call.
    pub trigger_hooks: bool,
    /// Caller-level cancellation. The request and the timeout timer share
    /// a child of this token. Once response headers arrived, the body is
    /// read to the end; cancelling does not interrupt that read.
    pub signal: Option<CancellationToken>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::Get,
            body: None,
            headers: BTreeMap::new(),
            timeout: None,
            trigger_hooks: true,
            signal: None,
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Skip the `page:load` announcement.
    pub fn without_hooks(mut self) -> Self {
        self.trigger_hooks = false;
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Resolved request options handed to `fetch:request` handlers.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub signal: CancellationToken,
}

/// Arguments of the `fetch:request` hook.
#[derive(Debug, Clone)]
pub struct FetchRequestArgs {
    /// Absolute request URL.
    pub url: String,
    pub options: RequestOptions,
}

/// Status line, final URL and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseHead {
    pub status: u16,
    /// URL the response was served from, after redirects.
    pub url: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug)]
enum ResponseBody {
    Text(String),
    Network(reqwest::Response),
}

/// A response-like value produced by the `fetch:request` step.
#[derive(Debug)]
pub struct FetchResponse {
    head: ResponseHead,
    body: ResponseBody,
}

impl FetchResponse {
    /// An in-memory response.
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            head: ResponseHead {
                status,
                url: url.into(),
                headers: Vec::new(),
            },
            body: ResponseBody::Text(body.into()),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.head.headers.push((name.into(), value.into()));
        self
    }

    /// Wrap a network response; the body is read lazily by [`Self::text`].
    pub fn from_network(response: reqwest::Response) -> Self {
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        Self {
            head: ResponseHead {
                status: response.status().as_u16(),
                url: response.url().to_string(),
                headers,
            },
            body: ResponseBody::Network(response),
        }
    }

    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn url(&self) -> &str {
        &self.head.url
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// Read the body as text.
    pub async fn text(self) -> TransitResult<String> {
        self.into_text().await.map(|(_, text)| text)
    }

    /// Read the body as text, keeping the head.
    pub async fn into_text(self) -> TransitResult<(ResponseHead, String)> {
        let text = match self.body {
            ResponseBody::Text(text) => text,
            ResponseBody::Network(response) => response.text().await?,
        };
        Ok((self.head, text))
    }
}

/// Aborts the timeout timer when dropped.
struct TimeoutTimer {
    handle: JoinHandle<()>,
}

impl TimeoutTimer {
    fn arm(duration: Duration, signal: CancellationToken, timed_out: Arc<AtomicBool>) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            timed_out.store(true, Ordering::SeqCst);
            signal.cancel();
        });
        Self { handle }
    }
}

impl Drop for TimeoutTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Fetches pages for one engine, reading and filling its cache.
pub struct PageFetcher<'a> {
    client: &'a reqwest::Client,
    cache: &'a PageCache,
    hooks: &'a HookRegistry,
    config: &'a TransitConfig,
}

impl<'a> PageFetcher<'a> {
    pub fn new(
        client: &'a reqwest::Client,
        cache: &'a PageCache,
        hooks: &'a HookRegistry,
        config: &'a TransitConfig,
    ) -> Self {
        Self {
            client,
            cache,
            hooks,
            config,
        }
    }

    /// Fetch a page from the cache or the server.
    ///
    /// Only pages served from the requested URL are cached; a redirected
    /// page is returned under its final URL but never stored.
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> TransitResult<Arc<PageData>> {
        let location = Location::from_url(url, &self.config.base_url)?;
        let key = location.url();

        if let Some(page) = self.cache.get(&key) {
            tracing::debug!("cache hit for {key}");
            if options.trigger_hooks {
                self.hooks
                    .emit::<PageLoad>(PageLoadArgs {
                        page: Arc::clone(&page),
                        cache: true,
                    })
                    .await?;
            }
            return Ok(page);
        }

        // The timer cancels a child so a timeout never leaks into the
        // caller's token.
        let signal = options
            .signal
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();
        let mut headers = self.config.request_headers.clone();
        headers.extend(options.headers);
        let timeout = options.timeout.or_else(|| self.config.timeout());

        let timed_out = Arc::new(AtomicBool::new(false));
        let timer = timeout
            .filter(|duration| !duration.is_zero())
            .map(|duration| TimeoutTimer::arm(duration, signal.clone(), Arc::clone(&timed_out)));

        let args = FetchRequestArgs {
            url: location.href(),
            options: RequestOptions {
                method: options.method,
                body: options.body,
                headers,
                timeout,
                signal: signal.clone(),
            },
        };
        tracing::debug!("requesting {} ({:?})", args.url, args.options.method);

        let client = self.client.clone();
        let request = self
            .hooks
            .call::<FetchRequest, _, _>(args, move |args| send_request(client, args));
        let outcome = tokio::select! {
            biased;
            result = request => Some(result),
            () = signal.cancelled() => None,
        };
        drop(timer);

        let response = match outcome {
            Some(Ok(response)) => response,
            failed => {
                let error = failed.and_then(Result::err);
                let timed_out = timed_out.load(Ordering::SeqCst);
                return Err(self.classify_failure(&key, timed_out, &signal, error).await);
            }
        };

        let (head, html) = response.into_text().await?;

        if head.status == 500 {
            let url = head.url.clone();
            self.announce::<FetchFailed>(FetchFailedArgs {
                status: head.status,
                response: head.clone(),
                url: url.clone(),
            })
            .await;
            return Err(FetchError::server_error(head.status, url).into());
        }

        if html.is_empty() {
            return Err(FetchError::empty_response(head.status, head.url).into());
        }

        let final_url = Location::from_url(&head.url, &self.config.base_url)?.url();
        let page = Arc::new(PageData::new(final_url, html));

        if page.url == key {
            self.cache.insert(Arc::clone(&page));
        } else {
            tracing::debug!("{key} redirected to {}, not cached", page.url);
        }

        if options.trigger_hooks {
            self.hooks
                .emit::<PageLoad>(PageLoadArgs {
                    page: Arc::clone(&page),
                    cache: false,
                })
                .await?;
        }

        Ok(page)
    }

    /// Turn a failed request into the error the caller sees. The timeout
    /// flag is consulted first, then the cancellation signal.
    async fn classify_failure(
        &self,
        url: &str,
        timed_out: bool,
        signal: &CancellationToken,
        error: Option<TransitError>,
    ) -> TransitError {
        if timed_out {
            self.announce::<FetchTimeout>(FetchTimeoutArgs {
                url: url.to_string(),
            })
            .await;
            return FetchError::timed_out(url).into();
        }
        match error {
            Some(err) if !signal.is_cancelled() => err,
            _ => FetchError::aborted(url).into(),
        }
    }

    /// Announce a failure hook; handler errors are logged, not returned.
    async fn announce<E: HookEvent<Output = ()>>(&self, args: E::Args) {
        if let Err(e) = self.hooks.emit::<E>(args).await {
            tracing::warn!("{} handler failed: {e}", E::NAME);
        }
    }
}

/// Default `fetch:request` implementation: a plain network request.
async fn send_request(
    client: reqwest::Client,
    args: FetchRequestArgs,
) -> TransitResult<FetchResponse> {
    let FetchRequestArgs { url, options } = args;
    let mut builder = match options.method {
        Method::Get => client.get(&url),
        Method::Post => client.post(&url),
    };
    for (name, value) in &options.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = options.body {
        builder = builder.body(body);
    }

    let response = tokio::select! {
        biased;
        () = options.signal.cancelled() => {
            return Err(FetchError::aborted(url).into());
        }
        response = builder.send() => response?,
    };
    Ok(FetchResponse::from_network(response))
}
