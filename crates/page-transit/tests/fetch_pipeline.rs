//! Fetch pipeline integration tests against a mock HTTP server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use page_transit::hooks::{FetchFailed, FetchRequest, FetchTimeout, PageLoad};
use page_transit::*;

// ─────────────────────── helpers ───────────────────────

/// Engine rooted at the mock server with an empty live document.
fn engine_for(server: &MockServer) -> Transit {
    let config = TransitConfig::with_base_url(&server.uri()).unwrap();
    Transit::new(config, Document::parse("<html><head></head><body></body></html>")).unwrap()
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("Content-Type", "text/html")
        .set_body_string(body)
}

fn fetch_error(err: &TransitError) -> &FetchError {
    err.as_fetch_error()
        .unwrap_or_else(|| panic!("expected a fetch error, got {err:?}"))
}

// ─────────────────────── cache ───────────────────────

#[tokio::test]
async fn test_second_fetch_hits_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("<title>P</title>"))
        .expect(1)
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let first = transit.fetch_page("/page", FetchOptions::new()).await.unwrap();
    let second = transit
        .fetch_page(&format!("{}/page#top", server.uri()), FetchOptions::new())
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.url, "/page");
    assert_eq!(transit.cache().urls(), vec!["/page"]);
}

#[tokio::test]
async fn test_redirected_page_not_cached() {
    let server = MockServer::start().await;
    Mock::given(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(path("/new"))
        .respond_with(html("<p>moved</p>"))
        .expect(2)
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let page = transit.fetch_page("/old", FetchOptions::new()).await.unwrap();
    assert_eq!(page.url, "/new");
    assert!(!transit.cache().has("/old"));
    assert!(transit.cache().is_empty());

    transit.fetch_page("/old", FetchOptions::new()).await.unwrap();
}

#[tokio::test]
async fn test_page_load_hook_reports_cache_flag() {
    let server = MockServer::start().await;
    Mock::given(path("/a"))
        .respond_with(html("<p>a</p>"))
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    transit
        .hooks()
        .on_sync::<PageLoad, _>(move |args| {
            s.lock().unwrap().push((args.page.url.clone(), args.cache));
            Ok(())
        })
        .unwrap();

    transit.fetch_page("/a", FetchOptions::new()).await.unwrap();
    transit.fetch_page("/a", FetchOptions::new()).await.unwrap();
    transit
        .fetch_page("/a", FetchOptions::new().without_hooks())
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("/a".to_string(), false), ("/a".to_string(), true)]
    );
}

// ─────────────────────── failures ───────────────────────

#[tokio::test]
async fn test_timeout_sets_timed_out_only() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(html("<p>late</p>").set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let timeouts = Arc::new(Mutex::new(Vec::new()));
    let t = timeouts.clone();
    transit
        .hooks()
        .on_sync::<FetchTimeout, _>(move |args| {
            t.lock().unwrap().push(args.url);
            Ok(())
        })
        .unwrap();

    let err = transit
        .fetch_page("/slow", FetchOptions::new().timeout(Duration::from_millis(50)))
        .await
        .unwrap_err();

    let err = fetch_error(&err);
    assert!(err.timed_out);
    assert!(!err.aborted);
    assert_eq!(err.kind(), FetchErrorKind::TimedOut);
    assert_eq!(*timeouts.lock().unwrap(), vec!["/slow"]);
    assert!(transit.cache().is_empty());
}

#[tokio::test]
async fn test_configured_timeout_applies() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(html("<p>late</p>").set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut config = TransitConfig::with_base_url(&server.uri()).unwrap();
    config.timeout_ms = 50;
    let transit = Transit::new(config, Document::parse("")).unwrap();

    let err = transit.fetch_page("/slow", FetchOptions::new()).await.unwrap_err();
    assert!(fetch_error(&err).timed_out);
}

#[tokio::test]
async fn test_caller_abort() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(html("<p>late</p>").set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let err = transit
        .fetch_page("/slow", FetchOptions::new().signal(token.clone()))
        .await
        .unwrap_err();

    let err = fetch_error(&err);
    assert!(err.aborted);
    assert!(!err.timed_out);

    // cancelling again is a no-op
    token.cancel();
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_already_cancelled_signal_aborts() {
    let server = MockServer::start().await;
    Mock::given(path("/x"))
        .respond_with(html("<p>x</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let token = CancellationToken::new();
    token.cancel();

    let err = transit
        .fetch_page("/x", FetchOptions::new().signal(token))
        .await
        .unwrap_err();
    assert_eq!(fetch_error(&err).kind(), FetchErrorKind::Aborted);
}

#[tokio::test]
async fn test_timeout_leaves_caller_token_usable() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(html("<p>late</p>").set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;
    Mock::given(path("/fast"))
        .respond_with(html("<p>fast</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let token = CancellationToken::new();

    let err = transit
        .fetch_page(
            "/slow",
            FetchOptions::new()
                .timeout(Duration::from_millis(30))
                .signal(token.clone()),
        )
        .await
        .unwrap_err();
    assert!(fetch_error(&err).timed_out);
    assert!(!token.is_cancelled());

    let page = transit
        .fetch_page("/fast", FetchOptions::new().signal(token.clone()))
        .await
        .unwrap();
    assert_eq!(page.html, "<p>fast</p>");
}

#[tokio::test]
async fn test_error_after_timer_expiry_is_timeout() {
    let server = MockServer::start().await;
    let transit = engine_for(&server);
    transit
        .hooks()
        .replace::<FetchRequest, _, _>(|args, _| async move {
            args.options.signal.cancelled().await;
            Err(TransitError::Io(std::io::Error::other("connection reset")))
        })
        .unwrap();

    let err = transit
        .fetch_page("/x", FetchOptions::new().timeout(Duration::from_millis(20)))
        .await
        .unwrap_err();

    let err = fetch_error(&err);
    assert!(err.timed_out);
    assert!(!err.aborted);
    assert_eq!(err.to_string(), "Request timed out: /x");
}

#[tokio::test]
async fn test_server_error_fires_hook_before_empty_check() {
    let server = MockServer::start().await;
    Mock::given(path("/boom"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let failures = Arc::new(Mutex::new(Vec::new()));
    let f = failures.clone();
    transit
        .hooks()
        .on_sync::<FetchFailed, _>(move |args| {
            f.lock().unwrap().push((args.status, args.url, args.response.status));
            Ok(())
        })
        .unwrap();
    let server_errors = Arc::new(Mutex::new(0));
    let s = server_errors.clone();
    transit.on(EventName::ServerError, move |_| {
        *s.lock().unwrap() += 1;
        Ok(())
    });

    let err = transit.fetch_page("/boom", FetchOptions::new()).await.unwrap_err();
    let err = fetch_error(&err);
    let expected_url = format!("{}/boom", server.uri());

    assert_eq!(err.kind(), FetchErrorKind::ServerError);
    assert_eq!(err.status, Some(500));
    assert_eq!(err.url, expected_url);
    assert_eq!(*failures.lock().unwrap(), vec![(500, expected_url, 500)]);
    assert_eq!(*server_errors.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_failing_error_hook_does_not_mask_classification() {
    let server = MockServer::start().await;
    Mock::given(path("/boom"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    transit
        .hooks()
        .on_sync::<FetchFailed, _>(|_| Err(TransitError::hook("fetch:error", "handler broke")))
        .unwrap();

    let err = transit.fetch_page("/boom", FetchOptions::new()).await.unwrap_err();
    assert_eq!(fetch_error(&err).status, Some(500));
}

#[tokio::test]
async fn test_empty_body_fails() {
    let server = MockServer::start().await;
    Mock::given(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let err = transit.fetch_page("/empty", FetchOptions::new()).await.unwrap_err();
    let err = fetch_error(&err);
    assert_eq!(err.kind(), FetchErrorKind::EmptyResponse);
    assert_eq!(err.status, Some(200));
    assert!(transit.cache().is_empty());
}

#[tokio::test]
async fn test_network_error_propagates_unwrapped() {
    let config = TransitConfig::with_base_url("http://127.0.0.1:1/").unwrap();
    let transit = Transit::new(config, Document::parse("")).unwrap();

    let err = transit.fetch_page("/nowhere", FetchOptions::new()).await.unwrap_err();
    assert!(matches!(err, TransitError::Network(_)));
}

// ─────────────────────── request shaping ───────────────────────

#[tokio::test]
async fn test_headers_are_merged() {
    let server = MockServer::start().await;
    Mock::given(path("/h"))
        .and(header("X-Requested-With", "page-transit"))
        .and(header("X-Extra", "1"))
        .respond_with(html("<p>h</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    transit
        .fetch_page("/h", FetchOptions::new().header("X-Extra", "1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_post_sends_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/form"))
        .and(body_string("name=value"))
        .respond_with(html("<p>thanks</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let page = transit
        .fetch_page(
            "/form",
            FetchOptions::new().method(Method::Post).body("name=value"),
        )
        .await
        .unwrap();
    assert_eq!(page.html, "<p>thanks</p>");
}

#[tokio::test]
async fn test_request_hook_substitutes_response() {
    let server = MockServer::start().await;
    Mock::given(path("/stubbed"))
        .respond_with(html("<p>network</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    transit
        .hooks()
        .replace::<FetchRequest, _, _>(|args, _| async move {
            Ok(FetchResponse::new(200, args.url, "<p>stub</p>"))
        })
        .unwrap();

    let page = transit.fetch_page("/stubbed", FetchOptions::new()).await.unwrap();
    assert_eq!(page.html, "<p>stub</p>");
    assert!(transit.cache().has("/stubbed"));
}

#[tokio::test]
async fn test_request_hook_can_pass_through() {
    let server = MockServer::start().await;
    Mock::given(path("/through"))
        .respond_with(html("<p>network</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let transit = engine_for(&server);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    transit
        .hooks()
        .replace::<FetchRequest, _, _>(move |args, default| {
            s.lock().unwrap().push(args.url.clone());
            async move { default.call(args).await }
        })
        .unwrap();

    let page = transit.fetch_page("/through", FetchOptions::new()).await.unwrap();
    assert_eq!(page.html, "<p>network</p>");
    assert_eq!(*seen.lock().unwrap(), vec![format!("{}/through", server.uri())]);
}
