//! Integration tests for concurrent fetching over one shared session.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use fetcher_core::{ConcurrentFetcher, RequestOptions};
use support::executor_with_headers;
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_eight_slow_fetches_run_in_parallel() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/drip"))
        .and(query_param("numbytes", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![b'*'; 100])
                .set_delay(Duration::from_secs(1)),
        )
        .expect(8)
        .mount(&mock_server)
        .await;

    let (_session, executor) = executor_with_headers(&[]);
    let fetcher = ConcurrentFetcher::new(8).expect("valid pool size");
    let total_bytes = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&total_bytes);
    let url = format!("{}/drip", mock_server.uri());

    let started = Instant::now();
    let stats = fetcher
        .run(
            move |url, delay: u32| {
                let executor = executor.clone();
                let sink = Arc::clone(&sink);
                async move {
                    let response = executor
                        .get(
                            &url,
                            RequestOptions::new()
                                .query("numbytes", "100")
                                .query("delay", delay.to_string()),
                        )
                        .await?;
                    sink.fetch_add(response.body().len(), Ordering::SeqCst);
                    Ok::<_, fetcher_core::FetchError>(())
                }
            },
            (0..8).map(|_| (url.clone(), 1)),
        )
        .await
        .expect("batch should run");

    assert!(
        started.elapsed() < Duration::from_secs(8),
        "took {:?}",
        started.elapsed()
    );
    assert_eq!(total_bytes.load(Ordering::SeqCst), 800);
    assert_eq!(stats.completed(), 8);
}

#[tokio::test]
async fn test_failing_downloads_do_not_stop_siblings() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/missing.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let output_dir = temp_dir.path().to_path_buf();
    let (_session, executor) = executor_with_headers(&[]);
    let fetcher = ConcurrentFetcher::new(2).expect("valid pool size");

    let urls: Vec<String> = ["a.jpg", "missing.jpg", "b.jpg", "c.jpg"]
        .iter()
        .map(|name| format!("{}/{name}", mock_server.uri()))
        .collect();

    let stats = fetcher
        .run_urls(
            move |url| {
                let executor = executor.clone();
                let output_dir = output_dir.clone();
                async move { executor.download(&url, &output_dir, None).await }
            },
            urls,
        )
        .await
        .expect("batch should run");

    assert_eq!(stats.completed(), 3);
    assert_eq!(stats.failed(), 1);
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        assert!(temp_dir.path().join(name).exists(), "{name} should exist");
    }
    assert!(!temp_dir.path().join("missing.jpg").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_session_mutation_loses_no_updates() {
    let (session, _executor) = executor_with_headers(&[]);
    let fetcher = ConcurrentFetcher::new(16).expect("valid pool size");
    let shared = Arc::clone(&session);

    fetcher
        .run(
            move |name, value: usize| {
                let session = Arc::clone(&shared);
                async move {
                    session.update_cookies([(name.clone(), value.to_string())])?;
                    session.update_headers([(format!("x-{name}"), value.to_string())])
                }
            },
            (0..50).map(|i| (format!("c{i}"), i)),
        )
        .await
        .expect("batch should run");

    assert_eq!(session.cookies().unwrap().len(), 50);
    let headers = session.headers().unwrap();
    assert!((0..50).all(|i| headers.contains(&format!("x-c{i}"))));
}
