//! Integration tests for the clearance handshake.

mod support;

use std::sync::Arc;

use fetcher_core::{ChallengeError, ChallengeSolver, ClearanceHandler, RequestOptions};
use support::executor_with_headers;
use support::socket_guard::start_mock_server_or_skip;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

const NO_EXTRA: [(&str, &str); 0] = [];

#[tokio::test]
async fn test_solve_merges_tokens_and_sends_them_afterwards() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("user-agent", "reader/1"))
        .and(header("x-extra", "yes"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("Set-Cookie", "cf_clearance=tok; Path=/")
                .append_header("Set-Cookie", "__cf_bm=bm; Path=/")
                .append_header("Set-Cookie", "tracking=1; Path=/"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chapter"))
        .and(header("cookie", "__cf_bm=bm; cf_clearance=tok; keep=1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (session, executor) = executor_with_headers(&[("User-Agent", "reader/1")]);
    session.update_cookies([("keep", "1")]).unwrap();
    let solver = ChallengeSolver::new(Arc::clone(&session));

    let result = solver
        .solve(&format!("{}/", mock_server.uri()), [("X-Extra", "yes")])
        .await
        .expect("handshake should succeed");

    assert_eq!(result.tokens.len(), 2);
    assert_eq!(result.user_agent.as_deref(), Some("reader/1"));
    let cookies = session.cookies().unwrap();
    assert_eq!(cookies.get("cf_clearance").map(String::as_str), Some("tok"));
    assert_eq!(cookies.get("keep").map(String::as_str), Some("1"));
    assert!(!cookies.contains_key("tracking"));
    assert!(!session.headers().unwrap().contains("x-extra"));

    executor
        .get(&format!("{}/chapter", mock_server.uri()), RequestOptions::new())
        .await
        .expect("follow-up request should succeed");
}

#[tokio::test]
async fn test_solve_switches_user_agent_when_handler_uses_another() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(header("user-agent", "browser/9"))
        .respond_with(ResponseTemplate::new(200).insert_header("Set-Cookie", "cf_clearance=t"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (session, _executor) = executor_with_headers(&[("User-Agent", "reader/1")]);
    let handler = ClearanceHandler::new().with_user_agent("browser/9");
    let solver = ChallengeSolver::with_handler(Arc::clone(&session), Arc::new(handler));

    solver
        .solve(&mock_server.uri(), NO_EXTRA)
        .await
        .expect("handshake should succeed");

    assert_eq!(session.user_agent().unwrap().as_deref(), Some("browser/9"));
}

#[tokio::test]
async fn test_challenge_page_merges_nothing() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(503)
                .insert_header("Server", "cloudflare")
                .insert_header("Set-Cookie", "__cf_bm=partial; Path=/")
                .set_body_string("<html><script>window._cf_chl_opt={}</script></html>"),
        )
        .mount(&mock_server)
        .await;

    let (session, _executor) = executor_with_headers(&[("User-Agent", "reader/1")]);
    let solver = ChallengeSolver::new(Arc::clone(&session));

    let err = solver.solve(&mock_server.uri(), NO_EXTRA).await.unwrap_err();

    assert!(matches!(err, ChallengeError::Unsolved { status: 503, .. }), "got: {err:?}");
    assert!(session.cookies().unwrap().is_empty());
    assert_eq!(session.user_agent().unwrap().as_deref(), Some("reader/1"));
}

#[tokio::test]
async fn test_missing_clearance_cookie_is_reported() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).insert_header("Set-Cookie", "__cf_bm=only"))
        .mount(&mock_server)
        .await;

    let (session, _executor) = executor_with_headers(&[]);
    let solver = ChallengeSolver::new(Arc::clone(&session));

    let err = solver.solve(&mock_server.uri(), NO_EXTRA).await.unwrap_err();
    match err {
        ChallengeError::MissingToken { token, .. } => assert_eq!(token, "cf_clearance"),
        other => panic!("expected MissingToken, got {other:?}"),
    }
    assert!(session.cookies().unwrap().is_empty());

    let lenient = ChallengeSolver::with_handler(
        Arc::clone(&session),
        Arc::new(ClearanceHandler::new().with_required_token(None)),
    );
    lenient
        .solve(&mock_server.uri(), NO_EXTRA)
        .await
        .expect("any clearance cookie is enough");
    assert_eq!(
        session.cookies().unwrap().get("__cf_bm").map(String::as_str),
        Some("only")
    );
}

#[tokio::test]
async fn test_error_status_is_transport_failure() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let (session, _executor) = executor_with_headers(&[]);
    let solver = ChallengeSolver::new(Arc::clone(&session));
    let err = solver.solve(&mock_server.uri(), NO_EXTRA).await.unwrap_err();
    assert!(matches!(err, ChallengeError::Transport(_)), "got: {err:?}");
}
