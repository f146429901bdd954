//! Integration tests for the session lifecycle as seen on the wire.

mod support;

use fetcher_core::{RequestOptions, SessionError, SessionHandle, SessionState};
use support::executor_with_headers;
use support::socket_guard::start_mock_server_or_skip;
use wiremock::matchers::{header, method};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_replaced_session_sends_stored_headers() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(header("x-site", "reader"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    let (session, executor) = executor_with_headers(&[("X-Site", "reader")]);
    executor
        .get(&mock_server.uri(), RequestOptions::new())
        .await
        .expect("first request should succeed");
    let old_id = session.session_id().unwrap();

    let replacement = SessionHandle::new(session.config()).expect("handle should build");
    session.replace_session(replacement).unwrap();
    assert_ne!(session.session_id().unwrap(), old_id);

    executor
        .get(&mock_server.uri(), RequestOptions::new())
        .await
        .expect("request through the new handle should succeed");
}

#[tokio::test]
async fn test_replacement_starts_with_its_own_cookie_jar() {
    let (session, _executor) = executor_with_headers(&[]);
    session.update_cookies([("old", "1")]).unwrap();

    session
        .replace_session(SessionHandle::new(session.config()).unwrap())
        .unwrap();

    assert!(session.cookies().unwrap().is_empty());
}

#[tokio::test]
async fn test_close_with_header_discard_then_reopen() {
    let (session, _executor) = executor_with_headers(&[("X-Site", "reader")]);
    session.update_cookies([("a", "1")]).unwrap();

    session.close(true);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.headers(), Err(SessionError::Closed)));
    assert!(matches!(session.cookies(), Err(SessionError::Closed)));

    session
        .replace_session(SessionHandle::new(session.config()).unwrap())
        .unwrap();
    assert_eq!(session.state(), SessionState::Open);
    assert!(!session.headers().unwrap().contains("x-site"));
}

#[tokio::test]
async fn test_old_handle_cannot_be_reinstalled() {
    let (session, _executor) = executor_with_headers(&[]);
    let old = session.handle().unwrap();
    session
        .replace_session(SessionHandle::new(session.config()).unwrap())
        .unwrap();

    let err = session.replace_session(old).unwrap_err();
    assert!(matches!(err, SessionError::InvalidHandle { .. }));
    assert!(err.to_string().contains("session type error"));
}
