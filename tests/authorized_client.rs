mod common;

use std::sync::Arc;
use std::time::Duration;

use fieldops_client::{AuthorizedClient, Error, KeyValueStore, MemoryStore, ensure_success};
use futures::future::join_all;
use mockito::{Matcher, Mock, Server, ServerGuard};
use reqwest::StatusCode;
use serde_json::json;

use common::{RecordingNavigator, bearer, config_for, fresh_token, session_for};

/// Holds the refresh response body long enough for every concurrent 401 to land first.
const REFRESH_DELAY: Duration = Duration::from_millis(200);

struct Fixture {
    server: ServerGuard,
    api: AuthorizedClient,
    navigator: RecordingNavigator,
    old: String,
    store: Arc<MemoryStore>,
}

/// Session holding `old` (rejected by the backend) and refresh token `refresh-1`.
async fn fixture() -> Fixture {
    let server = Server::new_async().await;
    let old = fresh_token("1");

    let store = Arc::new(MemoryStore::new());
    store.set("access_token", &old).unwrap();
    store.set("refresh_token", "refresh-1").unwrap();

    let (session, navigator) = session_for(config_for(&server), store.clone());
    Fixture {
        api: AuthorizedClient::new(session),
        server,
        navigator,
        old,
        store,
    }
}

async fn mock_data(server: &mut ServerGuard, token: &str, status: usize, hits: usize) -> Mock {
    server
        .mock("GET", "/data")
        .match_header("authorization", bearer(token).as_str())
        .with_status(status)
        .with_body(json!({"ok": status == 200}).to_string())
        .expect(hits)
        .create_async()
        .await
}

async fn get_data(api: &AuthorizedClient) -> Result<reqwest::Response, Error> {
    let url = api.session().config().endpoint("/data").unwrap();
    api.send(|http| http.get(url.clone())).await
}

#[tokio::test]
async fn attaches_bearer_token() {
    let mut f = fixture().await;
    let data = mock_data(&mut f.server, &f.old, 200, 1).await;

    let response = get_data(&f.api).await.unwrap();

    data.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn non_401_failures_are_not_retried() {
    let mut f = fixture().await;
    let data = mock_data(&mut f.server, &f.old, 503, 1).await;
    let refresh = f
        .server
        .mock("POST", "/auth/refresh")
        .expect(0)
        .create_async()
        .await;

    let response = get_data(&f.api).await.unwrap();
    let err = ensure_success(response, "data").await.unwrap_err();

    data.assert_async().await;
    refresh.assert_async().await;
    assert!(matches!(err, Error::Http { status: 503, .. }));
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let mut f = fixture().await;
    let new = fresh_token("1");
    let rejected = mock_data(&mut f.server, &f.old, 401, 5).await;
    let accepted = mock_data(&mut f.server, &new, 200, 5).await;

    let body = json!({"accessToken": new, "refreshToken": "refresh-2"}).to_string();
    let refresh = f
        .server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_chunked_body(move |w| {
            std::thread::sleep(REFRESH_DELAY);
            w.write_all(body.as_bytes())
        })
        .expect(1)
        .create_async()
        .await;

    let responses = join_all((0..5).map(|_| get_data(&f.api))).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }
    rejected.assert_async().await;
    accepted.assert_async().await;
    refresh.assert_async().await;

    let session = f.api.session();
    assert_eq!(session.access_token().as_deref(), Some(new.as_str()));
    assert_eq!(session.refresh_token().as_deref(), Some("refresh-2"));
    assert!(!session.is_refreshing());
    assert!(f.navigator.targets().is_empty());
}

#[tokio::test]
async fn refresh_failure_is_shared_and_ends_session_once() {
    let mut f = fixture().await;
    let rejected = mock_data(&mut f.server, &f.old, 401, 3).await;
    let refresh = f
        .server
        .mock("POST", "/auth/refresh")
        .with_status(401)
        .with_chunked_body(|_| {
            std::thread::sleep(REFRESH_DELAY);
            Ok(())
        })
        .expect(1)
        .create_async()
        .await;

    let results = join_all((0..3).map(|_| get_data(&f.api))).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Http { status: 401, .. }), "{err}");
    }
    rejected.assert_async().await;
    refresh.assert_async().await;
    assert!(!f.api.session().is_authenticated());
    assert!(f.store.keys().is_empty());
    assert_eq!(f.navigator.targets(), ["/login"]);
}

#[tokio::test]
async fn retried_request_is_not_retried_again() {
    let mut f = fixture().await;
    let new = fresh_token("1");
    let first = mock_data(&mut f.server, &f.old, 401, 1).await;
    let retry = mock_data(&mut f.server, &new, 401, 1).await;
    let refresh = f
        .server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(json!({"accessToken": new}).to_string())
        .expect(1)
        .create_async()
        .await;

    let response = get_data(&f.api).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let err = ensure_success(response, "data").await.unwrap_err();
    assert!(err.is_authorization_failure());
    first.assert_async().await;
    retry.assert_async().await;
    refresh.assert_async().await;
    // the refresh itself succeeded, so the session stays
    assert!(f.api.session().is_authenticated());
}

#[tokio::test]
async fn refresh_endpoint_401_is_returned_as_is() {
    let mut f = fixture().await;
    let refresh = f
        .server
        .mock("POST", "/auth/refresh")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let url = f.api.session().config().endpoint("/auth/refresh").unwrap();
    let response = f
        .api
        .send(|http| http.post(url.clone()).json(&json!({"token": "refresh-1"})))
        .await
        .unwrap();

    refresh.assert_async().await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!f.api.session().is_refreshing());
    assert!(f.navigator.targets().is_empty());
}

#[tokio::test]
async fn refresh_cycles_do_not_overlap_across_time() {
    let mut f = fixture().await;
    let second = fresh_token("1");
    let third = fresh_token("1");

    let old_rejected = mock_data(&mut f.server, &f.old, 401, 1).await;
    let second_rejected = mock_data(&mut f.server, &second, 401, 2).await;
    let third_accepted = mock_data(&mut f.server, &third, 200, 1).await;
    let first_refresh = f
        .server
        .mock("POST", "/auth/refresh")
        .match_body(Matcher::Json(json!({"token": "refresh-1"})))
        .with_status(200)
        .with_body(json!({"accessToken": second, "refreshToken": "refresh-2"}).to_string())
        .expect(1)
        .create_async()
        .await;
    let second_refresh = f
        .server
        .mock("POST", "/auth/refresh")
        .match_body(Matcher::Json(json!({"token": "refresh-2"})))
        .with_status(200)
        .with_body(json!({"accessToken": third}).to_string())
        .expect(1)
        .create_async()
        .await;

    // first cycle ends on the retried request's own 401
    let first = get_data(&f.api).await.unwrap();
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    // a later 401 starts a fresh cycle
    let again = get_data(&f.api).await.unwrap();
    assert_eq!(again.status(), StatusCode::OK);

    for mock in [old_rejected, second_rejected, third_accepted, first_refresh, second_refresh] {
        mock.assert_async().await;
    }
}
