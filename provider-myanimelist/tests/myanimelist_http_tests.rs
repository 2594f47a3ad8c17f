//! MyAnimeList adapter against a local HTTP server, through the desktop client.

use bridge_desktop::ReqwestHttpClient;
use core_auth::Credential;
use core_library::{EntryId, ListStatus, MediaKind};
use core_sync::{Mutation, ProgressUpdate, RemoteAdapter, RemoteError, StatusUpdate};
use provider_myanimelist::MyAnimeListAdapter;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> MyAnimeListAdapter {
    let client = ReqwestHttpClient::new().unwrap();
    MyAnimeListAdapter::new(Arc::new(client)).with_api_base(server.uri())
}

fn credential() -> Credential {
    Credential::new("mal-token").unwrap()
}

fn progress(kind: MediaKind, remote_id: u64, progress: u32, volumes: Option<u32>) -> Mutation {
    Mutation::UpdateProgress(ProgressUpdate {
        entry_id: EntryId::remote(remote_id),
        remote_id,
        media_kind: kind,
        progress,
        progress_volumes: volumes,
        status: ListStatus::Current,
    })
}

#[tokio::test]
async fn patches_anime_progress_as_form() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/anime/21/my_list_status"))
        .and(header("authorization", "Bearer mal-token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("num_watched_episodes=1071"))
        .and(body_string_contains("status=watching"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "watching",
            "score": 0,
            "num_episodes_watched": 1071,
            "is_rewatching": false,
            "updated_at": "2024-03-01T10:00:00+00:00"
        })))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server)
        .apply(&credential(), &progress(MediaKind::Anime, 21, 1071, None))
        .await
        .unwrap();
}

#[tokio::test]
async fn patches_manga_chapters_and_volumes() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/manga/2/my_list_status"))
        .and(body_string_contains("num_chapters_read=120"))
        .and(body_string_contains("num_volumes_read=12"))
        .and(body_string_contains("status=reading"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "reading", "num_chapters_read": 120, "num_volumes_read": 12
        })))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server)
        .apply(&credential(), &progress(MediaKind::Manga, 2, 120, Some(12)))
        .await
        .unwrap();
}

#[tokio::test]
async fn status_only_write_sends_no_progress() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/anime/30/my_list_status"))
        .and(body_string_contains("status=on_hold"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "on_hold" })))
        .expect(1)
        .mount(&server)
        .await;

    let mutation = Mutation::UpdateStatus(StatusUpdate {
        entry_id: EntryId::remote(30),
        remote_id: 30,
        media_kind: MediaKind::Anime,
        status: ListStatus::Paused,
    });
    adapter(&server).apply(&credential(), &mutation).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(!body.contains("num_watched_episodes"));
}

#[tokio::test]
async fn invalid_token_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_token", "message": ""
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .apply(&credential(), &progress(MediaKind::Anime, 1, 1, None))
        .await
        .unwrap_err();

    assert_eq!(err, RemoteError::Unauthorized);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn rate_limit_is_reported_once() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .expect(1)
        .mount(&server)
        .await;

    let err = adapter(&server)
        .apply(&credential(), &progress(MediaKind::Anime, 1, 1, None))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RemoteError::RateLimited {
            retry_after: Some(Duration::from_secs(30))
        }
    );
}

#[tokio::test]
async fn unknown_media_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "not_found", "message": ""
        })))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .apply(&credential(), &progress(MediaKind::Manga, 999_999, 1, None))
        .await
        .unwrap_err();

    assert_eq!(err, RemoteError::NotFound);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn fetches_manga_list_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/manga/2"))
        .and(query_param("fields", "my_list_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 2,
            "title": "Berserk",
            "my_list_status": {
                "status": "on_hold",
                "num_chapters_read": 364,
                "num_volumes_read": 41,
                "is_rereading": false,
                "updated_at": "2024-03-01T10:00:00+00:00"
            }
        })))
        .mount(&server)
        .await;

    let entry = adapter(&server)
        .fetch_entry(&credential(), 2, MediaKind::Manga)
        .await
        .unwrap()
        .expect("list status");

    assert_eq!(entry.remote_id, 2);
    assert_eq!(entry.progress, 364);
    assert_eq!(entry.progress_volumes, Some(41));
    assert_eq!(entry.status, Some(ListStatus::Paused));
    assert!(entry.updated_at.is_some());
}

#[tokio::test]
async fn unreachable_api_is_connectivity_failure() {
    let adapter = MyAnimeListAdapter::new(Arc::new(ReqwestHttpClient::new().unwrap()))
        .with_api_base("http://127.0.0.1:9")
        .with_timeout(Duration::from_secs(2));

    let err = adapter
        .apply(&credential(), &progress(MediaKind::Anime, 1, 1, None))
        .await
        .unwrap_err();
    assert!(err.is_connectivity());
}
