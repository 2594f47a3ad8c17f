//! MyAnimeList API connector implementation
//!
//! Implements the `RemoteAdapter` trait on top of the `HttpClient` bridge.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use chrono::{DateTime, Utc};
use core_auth::Credential;
use core_library::models::{ListStatus, MediaKind};
use core_sync::{Mutation, RemoteAdapter, RemoteError, RemoteListEntry};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{MalError, Result};
use crate::types::{
    media_path, parse_status, progress_field, repeat_field, status_param, ErrorBody,
    MediaWithListStatus, MyListStatus,
};

/// MyAnimeList v2 API base URL
pub const DEFAULT_API_BASE: &str = "https://api.myanimelist.net/v2";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// MyAnimeList API connector
///
/// ```ignore
/// use provider_myanimelist::MyAnimeListAdapter;
///
/// let adapter = MyAnimeListAdapter::new(http_client);
/// adapter.apply(&credential, &mutation).await?;
/// ```
pub struct MyAnimeListAdapter {
    http_client: Arc<dyn HttpClient>,
    api_base: String,
    timeout: Duration,
}

impl MyAnimeListAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn media_url(&self, kind: MediaKind, remote_id: u64) -> String {
        format!("{}/{}/{}", self.api_base, media_path(kind), remote_id)
    }

    /// Form fields of the `my_list_status` update for `mutation`.
    fn update_fields(mutation: &Mutation) -> Vec<(&'static str, String)> {
        let (kind, status) = match mutation {
            Mutation::UpdateProgress(update) => (update.media_kind, update.status),
            Mutation::UpdateStatus(update) => (update.media_kind, update.status),
        };

        let mut fields = vec![
            ("status", status_param(status, kind).to_string()),
            (repeat_field(kind), (status == ListStatus::Repeating).to_string()),
        ];
        if let Mutation::UpdateProgress(update) = mutation {
            fields.push((progress_field(kind), update.progress.to_string()));
            if let (MediaKind::Manga, Some(volumes)) = (kind, update.progress_volumes) {
                fields.push(("num_volumes_read", volumes.to_string()));
            }
        }
        fields
    }

    fn convert_entry(remote_id: u64, kind: MediaKind, list: MyListStatus) -> RemoteListEntry {
        let status = list.status.as_deref().and_then(|s| {
            let parsed = parse_status(s, list.repeating());
            if parsed.is_none() {
                warn!(status = s, remote_id, "Unknown MyAnimeList list status");
            }
            parsed
        });

        RemoteListEntry {
            remote_id,
            progress: list.progress(),
            progress_volumes: match kind {
                MediaKind::Manga => list.num_volumes_read,
                MediaKind::Anime => None,
            },
            status,
            updated_at: list
                .updated_at
                .as_deref()
                .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
                .map(|at| at.with_timezone(&Utc)),
        }
    }

    /// Send once and decode a 2xx body; 5xx and 429 are reported, not retried.
    async fn send<T: DeserializeOwned>(&self, credential: &Credential, request: HttpRequest) -> Result<T> {
        let request = request
            .bearer_token(credential.access_token())
            .header("Accept", "application/json")
            .timeout(self.timeout);

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::single_attempt())
            .await?;
        Self::decode(response)
    }

    fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
        if !response.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&response.body)
                .ok()
                .and_then(|body| body.describe())
                .unwrap_or_else(|| String::from_utf8_lossy(&response.body).into_owned());
            warn!(status = response.status, message = %message, "MyAnimeList request failed");
            return Err(MalError::from_status(
                response.status,
                message,
                response.retry_after(),
            ));
        }

        serde_json::from_slice(&response.body).map_err(|e| MalError::ParseError(e.to_string()))
    }

    async fn update_list_status(&self, credential: &Credential, mutation: &Mutation) -> Result<MyListStatus> {
        let (kind, remote_id) = match mutation {
            Mutation::UpdateProgress(update) => (update.media_kind, update.remote_id),
            Mutation::UpdateStatus(update) => (update.media_kind, update.remote_id),
        };
        let url = format!("{}/my_list_status", self.media_url(kind, remote_id));
        let request = HttpRequest::new(HttpMethod::Patch, url)
            .form(&Self::update_fields(mutation))?;
        self.send(credential, request).await
    }

    async fn media_list_status(
        &self,
        credential: &Credential,
        remote_id: u64,
        kind: MediaKind,
    ) -> Result<Option<MyListStatus>> {
        let url = format!("{}?fields=my_list_status", self.media_url(kind, remote_id));
        let media: MediaWithListStatus = self
            .send(credential, HttpRequest::new(HttpMethod::Get, url))
            .await?;
        Ok(media.my_list_status)
    }
}

#[async_trait]
impl RemoteAdapter for MyAnimeListAdapter {
    #[instrument(skip(self, credential, mutation), fields(remote_id = mutation.remote_id(), kind = mutation.kind()))]
    async fn apply(&self, credential: &Credential, mutation: &Mutation) -> std::result::Result<(), RemoteError> {
        let saved = self.update_list_status(credential, mutation).await?;
        debug!(
            progress = saved.progress(),
            status = ?saved.status,
            "MyAnimeList list status saved"
        );
        Ok(())
    }

    #[instrument(skip(self, credential))]
    async fn fetch_entry(
        &self,
        credential: &Credential,
        remote_id: u64,
        media_kind: MediaKind,
    ) -> std::result::Result<Option<RemoteListEntry>, RemoteError> {
        let list = self
            .media_list_status(credential, remote_id, media_kind)
            .await?;
        Ok(list.map(|list| Self::convert_entry(remote_id, media_kind, list)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bytes::Bytes;
    use core_library::models::EntryId;
    use core_sync::{ProgressUpdate, StatusUpdate};
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
            async fn execute_with_retry(
                &self,
                request: HttpRequest,
                policy: RetryPolicy,
            ) -> bridge_traits::error::Result<HttpResponse>;
        }
    }

    fn credential() -> Credential {
        Credential::new("mal_token").unwrap()
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn progress(kind: MediaKind, progress: u32, volumes: Option<u32>, status: ListStatus) -> Mutation {
        Mutation::UpdateProgress(ProgressUpdate {
            entry_id: EntryId::remote(2),
            remote_id: 2,
            media_kind: kind,
            progress,
            progress_volumes: volumes,
            status,
        })
    }

    fn field<'a>(fields: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn test_update_fields() {
        let anime = MyAnimeListAdapter::update_fields(&progress(MediaKind::Anime, 12, Some(3), ListStatus::Current));
        assert_eq!(field(&anime, "num_watched_episodes"), Some("12"));
        assert_eq!(field(&anime, "status"), Some("watching"));
        assert_eq!(field(&anime, "is_rewatching"), Some("false"));
        assert_eq!(field(&anime, "num_volumes_read"), None);

        let manga = MyAnimeListAdapter::update_fields(&progress(MediaKind::Manga, 80, Some(9), ListStatus::Repeating));
        assert_eq!(field(&manga, "num_chapters_read"), Some("80"));
        assert_eq!(field(&manga, "num_volumes_read"), Some("9"));
        assert_eq!(field(&manga, "status"), Some("completed"));
        assert_eq!(field(&manga, "is_rereading"), Some("true"));

        let status = MyAnimeListAdapter::update_fields(&Mutation::UpdateStatus(StatusUpdate {
            entry_id: EntryId::remote(5),
            remote_id: 5,
            media_kind: MediaKind::Manga,
            status: ListStatus::Planning,
        }));
        assert_eq!(field(&status, "status"), Some("plan_to_read"));
        assert_eq!(field(&status, "num_chapters_read"), None);
    }

    #[test]
    fn test_convert_entry() {
        let list = MyListStatus {
            status: Some("completed".to_string()),
            num_episodes_watched: Some(24),
            is_rewatching: true,
            updated_at: Some("2024-03-01T10:00:00+00:00".to_string()),
            ..MyListStatus::default()
        };
        let entry = MyAnimeListAdapter::convert_entry(21, MediaKind::Anime, list);

        assert_eq!(entry.remote_id, 21);
        assert_eq!(entry.progress, 24);
        assert_eq!(entry.progress_volumes, None);
        assert_eq!(entry.status, Some(ListStatus::Repeating));
        assert_eq!(entry.updated_at.unwrap().timestamp(), 1_709_287_200);
    }

    #[tokio::test]
    async fn test_apply_patches_list_status_once() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .times(1)
            .returning(|req, policy| {
                assert_eq!(policy.max_attempts, 1);
                assert_eq!(req.method, HttpMethod::Patch);
                assert_eq!(req.url, "https://api.myanimelist.net/v2/manga/2/my_list_status");
                assert_eq!(
                    req.headers.get("Authorization").map(String::as_str),
                    Some("Bearer mal_token")
                );
                let body = String::from_utf8(req.body.unwrap().to_vec()).unwrap();
                assert!(body.contains("num_chapters_read=45"));
                assert!(body.contains("status=reading"));
                Ok(response(200, r#"{"status": "reading", "num_chapters_read": 45}"#))
            });

        let adapter = MyAnimeListAdapter::new(Arc::new(mock_http));
        adapter
            .apply(&credential(), &progress(MediaKind::Manga, 45, None, ListStatus::Current))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute_with_retry().returning(|_, _| {
            Ok(response(400, r#"{"error": "bad_request", "message": "invalid status"}"#))
        });

        let adapter = MyAnimeListAdapter::new(Arc::new(mock_http));
        let err = adapter
            .apply(&credential(), &progress(MediaKind::Anime, 1, None, ListStatus::Current))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RemoteError::Rejected {
                status: 400,
                message: "bad_request: invalid status".into()
            }
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_connectivity() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .returning(|_, _| Err(BridgeError::ConnectionFailed("dns".into())));

        let adapter = MyAnimeListAdapter::new(Arc::new(mock_http));
        let err = adapter
            .apply(&credential(), &progress(MediaKind::Anime, 1, None, ListStatus::Current))
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_fetch_entry_without_list_status() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute_with_retry().returning(|req, _| {
            assert_eq!(req.method, HttpMethod::Get);
            assert_eq!(req.url, "https://api.myanimelist.net/v2/anime/5?fields=my_list_status");
            Ok(response(200, r#"{"id": 5, "title": "Cowboy Bebop"}"#))
        });

        let adapter = MyAnimeListAdapter::new(Arc::new(mock_http));
        let entry = adapter
            .fetch_entry(&credential(), 5, MediaKind::Anime)
            .await
            .unwrap();
        assert_eq!(entry, None);
    }
}
