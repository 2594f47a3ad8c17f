//! AniList API connector implementation
//!
//! Implements the `RemoteAdapter` trait on top of the `HttpClient` bridge.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use chrono::DateTime;
use core_auth::Credential;
use core_library::models::{ListStatus, MediaKind};
use core_sync::{Mutation, RemoteAdapter, RemoteError, RemoteListEntry};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{AniListError, Result};
use crate::types::{
    GraphQlRequest, GraphQlResponse, MediaData, MediaListEntry, SaveMediaListEntryData,
    MEDIA_LIST_ENTRY, SAVE_MEDIA_LIST_ENTRY,
};

/// AniList GraphQL endpoint
pub const DEFAULT_ENDPOINT: &str = "https://graphql.anilist.co";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// AniList API connector
///
/// # Example
///
/// ```ignore
/// use provider_anilist::AniListAdapter;
/// use core_sync::RemoteAdapter;
///
/// let adapter = AniListAdapter::new(http_client);
/// adapter.apply(&credential, &mutation).await?;
/// ```
pub struct AniListAdapter {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
    timeout: Duration,
}

impl AniListAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Variables of the `SaveMediaListEntry` mutation for `mutation`.
    fn save_variables(mutation: &Mutation) -> Value {
        match mutation {
            Mutation::UpdateProgress(update) => {
                let mut variables = json!({
                    "mediaId": update.remote_id,
                    "progress": update.progress,
                    "status": update.status.as_str(),
                });
                if let (MediaKind::Manga, Some(volumes)) = (update.media_kind, update.progress_volumes) {
                    variables["progressVolumes"] = json!(volumes);
                }
                variables
            }
            Mutation::UpdateStatus(update) => json!({
                "mediaId": update.remote_id,
                "status": update.status.as_str(),
            }),
        }
    }

    fn convert_entry(entry: MediaListEntry) -> RemoteListEntry {
        let status = entry.status.as_deref().and_then(|s| match s.parse::<ListStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                warn!(status = s, media_id = entry.media_id, "Unknown AniList list status");
                None
            }
        });

        RemoteListEntry {
            remote_id: entry.media_id,
            progress: entry.progress.unwrap_or_default(),
            progress_volumes: entry.progress_volumes,
            status,
            updated_at: entry
                .updated_at
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }

    /// POST one GraphQL operation and decode its `data`.
    ///
    /// Sent once: 5xx and 429 are reported, not retried here.
    #[instrument(skip(self, credential, query, variables), fields(endpoint = %self.endpoint))]
    async fn execute<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        query: &str,
        variables: Value,
    ) -> Result<T> {
        let request = HttpRequest::new(HttpMethod::Post, &self.endpoint)
            .bearer_token(credential.access_token())
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .json(&GraphQlRequest { query, variables })?;

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::single_attempt())
            .await?;
        Self::decode(response)
    }

    fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T> {
        let status = response.status;
        let envelope: Option<GraphQlResponse<T>> = serde_json::from_slice(&response.body).ok();

        if !response.is_success() {
            let message = envelope
                .as_ref()
                .and_then(|e| e.errors.first())
                .map(|e| e.message.clone())
                .unwrap_or_else(|| String::from_utf8_lossy(&response.body).into_owned());
            warn!(status, message = %message, "AniList request failed");
            return Err(AniListError::from_status(
                status,
                message,
                response.retry_after(),
            ));
        }

        let envelope = envelope.ok_or_else(|| {
            AniListError::ParseError(String::from_utf8_lossy(&response.body).into_owned())
        })?;

        if let Some(error) = envelope.errors.first() {
            warn!(message = %error.message, status = ?error.status, "AniList GraphQL error");
            return Err(match error.status {
                Some(code) if code != 400 => {
                    AniListError::from_status(code, error.message.clone(), response.retry_after())
                }
                _ => AniListError::GraphQl(error.message.clone()),
            });
        }

        envelope
            .data
            .ok_or_else(|| AniListError::ParseError("response carried no data".to_string()))
    }

    async fn save(&self, credential: &Credential, mutation: &Mutation) -> Result<MediaListEntry> {
        let data: SaveMediaListEntryData = self
            .execute(credential, SAVE_MEDIA_LIST_ENTRY, Self::save_variables(mutation))
            .await?;
        data.entry
            .ok_or_else(|| AniListError::ParseError("SaveMediaListEntry returned null".to_string()))
    }

    async fn media_list_entry(
        &self,
        credential: &Credential,
        remote_id: u64,
        media_kind: MediaKind,
    ) -> Result<Option<MediaListEntry>> {
        let variables = json!({ "mediaId": remote_id, "type": media_kind.as_str() });
        let data: MediaData = self
            .execute(credential, MEDIA_LIST_ENTRY, variables)
            .await?;
        let media = data
            .media
            .ok_or_else(|| AniListError::NotFound(format!("media {}", remote_id)))?;
        Ok(media.media_list_entry)
    }
}

#[async_trait]
impl RemoteAdapter for AniListAdapter {
    #[instrument(skip(self, credential, mutation), fields(remote_id = mutation.remote_id(), kind = mutation.kind()))]
    async fn apply(&self, credential: &Credential, mutation: &Mutation) -> std::result::Result<(), RemoteError> {
        let saved = self.save(credential, mutation).await?;
        debug!(
            list_entry_id = saved.id,
            progress = ?saved.progress,
            status = ?saved.status,
            "AniList list entry saved"
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
        let entry = self
            .media_list_entry(credential, remote_id, media_kind)
            .await?;
        Ok(entry.map(Self::convert_entry))
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
        Credential::new("test_token").unwrap()
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn manga_progress(progress: u32, volumes: Option<u32>) -> Mutation {
        Mutation::UpdateProgress(ProgressUpdate {
            entry_id: EntryId::remote(30002),
            remote_id: 30002,
            media_kind: MediaKind::Manga,
            progress,
            progress_volumes: volumes,
            status: ListStatus::Current,
        })
    }

    const SAVED: &str = r#"{
        "data": {
            "SaveMediaListEntry": {
                "id": 9001, "mediaId": 30002, "progress": 45,
                "progressVolumes": 5, "status": "CURRENT", "updatedAt": 1700000000
            }
        }
    }"#;

    #[test]
    fn test_save_variables() {
        let progress = AniListAdapter::save_variables(&manga_progress(45, Some(5)));
        assert_eq!(progress["mediaId"], 30002);
        assert_eq!(progress["progress"], 45);
        assert_eq!(progress["progressVolumes"], 5);
        assert_eq!(progress["status"], "CURRENT");

        let status = AniListAdapter::save_variables(&Mutation::UpdateStatus(StatusUpdate {
            entry_id: EntryId::remote(1),
            remote_id: 1,
            media_kind: MediaKind::Anime,
            status: ListStatus::Dropped,
        }));
        assert_eq!(status, json!({ "mediaId": 1, "status": "DROPPED" }));
    }

    #[test]
    fn test_convert_entry() {
        let entry = AniListAdapter::convert_entry(MediaListEntry {
            id: 1,
            media_id: 21,
            progress: Some(1071),
            progress_volumes: None,
            status: Some("REPEATING".to_string()),
            updated_at: Some(1_700_000_000),
        });

        assert_eq!(entry.remote_id, 21);
        assert_eq!(entry.progress, 1071);
        assert_eq!(entry.status, Some(ListStatus::Repeating));
        assert_eq!(entry.updated_at.unwrap().timestamp(), 1_700_000_000);

        let unknown = AniListAdapter::convert_entry(MediaListEntry {
            id: 2,
            media_id: 22,
            progress: None,
            progress_volumes: None,
            status: Some("WATCHING".to_string()),
            updated_at: None,
        });
        assert_eq!(unknown.progress, 0);
        assert_eq!(unknown.status, None);
    }

    #[tokio::test]
    async fn test_apply_sends_single_authorized_attempt() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .times(1)
            .returning(|req, policy| {
                assert_eq!(policy.max_attempts, 1);
                assert_eq!(
                    req.headers.get("Authorization").map(String::as_str),
                    Some("Bearer test_token")
                );
                let body: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                assert!(body["query"].as_str().unwrap().contains("SaveMediaListEntry"));
                assert_eq!(body["variables"]["progress"], 45);
                Ok(response(200, SAVED))
            });

        let adapter = AniListAdapter::new(Arc::new(mock_http));
        adapter
            .apply(&credential(), &manga_progress(45, Some(5)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_graphql_validation_error_is_rejected() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute_with_retry().returning(|_, _| {
            Ok(response(
                200,
                r#"{"data": null, "errors": [{"message": "validation", "status": 400}]}"#,
            ))
        });

        let adapter = AniListAdapter::new(Arc::new(mock_http));
        let err = adapter
            .apply(&credential(), &manga_progress(1, None))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RemoteError::Rejected {
                status: 400,
                message: "validation".into()
            }
        );
    }

    #[tokio::test]
    async fn test_graphql_unauthorized_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute_with_retry().returning(|_, _| {
            Ok(response(
                200,
                r#"{"data": null, "errors": [{"message": "Invalid token", "status": 401}]}"#,
            ))
        });

        let adapter = AniListAdapter::new(Arc::new(mock_http));
        let err = adapter
            .apply(&credential(), &manga_progress(1, None))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Unauthorized);
    }

    #[tokio::test]
    async fn test_transport_failure_is_connectivity() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .returning(|_, _| Err(BridgeError::ConnectionFailed("dns".into())));

        let adapter = AniListAdapter::new(Arc::new(mock_http));
        let err = adapter
            .apply(&credential(), &manga_progress(1, None))
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_fetch_entry_without_list_entry() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute_with_retry().returning(|req, _| {
            let body: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
            assert_eq!(body["variables"]["type"], "ANIME");
            Ok(response(
                200,
                r#"{"data": {"Media": {"id": 5, "mediaListEntry": null}}}"#,
            ))
        });

        let adapter = AniListAdapter::new(Arc::new(mock_http));
        let entry = adapter
            .fetch_entry(&credential(), 5, MediaKind::Anime)
            .await
            .unwrap();
        assert_eq!(entry, None);
    }

    #[tokio::test]
    async fn test_unreadable_success_body() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute_with_retry()
            .returning(|_, _| Ok(response(200, "<html>")));

        let adapter = AniListAdapter::new(Arc::new(mock_http));
        let err = adapter
            .apply(&credential(), &manga_progress(1, None))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
