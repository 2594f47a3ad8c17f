//! AniList GraphQL request and response types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Writes progress, volume progress and status of one list entry.
pub const SAVE_MEDIA_LIST_ENTRY: &str = r#"
mutation ($mediaId: Int, $progress: Int, $progressVolumes: Int, $status: MediaListStatus) {
    SaveMediaListEntry(mediaId: $mediaId, progress: $progress, progressVolumes: $progressVolumes, status: $status) {
        id
        mediaId
        progress
        progressVolumes
        status
        updatedAt
    }
}
"#;

/// Reads the authenticated viewer's list entry for one media.
pub const MEDIA_LIST_ENTRY: &str = r#"
query ($mediaId: Int, $type: MediaType) {
    Media(id: $mediaId, type: $type) {
        id
        mediaListEntry {
            id
            mediaId
            progress
            progressVolumes
            status
            updatedAt
        }
    }
}
"#;

#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: Value,
}

/// GraphQL envelope. AniList reports some failures with HTTP 200 and a
/// populated `errors` array.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    /// HTTP-like status AniList attaches to each error.
    #[serde(default)]
    pub status: Option<u16>,
}

/// AniList `MediaList` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaListEntry {
    pub id: u64,
    pub media_id: u64,
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub progress_volumes: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SaveMediaListEntryData {
    #[serde(rename = "SaveMediaListEntry")]
    pub entry: Option<MediaListEntry>,
}

#[derive(Debug, Deserialize)]
pub struct MediaData {
    #[serde(rename = "Media")]
    pub media: Option<MediaWithListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaWithListEntry {
    pub id: u64,
    #[serde(default)]
    pub media_list_entry: Option<MediaListEntry>,
}
