//! MyAnimeList request fields, response bodies and status vocabulary

use core_library::models::{ListStatus, MediaKind};
use serde::Deserialize;

/// Path segment of a media kind (`/anime/...`, `/manga/...`).
pub fn media_path(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Anime => "anime",
        MediaKind::Manga => "manga",
    }
}

/// Form field carrying episode or chapter progress.
pub fn progress_field(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Anime => "num_watched_episodes",
        MediaKind::Manga => "num_chapters_read",
    }
}

/// Form field of the rewatch/reread flag.
pub fn repeat_field(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Anime => "is_rewatching",
        MediaKind::Manga => "is_rereading",
    }
}

/// MyAnimeList status for `status`.
///
/// MyAnimeList has no repeating status: a rewatch is `completed` with the
/// repeat flag set.
pub fn status_param(status: ListStatus, kind: MediaKind) -> &'static str {
    match (status, kind) {
        (ListStatus::Current, MediaKind::Anime) => "watching",
        (ListStatus::Current, MediaKind::Manga) => "reading",
        (ListStatus::Planning, MediaKind::Anime) => "plan_to_watch",
        (ListStatus::Planning, MediaKind::Manga) => "plan_to_read",
        (ListStatus::Paused, _) => "on_hold",
        (ListStatus::Dropped, _) => "dropped",
        (ListStatus::Completed | ListStatus::Repeating, _) => "completed",
    }
}

/// Inverse of [`status_param`]; `None` for an unknown status.
pub fn parse_status(status: &str, repeating: bool) -> Option<ListStatus> {
    if repeating {
        return Some(ListStatus::Repeating);
    }
    match status {
        "watching" | "reading" => Some(ListStatus::Current),
        "plan_to_watch" | "plan_to_read" => Some(ListStatus::Planning),
        "on_hold" => Some(ListStatus::Paused),
        "dropped" => Some(ListStatus::Dropped),
        "completed" => Some(ListStatus::Completed),
        _ => None,
    }
}

/// `my_list_status` object, shared by anime and manga.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MyListStatus {
    pub status: Option<String>,
    pub num_episodes_watched: Option<u32>,
    pub num_chapters_read: Option<u32>,
    pub num_volumes_read: Option<u32>,
    #[serde(default)]
    pub is_rewatching: bool,
    #[serde(default)]
    pub is_rereading: bool,
    /// RFC 3339 timestamp.
    pub updated_at: Option<String>,
}

impl MyListStatus {
    pub fn progress(&self) -> u32 {
        self.num_episodes_watched
            .or(self.num_chapters_read)
            .unwrap_or_default()
    }

    pub fn repeating(&self) -> bool {
        self.is_rewatching || self.is_rereading
    }
}

/// `GET /{anime|manga}/{id}?fields=my_list_status`
#[derive(Debug, Deserialize)]
pub struct MediaWithListStatus {
    pub id: u64,
    #[serde(default)]
    pub my_list_status: Option<MyListStatus>,
}

/// Error body, e.g. `{"error": "invalid_token", "message": ""}`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn describe(&self) -> Option<String> {
        match (self.error.as_deref(), self.message.as_deref()) {
            (Some(error), Some(message)) if !message.is_empty() => {
                Some(format!("{}: {}", error, message))
            }
            (Some(error), _) => Some(error.to_string()),
            (None, Some(message)) if !message.is_empty() => Some(message.to_string()),
            _ => None,
        }
    }
}
