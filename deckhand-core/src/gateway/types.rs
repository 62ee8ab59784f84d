//! Wire shapes of the Emby-compatible server API. Only the fields the
//! planner consumes are modeled; everything else is ignored on decode.

use chrono::{DateTime, Utc};
use deckhand_model::EpisodeKey;
use serde::Deserialize;

/// Envelope most item endpoints wrap their results in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsPage {
    #[serde(default)]
    pub items: Vec<ApiItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "Type", default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub media_sources: Vec<MediaSource>,
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub season_id: Option<String>,
    /// Season number for episodes.
    #[serde(default)]
    pub parent_index_number: Option<u32>,
    /// Episode number within the season.
    #[serde(default)]
    pub index_number: Option<u32>,
    #[serde(default)]
    pub user_data: Option<UserData>,
}

impl ApiItem {
    /// The server-reported file path: first media source, falling back to
    /// the item path (series objects often carry neither).
    pub fn primary_path(&self) -> Option<&str> {
        self.media_sources
            .iter()
            .find_map(|source| source.path.as_deref())
            .or(self.path.as_deref())
    }

    /// Season/episode ordering key from API metadata, when present.
    pub fn episode_key(&self) -> Option<EpisodeKey> {
        match (self.parent_index_number, self.index_number) {
            (Some(season), Some(episode)) => Some(EpisodeKey::new(season, episode)),
            _ => None,
        }
    }

    pub fn is_movie(&self) -> bool {
        self.item_type.as_deref() == Some("Movie")
    }

    pub fn is_episode(&self) -> bool {
        self.item_type.as_deref() == Some("Episode")
    }

    pub fn is_series(&self) -> bool {
        self.item_type.as_deref() == Some("Series")
    }

    pub fn is_played(&self) -> bool {
        self.user_data.as_ref().is_some_and(|data| data.played)
    }

    pub fn last_played(&self) -> Option<DateTime<Utc>> {
        self.user_data.as_ref().and_then(|data| data.last_played_date)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaSource {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserData {
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub last_played_date: Option<DateTime<Utc>>,
}

/// One active playback session as reported by `/Sessions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionInfo {
    #[serde(default)]
    pub now_playing_item: Option<ApiItem>,
}

impl SessionInfo {
    pub fn playing_path(&self) -> Option<&str> {
        self.now_playing_item
            .as_ref()
            .and_then(ApiItem::primary_path)
    }
}

/// A server-side library ("virtual folder") with its collection type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualFolder {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub collection_type: Option<String>,
}

impl VirtualFolder {
    /// Advisory mapping of the server's collection type onto a library
    /// kind; unknown types map to `None`.
    pub fn library_kind(&self) -> Option<deckhand_model::LibraryKind> {
        match self.collection_type.as_deref() {
            Some("movies") => Some(deckhand_model::LibraryKind::Movies),
            Some("tvshows") => Some(deckhand_model::LibraryKind::Series),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_resume_payload() {
        let raw = r#"{
            "Items": [
                {
                    "Id": "ep1",
                    "Name": "Secrets",
                    "Type": "Episode",
                    "SeriesId": "dark",
                    "SeasonId": "dark-s1",
                    "ParentIndexNumber": 1,
                    "IndexNumber": 2,
                    "MediaSources": [{"Path": "/data/Serien/Dark/Season 1/S01E02.mkv"}],
                    "UserData": {"Played": false, "LastPlayedDate": "2026-08-01T20:15:00.000Z"}
                }
            ]
        }"#;
        let page: ItemsPage = serde_json::from_str(raw).unwrap();
        let item = &page.items[0];
        assert!(item.is_episode());
        assert_eq!(
            item.primary_path(),
            Some("/data/Serien/Dark/Season 1/S01E02.mkv")
        );
        assert_eq!(item.episode_key(), Some(EpisodeKey::new(1, 2)));
        assert!(item.last_played().is_some());
    }

    #[test]
    fn session_without_playback_has_no_path() {
        let raw = r#"[{"NowPlayingItem": {"Path": "/data/Filme/Heat.mkv"}}, {}]"#;
        let sessions: Vec<SessionInfo> = serde_json::from_str(raw).unwrap();
        assert_eq!(sessions[0].playing_path(), Some("/data/Filme/Heat.mkv"));
        assert_eq!(sessions[1].playing_path(), None);
    }
}
