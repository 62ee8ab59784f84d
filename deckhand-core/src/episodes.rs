//! Episode ordering and binge lookahead.
//!
//! Series files are ordered by season/episode metadata, never by filename
//! or folder listing order: naming is not guaranteed monotonic across
//! flat and per-season-subfolder layouts. When the server omits index
//! metadata the key is recovered from the filename (or the season folder
//! plus a bare episode number).

use crate::gateway::ApiItem;
use deckhand_model::EpisodeKey;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Filename patterns carrying both season and episode, checked in order.
static EPISODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // S01E02, s1.e2, S01 E02
        Regex::new(r"[Ss](\d{1,2})[ ._-]?[Ee](\d{1,3})").unwrap(),
        // 1x02
        Regex::new(r"(\d{1,2})[xX](\d{1,3})").unwrap(),
        // Season 1 Episode 2
        Regex::new(r"(?i)season\s*(\d+)\s*episode\s*(\d+)").unwrap(),
    ]
});

/// Episode-only patterns used when the season comes from the folder.
static BARE_EPISODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(?:e|ep|episode)\s*(\d{1,3})").unwrap(),
        // "03 - Title", "03. Title", "03_Title"
        Regex::new(r"^\s*(\d{1,3})\s*[-_. ]").unwrap(),
        // Just "03"
        Regex::new(r"^(\d{1,3})$").unwrap(),
    ]
});

static SEASON_FOLDER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^season\s*(\d+)$").unwrap(),
        Regex::new(r"(?i)^s(\d{1,2})$").unwrap(),
        Regex::new(r"(?i)^season(\d+)$").unwrap(),
        // British convention
        Regex::new(r"(?i)^series\s*(\d+)$").unwrap(),
    ]
});

/// Season/episode extraction from paths, for servers that report files
/// without index metadata.
pub struct EpisodeParser;

impl EpisodeParser {
    /// Extract the ordering key from a file path.
    pub fn parse_episode(path: &Path) -> Option<EpisodeKey> {
        let filename = path.file_stem()?.to_str()?;

        for pattern in EPISODE_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(filename) {
                let season: u32 = captures[1].parse().ok()?;
                let episode: u32 = captures[2].parse().ok()?;
                return Some(EpisodeKey::new(season, episode));
            }
        }

        Self::parse_from_folder(path, filename)
    }

    /// Season from the parent folder plus a bare episode number from the
    /// filename ("Season 2/03 - Title.mkv").
    fn parse_from_folder(path: &Path, filename: &str) -> Option<EpisodeKey> {
        let parent = path.parent()?.file_name()?.to_str()?;
        let season = Self::parse_season_folder(parent)?;
        for pattern in BARE_EPISODE_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(filename) {
                if let Ok(episode) = captures[1].parse::<u32>() {
                    return Some(EpisodeKey::new(season, episode));
                }
            }
        }
        None
    }

    /// Parse a season number from a folder name. Specials folders are
    /// season 0.
    pub fn parse_season_folder(folder_name: &str) -> Option<u32> {
        let lower = folder_name.to_lowercase();
        if lower == "specials" || lower == "special" {
            return Some(0);
        }
        for pattern in SEASON_FOLDER_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(folder_name) {
                if let Ok(season) = captures[1].parse::<u32>() {
                    return Some(season);
                }
            }
        }
        None
    }
}

/// Ordering key for an API episode: index metadata when the server knows
/// it, filename parsing otherwise.
pub fn episode_sort_key(item: &ApiItem) -> Option<EpisodeKey> {
    item.episode_key().or_else(|| {
        item.primary_path()
            .and_then(|path| EpisodeParser::parse_episode(Path::new(path)))
    })
}

/// The resume episode plus the next `lookahead` episodes in broadcast
/// order.
///
/// `current_id` anchors the window at the episode being watched; when it
/// is absent (series-level resume entries, favorites) the window starts
/// at the first unplayed episode, falling back to the first episode.
/// Episodes whose ordering key cannot be resolved are dropped with a log
/// line rather than guessed at.
pub fn binge_window<'a>(
    episodes: &'a [ApiItem],
    current_id: Option<&str>,
    lookahead: u32,
) -> Vec<&'a ApiItem> {
    let mut ordered: Vec<(EpisodeKey, &ApiItem)> = Vec::with_capacity(episodes.len());
    for item in episodes {
        match episode_sort_key(item) {
            Some(key) => ordered.push((key, item)),
            None => {
                debug!(
                    id = %item.id,
                    path = item.primary_path().unwrap_or("<none>"),
                    "episode has no resolvable order, skipping"
                );
            }
        }
    }
    ordered.sort_by_key(|(key, _)| *key);

    let start = current_id
        .and_then(|id| ordered.iter().position(|(_, item)| item.id == id))
        .or_else(|| ordered.iter().position(|(_, item)| !item.is_played()))
        .unwrap_or(0);

    ordered
        .into_iter()
        .skip(start)
        .take(1 + lookahead as usize)
        .map(|(_, item)| item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MediaSource, UserData};
    use std::path::PathBuf;

    #[test]
    fn parses_sxxeyy() {
        let path = PathBuf::from("/media/Dark/Season 1/S01E02 - Lies.mkv");
        assert_eq!(
            EpisodeParser::parse_episode(&path),
            Some(EpisodeKey::new(1, 2))
        );
    }

    #[test]
    fn parses_nxnn() {
        let path = PathBuf::from("/media/Dark/1x02 - Lies.mkv");
        assert_eq!(
            EpisodeParser::parse_episode(&path),
            Some(EpisodeKey::new(1, 2))
        );
    }

    #[test]
    fn parses_bare_number_in_season_folder() {
        let path = PathBuf::from("/media/Dark/Season 2/03 - Ghosts.mkv");
        assert_eq!(
            EpisodeParser::parse_episode(&path),
            Some(EpisodeKey::new(2, 3))
        );
    }

    #[test]
    fn parses_specials_folder() {
        let path = PathBuf::from("/media/Dark/Specials/E01 - Extras.mkv");
        assert_eq!(
            EpisodeParser::parse_episode(&path),
            Some(EpisodeKey::new(0, 1))
        );
    }

    #[test]
    fn season_folder_variants() {
        assert_eq!(EpisodeParser::parse_season_folder("Season 1"), Some(1));
        assert_eq!(EpisodeParser::parse_season_folder("S01"), Some(1));
        assert_eq!(EpisodeParser::parse_season_folder("season01"), Some(1));
        assert_eq!(EpisodeParser::parse_season_folder("Series 2"), Some(2));
        assert_eq!(EpisodeParser::parse_season_folder("Specials"), Some(0));
        assert_eq!(EpisodeParser::parse_season_folder("Extras"), None);
    }

    fn episode(id: &str, path: &str, key: Option<(u32, u32)>, played: bool) -> ApiItem {
        ApiItem {
            id: id.to_string(),
            item_type: Some("Episode".to_string()),
            media_sources: vec![MediaSource {
                path: Some(path.to_string()),
            }],
            parent_index_number: key.map(|(s, _)| s),
            index_number: key.map(|(_, e)| e),
            user_data: Some(UserData {
                played,
                last_played_date: None,
            }),
            ..ApiItem::default()
        }
    }

    #[test]
    fn window_orders_by_metadata_not_listing_order() {
        // Deliberately shuffled, as a filesystem readdir might return.
        let episodes = vec![
            episode("e5", "/d/Dark/Season 1/S01E05.mkv", Some((1, 5)), false),
            episode("e1", "/d/Dark/Season 1/S01E01.mkv", Some((1, 1)), true),
            episode("e3", "/d/Dark/Season 1/S01E03.mkv", Some((1, 3)), false),
            episode("e2", "/d/Dark/Season 1/S01E02.mkv", Some((1, 2)), false),
            episode("e4", "/d/Dark/Season 1/S01E04.mkv", Some((1, 4)), false),
        ];
        let window = binge_window(&episodes, Some("e2"), 2);
        let ids: Vec<&str> = window.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn window_resolves_order_from_season_subfolders_without_metadata() {
        // Scenario: per-season subfolders, no index metadata from the
        // server, resume point S01E02, lookahead 5 -> episodes 2..=7.
        let mut episodes = vec![
            episode("b", "/d/Kids Show/Season 1/02 - Two.mkv", None, false),
            episode("g", "/d/Kids Show/Season 2/01 - Seven.mkv", None, false),
            episode("d", "/d/Kids Show/Season 1/04 - Four.mkv", None, false),
            episode("a", "/d/Kids Show/Season 1/01 - One.mkv", None, true),
            episode("f", "/d/Kids Show/Season 1/06 - Six.mkv", None, false),
            episode("c", "/d/Kids Show/Season 1/03 - Three.mkv", None, false),
            episode("e", "/d/Kids Show/Season 1/05 - Five.mkv", None, false),
        ];
        episodes.reverse();

        let window = binge_window(&episodes, Some("b"), 5);
        let ids: Vec<&str> = window.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d", "e", "f", "g"]);
    }

    #[test]
    fn window_without_anchor_starts_at_first_unplayed() {
        let episodes = vec![
            episode("e1", "/d/Dark/S01E01.mkv", Some((1, 1)), true),
            episode("e2", "/d/Dark/S01E02.mkv", Some((1, 2)), true),
            episode("e3", "/d/Dark/S01E03.mkv", Some((1, 3)), false),
            episode("e4", "/d/Dark/S01E04.mkv", Some((1, 4)), false),
        ];
        let window = binge_window(&episodes, None, 1);
        let ids: Vec<&str> = window.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e4"]);
    }

    #[test]
    fn unorderable_episodes_are_dropped() {
        let episodes = vec![
            episode("e1", "/d/Dark/S01E01.mkv", Some((1, 1)), false),
            episode("junk", "/d/Dark/behind-the-scenes.mkv", None, false),
            episode("e2", "/d/Dark/S01E02.mkv", Some((1, 2)), false),
        ];
        let window = binge_window(&episodes, Some("e1"), 5);
        let ids: Vec<&str> = window.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
    }
}
