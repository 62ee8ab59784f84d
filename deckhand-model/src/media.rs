use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Series ordering key: season and episode number.
///
/// Ordering derives from `(season, episode)` so binge lookahead walks
/// episodes in broadcast order regardless of filename or folder listing
/// order, which is not guaranteed monotonic across season-subfolder
/// layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub season: u32,
    pub episode: u32,
}

impl EpisodeKey {
    pub fn new(season: u32, episode: u32) -> Self {
        Self { season, episode }
    }

    /// Season 0 is the specials bucket.
    pub fn is_special(&self) -> bool {
        self.season == 0
    }
}

impl std::fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.episode)
    }
}

/// A media file as seen during working-set assembly.
///
/// `physical_path` is the translated path under the union share root;
/// `None` means the server-reported path matched no mapping rule and the
/// entry must be dropped before it reaches the working set - never
/// silently substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub reported_path: String,
    pub physical_path: Option<PathBuf>,
    pub library: String,
    pub episode: Option<EpisodeKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_keys_order_by_season_then_episode() {
        let mut keys = vec![
            EpisodeKey::new(2, 1),
            EpisodeKey::new(1, 10),
            EpisodeKey::new(1, 2),
            EpisodeKey::new(0, 5),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                EpisodeKey::new(0, 5),
                EpisodeKey::new(1, 2),
                EpisodeKey::new(1, 10),
                EpisodeKey::new(2, 1),
            ]
        );
    }
}
