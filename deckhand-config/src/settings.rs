use deckhand_model::{
    CycleConfig, Instance, LibraryPolicy, OriginDiskPolicy, PathRule, UserRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings document {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("/mnt/cache")
}

fn default_array_root() -> PathBuf {
    PathBuf::from("/mnt/user0")
}

fn default_user_root() -> PathBuf {
    PathBuf::from("/mnt/user")
}

fn default_min_free_bytes() -> u64 {
    // 10 GiB headroom before a copy is refused.
    10 * 1024 * 1024 * 1024
}

fn default_fetch_parallelism() -> usize {
    5
}

fn default_evict_parallelism() -> usize {
    2
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

/// One prefix-mapping rule as written by the wizard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRuleSettings {
    pub prefix: String,
    pub replacement: String,
}

/// One media-server instance as written by the wizard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSettings {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub path_rules: Vec<PathRuleSettings>,
}

/// Per-library policy entry inside a user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryPolicySettings {
    pub kind: deckhand_model::LibraryKind,
    pub max_items: usize,
    #[serde(default)]
    pub lookahead: u32,
}

/// One monitored user as written by the wizard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub instance: String,
    #[serde(default)]
    pub libraries: BTreeMap<String, LibraryPolicySettings>,
    #[serde(default)]
    pub include_favorites: bool,
}

/// The wizard-produced settings document.
///
/// Read-only input at cycle start. Fields the wizard may omit carry
/// defaults matching a stock Unraid layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache_root: PathBuf,
    pub array_root: PathBuf,
    pub user_root: PathBuf,
    pub disk_roots: Vec<PathBuf>,
    pub min_free_bytes: u64,
    pub days_to_monitor: Option<i64>,
    pub max_concurrent_fetches: usize,
    pub max_concurrent_evictions: usize,
    pub origin_disk_policy: OriginDiskPolicy,
    pub state_dir: PathBuf,
    pub instances: Vec<InstanceSettings>,
    pub users: Vec<UserSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            array_root: default_array_root(),
            user_root: default_user_root(),
            disk_roots: Vec::new(),
            min_free_bytes: default_min_free_bytes(),
            days_to_monitor: None,
            max_concurrent_fetches: default_fetch_parallelism(),
            max_concurrent_evictions: default_evict_parallelism(),
            origin_disk_policy: OriginDiskPolicy::default(),
            state_dir: default_state_dir(),
            instances: Vec::new(),
            users: Vec::new(),
        }
    }
}

impl Settings {
    /// Load the settings document from disk.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        debug!(path = %path.display(), "loading settings document");
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Convert into the immutable per-cycle snapshot the engine consumes.
    ///
    /// Call [`Settings::validate`](crate::validate) first; this conversion
    /// assumes a structurally sound document.
    pub fn snapshot(&self) -> CycleConfig {
        let instances = self
            .instances
            .iter()
            .map(|inst| Instance {
                name: inst.name.clone(),
                url: inst.url.trim_end_matches('/').to_string(),
                api_key: inst.api_key.clone(),
                path_rules: inst
                    .path_rules
                    .iter()
                    .map(|rule| PathRule::new(rule.prefix.clone(), rule.replacement.clone()))
                    .collect(),
            })
            .collect();

        let users = self
            .users
            .iter()
            .map(|user| UserRecord {
                id: user.id.clone(),
                display_name: if user.name.is_empty() {
                    user.id.clone()
                } else {
                    user.name.clone()
                },
                instance: user.instance.clone(),
                libraries: user
                    .libraries
                    .iter()
                    .map(|(name, policy)| {
                        (
                            name.clone(),
                            LibraryPolicy {
                                kind: policy.kind,
                                max_items: policy.max_items,
                                // Lookahead is meaningless for movie
                                // libraries; zero it so downstream code
                                // never has to re-check the kind.
                                lookahead: match policy.kind {
                                    deckhand_model::LibraryKind::Movies => 0,
                                    deckhand_model::LibraryKind::Series => policy.lookahead,
                                },
                            },
                        )
                    })
                    .collect(),
                include_favorites: user.include_favorites,
            })
            .collect();

        CycleConfig {
            cache_root: self.cache_root.clone(),
            array_root: self.array_root.clone(),
            user_root: self.user_root.clone(),
            disk_roots: self.disk_roots.clone(),
            min_free_bytes: self.min_free_bytes,
            days_to_monitor: self.days_to_monitor,
            fetch_parallelism: self.max_concurrent_fetches.max(1),
            evict_parallelism: self.max_concurrent_evictions.max(1),
            origin_disk_policy: self.origin_disk_policy,
            exclude_file: self.state_dir.join("deckhand_exclude.txt"),
            origin_file: self.state_dir.join("deckhand_origins.json"),
            instance_sets_file: self.state_dir.join("deckhand_instance_sets.json"),
            instances,
            users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_model::LibraryKind;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "cache_root": "/mnt/cache",
        "array_root": "/mnt/user0",
        "user_root": "/mnt/user",
        "disk_roots": ["/mnt/disk1", "/mnt/disk2"],
        "min_free_bytes": 1073741824,
        "max_concurrent_fetches": 4,
        "instances": [
            {
                "name": "HomeServer",
                "url": "http://10.0.0.2:8096/",
                "api_key": "abc123",
                "path_rules": [
                    {"prefix": "/data/Serien", "replacement": "/mnt/user/Serien"},
                    {"prefix": "/data", "replacement": "/mnt/user"}
                ]
            }
        ],
        "users": [
            {
                "id": "u1",
                "name": "Papa",
                "instance": "HomeServer",
                "libraries": {
                    "Filme": {"kind": "movies", "max_items": 5, "lookahead": 9},
                    "Serien": {"kind": "series", "max_items": 3, "lookahead": 5}
                }
            }
        ]
    }"#;

    #[test]
    fn loads_a_wizard_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.instances.len(), 1);
        assert_eq!(settings.users.len(), 1);
        assert_eq!(settings.max_concurrent_fetches, 4);
        // Omitted fields fall back to defaults.
        assert_eq!(settings.max_concurrent_evictions, 2);
        assert_eq!(settings.origin_disk_policy, OriginDiskPolicy::Restore);
    }

    #[test]
    fn snapshot_strips_trailing_slash_and_zeroes_movie_lookahead() {
        let settings: Settings = serde_json::from_str(SAMPLE).unwrap();
        let config = settings.snapshot();
        assert_eq!(config.instances[0].url, "http://10.0.0.2:8096");
        let user = &config.users[0];
        let movies = &user.libraries["Filme"];
        assert_eq!(movies.kind, LibraryKind::Movies);
        assert_eq!(movies.lookahead, 0, "movie lookahead is ignored");
        assert_eq!(user.libraries["Serien"].lookahead, 5);
        assert_eq!(
            config.exclude_file,
            PathBuf::from("./deckhand_exclude.txt")
        );
    }

    #[test]
    fn missing_document_is_a_read_error() {
        let err = Settings::load(Path::new("/nonexistent/deckhand_settings.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = Settings::load(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }
}
