//! In-memory fakes shared by unit and integration tests.

use crate::execute::TransferTool;
use crate::fs::InMemoryFs;
use crate::gateway::{
    ApiItem, GatewayError, MediaServerApi, MediaSource, SessionInfo, UserData, VirtualFolder,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deckhand_model::{
    CycleConfig, Instance, LibraryKind, LibraryPolicy, OriginDiskPolicy, PathRule, UserRecord,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted gateway: answers from fixed tables, optionally unreachable.
#[derive(Debug, Default)]
pub struct StaticGateway {
    name: String,
    resume: Mutex<HashMap<String, Vec<ApiItem>>>,
    episodes: Mutex<HashMap<String, Vec<ApiItem>>>,
    favorites: Mutex<HashMap<String, Vec<ApiItem>>>,
    folders: Mutex<Vec<VirtualFolder>>,
    sessions: Mutex<Vec<SessionInfo>>,
    unreachable: AtomicBool,
}

impl StaticGateway {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn set_resume(&self, user: &str, items: Vec<ApiItem>) {
        self.resume.lock().unwrap().insert(user.to_string(), items);
    }

    pub fn set_episodes(&self, series: &str, items: Vec<ApiItem>) {
        self.episodes.lock().unwrap().insert(series.to_string(), items);
    }

    pub fn set_favorites(&self, user: &str, items: Vec<ApiItem>) {
        self.favorites.lock().unwrap().insert(user.to_string(), items);
    }

    pub fn set_folders(&self, folders: Vec<VirtualFolder>) {
        *self.folders.lock().unwrap() = folders;
    }

    /// Replace the active sessions with playback of the given reported
    /// paths.
    pub fn set_playing(&self, reported_paths: &[&str]) {
        let sessions = reported_paths
            .iter()
            .map(|path| SessionInfo {
                now_playing_item: Some(ApiItem {
                    id: format!("playing:{path}"),
                    media_sources: vec![MediaSource {
                        path: Some((*path).to_string()),
                    }],
                    ..ApiItem::default()
                }),
            })
            .collect();
        *self.sessions.lock().unwrap() = sessions;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), GatewayError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Status {
                status: 503,
                endpoint: format!("fake://{}", self.name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaServerApi for StaticGateway {
    fn instance_name(&self) -> &str {
        &self.name
    }

    async fn continue_watching(
        &self,
        user_id: &str,
        limit: usize,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiItem>, GatewayError> {
        self.check_reachable()?;
        let mut items = self
            .resume
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        items.truncate(limit);
        Ok(items)
    }

    async fn series_episodes(
        &self,
        _user_id: &str,
        series_id: &str,
    ) -> Result<Vec<ApiItem>, GatewayError> {
        self.check_reachable()?;
        Ok(self
            .episodes
            .lock()
            .unwrap()
            .get(series_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn favorite_series(&self, user_id: &str) -> Result<Vec<ApiItem>, GatewayError> {
        self.check_reachable()?;
        Ok(self
            .favorites
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn virtual_folders(&self) -> Result<Vec<VirtualFolder>, GatewayError> {
        self.check_reachable()?;
        Ok(self.folders.lock().unwrap().clone())
    }

    async fn active_sessions(&self) -> Result<Vec<SessionInfo>, GatewayError> {
        self.check_reachable()?;
        Ok(self.sessions.lock().unwrap().clone())
    }
}

/// Transfer tool that copies inside an [`InMemoryFs`], with optional
/// injected failures.
#[derive(Debug)]
pub struct InMemoryTransfer {
    fs: Arc<InMemoryFs>,
    fail: Mutex<BTreeSet<PathBuf>>,
}

impl InMemoryTransfer {
    pub fn new(fs: Arc<InMemoryFs>) -> Self {
        Self {
            fs,
            fail: Mutex::new(BTreeSet::new()),
        }
    }

    /// Make every copy from `src` fail.
    pub fn fail_on(&self, src: impl Into<PathBuf>) {
        self.fail.lock().unwrap().insert(src.into());
    }
}

#[async_trait]
impl TransferTool for InMemoryTransfer {
    async fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        use crate::fs::FileSystem;
        if self.fail.lock().unwrap().contains(src) {
            return Err(io::Error::other(format!(
                "injected copy failure for {}",
                src.display()
            )));
        }
        let Some(size) = self.fs.file_size(src).await else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", src.display()),
            ));
        };
        self.fs.add_file(dst, size);
        Ok(())
    }
}

pub fn test_instance(name: &str, rules: &[(&str, &str)]) -> Instance {
    Instance {
        name: name.to_string(),
        url: format!("http://{}.local:8096", name.to_lowercase()),
        api_key: "test-key".to_string(),
        path_rules: rules
            .iter()
            .map(|(prefix, replacement)| PathRule::new(*prefix, *replacement))
            .collect(),
    }
}

pub fn test_user(
    id: &str,
    instance: &str,
    library: &str,
    kind: LibraryKind,
    max_items: usize,
    lookahead: u32,
) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        display_name: id.to_string(),
        instance: instance.to_string(),
        libraries: BTreeMap::from([(
            library.to_string(),
            LibraryPolicy {
                kind,
                max_items,
                lookahead,
            },
        )]),
        include_favorites: false,
    }
}

/// A cycle snapshot over the stock tier layout, with state files pointed
/// at `state_dir`.
pub fn test_config_in(
    state_dir: &Path,
    instances: Vec<Instance>,
    users: Vec<UserRecord>,
) -> CycleConfig {
    CycleConfig {
        cache_root: PathBuf::from("/mnt/cache"),
        array_root: PathBuf::from("/mnt/user0"),
        user_root: PathBuf::from("/mnt/user"),
        disk_roots: vec![PathBuf::from("/mnt/disk1"), PathBuf::from("/mnt/disk2")],
        min_free_bytes: 0,
        days_to_monitor: None,
        fetch_parallelism: 2,
        evict_parallelism: 2,
        origin_disk_policy: OriginDiskPolicy::Restore,
        exclude_file: state_dir.join("deckhand_exclude.txt"),
        origin_file: state_dir.join("deckhand_origins.json"),
        instance_sets_file: state_dir.join("deckhand_instance_sets.json"),
        instances,
        users,
    }
}

pub fn test_config(instances: Vec<Instance>, users: Vec<UserRecord>) -> CycleConfig {
    test_config_in(Path::new("/tmp/deckhand-test-state"), instances, users)
}

pub fn movie_item(id: &str, path: &str) -> ApiItem {
    ApiItem {
        id: id.to_string(),
        item_type: Some("Movie".to_string()),
        media_sources: vec![MediaSource {
            path: Some(path.to_string()),
        }],
        ..ApiItem::default()
    }
}

pub fn episode_item(
    id: &str,
    series: &str,
    path: &str,
    key: Option<(u32, u32)>,
    played: bool,
) -> ApiItem {
    ApiItem {
        id: id.to_string(),
        item_type: Some("Episode".to_string()),
        series_id: Some(series.to_string()),
        media_sources: vec![MediaSource {
            path: Some(path.to_string()),
        }],
        parent_index_number: key.map(|(season, _)| season),
        index_number: key.map(|(_, episode)| episode),
        user_data: Some(UserData {
            played,
            last_played_date: None,
        }),
        ..ApiItem::default()
    }
}

pub fn series_item(id: &str) -> ApiItem {
    ApiItem {
        id: id.to_string(),
        item_type: Some("Series".to_string()),
        ..ApiItem::default()
    }
}
