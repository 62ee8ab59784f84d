//! Plan execution.
//!
//! Two modes: **report** computes and logs the plan without touching
//! anything; **apply** executes it. Evictions complete before any fetch
//! starts - a hard ordering guarantee so space is reclaimed first, not a
//! performance hint. Each operation re-checks protection immediately
//! before acting, because playback can start between planning and
//! execution; a newly protected file is skipped and logged, never an
//! error. A failed transfer leaves the resident index unchanged for that
//! path so the next cycle retries.

use crate::error::Result;
use crate::fs::FileSystem;
use crate::protect::SessionProtector;
use crate::state::{ResidentIndex, StateStore};
use async_trait::async_trait;
use deckhand_model::{CycleConfig, MoveOp, MovePlan, OriginDiskPolicy, SkipReason};
use futures::future::join_all;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Compute and display only; touch nothing. This is the default.
    Report,
    /// Execute the plan.
    Apply,
}

/// The external copy primitive (rsync in production).
#[async_trait]
pub trait TransferTool: Send + Sync {
    /// Copy `src` to `dst`, preserving attributes. The destination parent
    /// directory exists when this is called.
    async fn copy(&self, src: &Path, dst: &Path) -> io::Result<()>;
}

/// Shells out to `rsync -a` the way the surrounding platform tooling
/// does.
#[derive(Debug, Default)]
pub struct RsyncTransfer;

impl RsyncTransfer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransferTool for RsyncTransfer {
    async fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let status = tokio::process::Command::new("rsync")
            .arg("-a")
            .arg("-q")
            .arg(src)
            .arg(dst)
            .status()
            .await?;
        if !status.success() {
            return Err(io::Error::other(format!(
                "rsync exited with {status} copying {}",
                src.display()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub evicted: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_to_cache: u64,
    pub bytes_to_array: u64,
}

/// Result of one attempted operation, applied to the index afterwards.
#[derive(Debug)]
enum OpOutcome {
    Evicted { path: PathBuf, bytes: u64 },
    Fetched {
        path: PathBuf,
        origin: Option<String>,
        bytes: u64,
    },
    /// The cache copy vanished since the index was written; the entry is
    /// stale and gets dropped.
    EvictSourceGone { path: PathBuf },
    Skipped { path: PathBuf, reason: SkipReason },
    Failed { path: PathBuf },
}

pub struct MoveExecutor {
    config: Arc<CycleConfig>,
    fs: Arc<dyn FileSystem>,
    transfer: Arc<dyn TransferTool>,
    protector: Arc<SessionProtector>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for MoveExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveExecutor")
            .field("evict_parallelism", &self.config.evict_parallelism)
            .field("fetch_parallelism", &self.config.fetch_parallelism)
            .finish()
    }
}

impl MoveExecutor {
    pub fn new(
        config: Arc<CycleConfig>,
        fs: Arc<dyn FileSystem>,
        transfer: Arc<dyn TransferTool>,
        protector: Arc<SessionProtector>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            fs,
            transfer,
            protector,
            cancel,
        }
    }

    pub async fn run(
        &self,
        plan: &MovePlan,
        index: &mut ResidentIndex,
        store: &StateStore,
        mode: ExecMode,
    ) -> Result<ExecutionSummary> {
        match mode {
            ExecMode::Report => Ok(self.report(plan).await),
            ExecMode::Apply => self.apply(plan, index, store).await,
        }
    }

    /// Log every planned operation with its reason; no side effects.
    async fn report(&self, plan: &MovePlan) -> ExecutionSummary {
        let mut summary = ExecutionSummary::default();
        for op in &plan.evictions {
            let path = op.path();
            let bytes = match self.config.cache_path(path) {
                Some(src) => self.fs.file_size(&src).await.unwrap_or(0),
                None => 0,
            };
            info!(
                path = %path.display(),
                bytes,
                "would evict: no longer on deck"
            );
            summary.evicted += 1;
            summary.bytes_to_array += bytes;
        }
        for op in &plan.fetches {
            let path = op.path();
            let bytes = match self.config.array_path(path) {
                Some(src) => self.fs.file_size(&src).await.unwrap_or(0),
                None => 0,
            };
            info!(
                path = %path.display(),
                bytes,
                "would fetch: on deck, not resident"
            );
            summary.fetched += 1;
            summary.bytes_to_cache += bytes;
        }
        summary
    }

    async fn apply(
        &self,
        plan: &MovePlan,
        index: &mut ResidentIndex,
        store: &StateStore,
    ) -> Result<ExecutionSummary> {
        let mut summary = ExecutionSummary::default();

        // Evictions must finish before any fetch launches.
        let outcomes = self
            .run_phase(&plan.evictions, self.config.evict_parallelism)
            .await;
        self.absorb(outcomes, index, &mut summary);
        store.save(index)?;

        let outcomes = self
            .run_phase(&plan.fetches, self.config.fetch_parallelism)
            .await;
        self.absorb(outcomes, index, &mut summary);
        store.save(index)?;

        info!(
            evicted = summary.evicted,
            fetched = summary.fetched,
            skipped = summary.skipped,
            failed = summary.failed,
            bytes_to_cache = summary.bytes_to_cache,
            bytes_to_array = summary.bytes_to_array,
            "apply phase complete"
        );
        Ok(summary)
    }

    async fn run_phase(&self, ops: &[MoveOp], parallelism: usize) -> Vec<OpOutcome> {
        let limiter = Semaphore::new(parallelism.max(1));
        let tasks = ops.iter().map(|op| {
            let limiter = &limiter;
            async move {
                let _permit = limiter.acquire().await.expect("semaphore never closes");
                self.apply_op(op).await
            }
        });
        join_all(tasks).await
    }

    async fn apply_op(&self, op: &MoveOp) -> OpOutcome {
        let path = op.path().to_path_buf();

        // Interrupt: stop launching, let in-flight operations finish.
        if self.cancel.is_cancelled() {
            info!(path = %path.display(), "not launched: cancelled");
            return OpOutcome::Skipped {
                path,
                reason: SkipReason::Cancelled,
            };
        }

        // Protection is stale the moment it is taken; re-query right
        // before acting.
        let protection = self.protector.snapshot().await;
        if protection.contains(&path) {
            info!(path = %path.display(), "skipping: started playing since planning");
            return OpOutcome::Skipped {
                path,
                reason: SkipReason::NowPlaying,
            };
        }

        match op {
            MoveOp::Evict { path, origin } => self.evict(path, origin.as_deref()).await,
            MoveOp::Fetch { path } => self.fetch(path).await,
        }
    }

    /// Copy cache -> array (origin disk when policy and label allow),
    /// verify, delete the cache copy, tidy empty directories.
    async fn evict(&self, path: &Path, origin: Option<&str>) -> OpOutcome {
        let path_buf = path.to_path_buf();
        let Some(src) = self.config.cache_path(path) else {
            warn!(path = %path.display(), "resident entry outside the share root");
            return OpOutcome::Skipped {
                path: path_buf,
                reason: SkipReason::MissingSource,
            };
        };
        let Some(size) = self.fs.file_size(&src).await else {
            warn!(path = %path.display(), "cache copy already gone; dropping stale index entry");
            return OpOutcome::EvictSourceGone { path: path_buf };
        };

        let write_back = self.config.origin_disk_policy == OriginDiskPolicy::Restore;
        let dst = match origin.filter(|_| write_back).and_then(|label| {
            self.config
                .disk_root_for(label)
                .and_then(|root| self.config.disk_path(root, path))
        }) {
            Some(dst) => dst,
            None => match self.config.array_path(path) {
                Some(dst) => dst,
                None => {
                    return OpOutcome::Skipped {
                        path: path_buf,
                        reason: SkipReason::MissingSource,
                    };
                }
            },
        };

        if !self.has_room(&dst, size).await {
            warn!(path = %path.display(), dst = %dst.display(), "not evicting: destination too full");
            return OpOutcome::Skipped {
                path: path_buf,
                reason: SkipReason::InsufficientSpace,
            };
        }

        if let Err(err) = self.prepare_and_copy(&src, &dst, size).await {
            error!(path = %path.display(), error = %err, "evict copy failed; index unchanged");
            return OpOutcome::Failed { path: path_buf };
        }
        if let Err(err) = self.fs.remove_file(&src).await {
            error!(path = %path.display(), error = %err, "could not delete cache copy; index unchanged");
            return OpOutcome::Failed { path: path_buf };
        }
        if let Some(parent) = src.parent() {
            self.cleanup_empty_dirs(parent, &self.config.cache_root).await;
        }

        info!(path = %path.display(), dst = %dst.display(), bytes = size, "evicted");
        OpOutcome::Evicted {
            path: path_buf,
            bytes: size,
        }
    }

    /// Copy array -> cache and verify; the array copy stays in place and
    /// the owning disk is recorded for later write-back.
    async fn fetch(&self, path: &Path) -> OpOutcome {
        let path_buf = path.to_path_buf();

        // Probe the physical disks first so the origin label is known;
        // fall back to the array view for setups without disk_roots.
        let mut src = None;
        let mut origin = None;
        for root in &self.config.disk_roots {
            if let Some(candidate) = self.config.disk_path(root, path) {
                if self.fs.is_file(&candidate).await {
                    origin = root
                        .file_name()
                        .and_then(|name| name.to_str())
                        .map(String::from);
                    src = Some(candidate);
                    break;
                }
            }
        }
        if src.is_none()
            && let Some(candidate) = self.config.array_path(path)
            && self.fs.is_file(&candidate).await
        {
            src = Some(candidate);
        }
        let Some(src) = src else {
            warn!(path = %path.display(), "fetch source not found on the array");
            return OpOutcome::Skipped {
                path: path_buf,
                reason: SkipReason::MissingSource,
            };
        };
        let Some(size) = self.fs.file_size(&src).await else {
            return OpOutcome::Skipped {
                path: path_buf,
                reason: SkipReason::MissingSource,
            };
        };
        let Some(dst) = self.config.cache_path(path) else {
            return OpOutcome::Skipped {
                path: path_buf,
                reason: SkipReason::MissingSource,
            };
        };

        if !self.has_room(&dst, size).await {
            warn!(path = %path.display(), "not fetching: cache too full");
            return OpOutcome::Skipped {
                path: path_buf,
                reason: SkipReason::InsufficientSpace,
            };
        }

        if let Err(err) = self.prepare_and_copy(&src, &dst, size).await {
            error!(path = %path.display(), error = %err, "fetch copy failed; index unchanged");
            return OpOutcome::Failed { path: path_buf };
        }

        info!(
            path = %path.display(),
            origin = origin.as_deref().unwrap_or("auto"),
            bytes = size,
            "fetched"
        );
        OpOutcome::Fetched {
            path: path_buf,
            origin,
            bytes: size,
        }
    }

    /// Create the destination parent, copy, and verify the copied size.
    /// A partial destination is removed best-effort on failure.
    async fn prepare_and_copy(&self, src: &Path, dst: &Path, size: u64) -> io::Result<()> {
        if let Some(parent) = dst.parent() {
            self.fs.create_dir_all(parent).await?;
        }
        self.transfer.copy(src, dst).await?;
        let copied = self.fs.file_size(dst).await;
        if copied != Some(size) {
            let _ = self.fs.remove_file(dst).await;
            return Err(io::Error::other(format!(
                "size mismatch after copy: expected {size}, found {copied:?}"
            )));
        }
        Ok(())
    }

    /// Destination must keep `min_free_bytes` of headroom after the copy.
    /// Unknown free space is not a reason to refuse.
    async fn has_room(&self, dst: &Path, size: u64) -> bool {
        let probe = dst.parent().unwrap_or(dst);
        match self.fs.free_space(probe).await {
            Some(free) => free >= size.saturating_add(self.config.min_free_bytes),
            None => {
                debug!(dst = %dst.display(), "free space unknown; proceeding");
                true
            }
        }
    }

    /// Climb from `start` removing empty directories, stopping at the
    /// tier root's top-level share folders, which are never removed.
    async fn cleanup_empty_dirs(&self, start: &Path, root: &Path) {
        let mut current = Some(start.to_path_buf());
        while let Some(dir) = current {
            let Ok(rel) = dir.strip_prefix(root) else {
                break;
            };
            if rel.components().count() <= 1 {
                break;
            }
            match self.fs.remove_dir_if_empty(&dir).await {
                Ok(true) => {
                    debug!(dir = %dir.display(), "removed empty directory");
                    current = dir.parent().map(Path::to_path_buf);
                }
                _ => break,
            }
        }
    }

    fn absorb(
        &self,
        outcomes: Vec<OpOutcome>,
        index: &mut ResidentIndex,
        summary: &mut ExecutionSummary,
    ) {
        for outcome in outcomes {
            match outcome {
                OpOutcome::Evicted { path, bytes } => {
                    index.remove(&path);
                    summary.evicted += 1;
                    summary.bytes_to_array += bytes;
                }
                OpOutcome::EvictSourceGone { path } => {
                    index.remove(&path);
                    summary.skipped += 1;
                }
                OpOutcome::Fetched {
                    path,
                    origin,
                    bytes,
                } => {
                    index.insert(path, origin);
                    summary.fetched += 1;
                    summary.bytes_to_cache += bytes;
                }
                OpOutcome::Skipped { .. } => summary.skipped += 1,
                OpOutcome::Failed { .. } => summary.failed += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use crate::testing::{test_config_in, test_instance, test_user, InMemoryTransfer, StaticGateway};
    use deckhand_model::LibraryKind;

    struct Rig {
        fs: Arc<InMemoryFs>,
        transfer: Arc<InMemoryTransfer>,
        gateway: Arc<StaticGateway>,
        executor: MoveExecutor,
        store: StateStore,
        _state_dir: tempfile::TempDir,
    }

    fn rig() -> Rig {
        let state_dir = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config_in(
            state_dir.path(),
            vec![test_instance("HomeServer", &[("/data", "/mnt/user")])],
            vec![test_user("papa", "HomeServer", "Filme", LibraryKind::Movies, 5, 0)],
        ));
        let fs = Arc::new(InMemoryFs::new());
        let transfer = Arc::new(InMemoryTransfer::new(fs.clone()));
        let gateway = Arc::new(StaticGateway::new("HomeServer"));
        let protector = Arc::new(SessionProtector::new(
            &config,
            vec![gateway.clone() as Arc<dyn crate::gateway::MediaServerApi>],
        ));
        let executor = MoveExecutor::new(
            config.clone(),
            fs.clone(),
            transfer.clone(),
            protector,
            CancellationToken::new(),
        );
        let store = StateStore::new(&config);
        store.init(false).unwrap();
        Rig {
            fs,
            transfer,
            gateway,
            executor,
            store,
            _state_dir: state_dir,
        }
    }

    fn evict(path: &str, origin: Option<&str>) -> MoveOp {
        MoveOp::Evict {
            path: PathBuf::from(path),
            origin: origin.map(String::from),
        }
    }

    fn fetch(path: &str) -> MoveOp {
        MoveOp::Fetch {
            path: PathBuf::from(path),
        }
    }

    #[tokio::test]
    async fn report_mode_touches_nothing() {
        let rig = rig();
        rig.fs.add_file("/mnt/cache/Filme/Stale/Stale.mkv", 70);
        rig.fs.add_file("/mnt/user0/Filme/Heat/Heat.mkv", 30);

        let plan = MovePlan::new(
            vec![evict("/mnt/user/Filme/Stale/Stale.mkv", None)],
            vec![fetch("/mnt/user/Filme/Heat/Heat.mkv")],
        );
        let mut index = rig.store.load().unwrap();
        let summary = rig
            .executor
            .run(&plan, &mut index, &rig.store, ExecMode::Report)
            .await
            .unwrap();

        assert_eq!(summary.evicted, 1);
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.bytes_to_array, 70);
        assert_eq!(summary.bytes_to_cache, 30);
        // Nothing moved, nothing persisted.
        assert!(rig.fs.contains(Path::new("/mnt/cache/Filme/Stale/Stale.mkv")));
        assert!(!rig.fs.contains(Path::new("/mnt/cache/Filme/Heat/Heat.mkv")));
        assert!(rig.store.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_moves_both_directions_and_persists() {
        let rig = rig();
        rig.fs.add_file("/mnt/cache/Filme/Stale/Stale.mkv", 70);
        rig.fs.add_file("/mnt/disk2/Filme/Heat/Heat.mkv", 30);

        let mut index = ResidentIndex::default();
        index.insert(PathBuf::from("/mnt/user/Filme/Stale/Stale.mkv"), None);

        let plan = MovePlan::new(
            vec![evict("/mnt/user/Filme/Stale/Stale.mkv", None)],
            vec![fetch("/mnt/user/Filme/Heat/Heat.mkv")],
        );
        let summary = rig
            .executor
            .run(&plan, &mut index, &rig.store, ExecMode::Apply)
            .await
            .unwrap();

        assert_eq!(summary.evicted, 1);
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.failed, 0);

        // Evict: copied to the array view, cache copy gone.
        assert!(rig.fs.contains(Path::new("/mnt/user0/Filme/Stale/Stale.mkv")));
        assert!(!rig.fs.contains(Path::new("/mnt/cache/Filme/Stale/Stale.mkv")));
        // Fetch: cache copy present, array copy left in place.
        assert!(rig.fs.contains(Path::new("/mnt/cache/Filme/Heat/Heat.mkv")));
        assert!(rig.fs.contains(Path::new("/mnt/disk2/Filme/Heat/Heat.mkv")));

        // Index updated and persisted, with the origin disk recorded.
        let loaded = rig.store.load().unwrap();
        assert!(loaded.contains(Path::new("/mnt/user/Filme/Heat/Heat.mkv")));
        assert!(!loaded.contains(Path::new("/mnt/user/Filme/Stale/Stale.mkv")));
        assert_eq!(
            loaded.origin_of(Path::new("/mnt/user/Filme/Heat/Heat.mkv")),
            Some("disk2")
        );
    }

    #[tokio::test]
    async fn evict_writes_back_to_the_origin_disk() {
        let rig = rig();
        rig.fs.add_file("/mnt/cache/Filme/Heat/Heat.mkv", 30);

        let mut index = ResidentIndex::default();
        index.insert(
            PathBuf::from("/mnt/user/Filme/Heat/Heat.mkv"),
            Some("disk2".into()),
        );
        let plan = MovePlan::new(
            vec![evict("/mnt/user/Filme/Heat/Heat.mkv", Some("disk2"))],
            Vec::new(),
        );
        rig.executor
            .run(&plan, &mut index, &rig.store, ExecMode::Apply)
            .await
            .unwrap();

        assert!(rig.fs.contains(Path::new("/mnt/disk2/Filme/Heat/Heat.mkv")));
        assert!(!rig.fs.contains(Path::new("/mnt/user0/Filme/Heat/Heat.mkv")));
    }

    #[tokio::test]
    async fn protection_race_skips_the_operation() {
        let rig = rig();
        rig.fs.add_file("/mnt/cache/Filme/Heat/Heat.mkv", 30);
        let mut index = ResidentIndex::default();
        index.insert(PathBuf::from("/mnt/user/Filme/Heat/Heat.mkv"), None);

        // Playback starts after the plan was computed.
        rig.gateway.set_playing(&["/data/Filme/Heat/Heat.mkv"]);

        let plan = MovePlan::new(
            vec![evict("/mnt/user/Filme/Heat/Heat.mkv", None)],
            Vec::new(),
        );
        let summary = rig
            .executor
            .run(&plan, &mut index, &rig.store, ExecMode::Apply)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.evicted, 0);
        assert!(rig.fs.contains(Path::new("/mnt/cache/Filme/Heat/Heat.mkv")));
        assert!(index.contains(Path::new("/mnt/user/Filme/Heat/Heat.mkv")));
    }

    #[tokio::test]
    async fn failed_copy_leaves_the_index_unchanged() {
        let rig = rig();
        rig.fs.add_file("/mnt/cache/Filme/Stale/Stale.mkv", 70);
        rig.transfer.fail_on("/mnt/cache/Filme/Stale/Stale.mkv");

        let mut index = ResidentIndex::default();
        index.insert(PathBuf::from("/mnt/user/Filme/Stale/Stale.mkv"), None);

        let plan = MovePlan::new(
            vec![evict("/mnt/user/Filme/Stale/Stale.mkv", None)],
            Vec::new(),
        );
        let summary = rig
            .executor
            .run(&plan, &mut index, &rig.store, ExecMode::Apply)
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        // Still resident on cache and still in the index: retried next cycle.
        assert!(rig.fs.contains(Path::new("/mnt/cache/Filme/Stale/Stale.mkv")));
        assert!(index.contains(Path::new("/mnt/user/Filme/Stale/Stale.mkv")));
    }

    #[tokio::test]
    async fn insufficient_space_refuses_the_fetch() {
        let rig = rig();
        rig.fs.add_file("/mnt/user0/Filme/Heat/Heat.mkv", 1000);
        rig.fs.set_free_space("/mnt/cache", 100);

        let mut index = ResidentIndex::default();
        let plan = MovePlan::new(Vec::new(), vec![fetch("/mnt/user/Filme/Heat/Heat.mkv")]);
        let summary = rig
            .executor
            .run(&plan, &mut index, &rig.store, ExecMode::Apply)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert!(!rig.fs.contains(Path::new("/mnt/cache/Filme/Heat/Heat.mkv")));
    }

    #[tokio::test]
    async fn vanished_cache_copy_drops_the_stale_entry() {
        let rig = rig();
        let mut index = ResidentIndex::default();
        index.insert(PathBuf::from("/mnt/user/Filme/Gone/Gone.mkv"), None);

        let plan = MovePlan::new(vec![evict("/mnt/user/Filme/Gone/Gone.mkv", None)], Vec::new());
        let summary = rig
            .executor
            .run(&plan, &mut index, &rig.store, ExecMode::Apply)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert!(!index.contains(Path::new("/mnt/user/Filme/Gone/Gone.mkv")));
    }

    #[tokio::test]
    async fn evict_cleans_up_empty_directories_but_keeps_share_roots() {
        let rig = rig();
        rig.fs
            .add_file("/mnt/cache/Serien/Dark/Season 1/S01E01.mkv", 10);
        let mut index = ResidentIndex::default();
        index.insert(
            PathBuf::from("/mnt/user/Serien/Dark/Season 1/S01E01.mkv"),
            None,
        );

        let plan = MovePlan::new(
            vec![evict("/mnt/user/Serien/Dark/Season 1/S01E01.mkv", None)],
            Vec::new(),
        );
        rig.executor
            .run(&plan, &mut index, &rig.store, ExecMode::Apply)
            .await
            .unwrap();

        // Season and show folders emptied out and were removed; the
        // top-level share folder stays.
        let remaining = rig.fs.file_paths();
        assert_eq!(
            remaining,
            vec![PathBuf::from("/mnt/user0/Serien/Dark/Season 1/S01E01.mkv")]
        );
        assert!(!rig
            .fs
            .remove_dir_if_empty(Path::new("/mnt/cache/Serien/Dark"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn cancellation_stops_new_operations() {
        let state_dir = tempfile::tempdir().unwrap();
        let config = Arc::new(test_config_in(
            state_dir.path(),
            vec![test_instance("HomeServer", &[("/data", "/mnt/user")])],
            vec![],
        ));
        let fs = Arc::new(InMemoryFs::new());
        let transfer = Arc::new(InMemoryTransfer::new(fs.clone()));
        let gateway: Arc<dyn crate::gateway::MediaServerApi> =
            Arc::new(StaticGateway::new("HomeServer"));
        let protector = Arc::new(SessionProtector::new(&config, vec![gateway]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let executor = MoveExecutor::new(config.clone(), fs.clone(), transfer, protector, cancel);
        let store = StateStore::new(&config);
        store.init(false).unwrap();

        fs.add_file("/mnt/cache/Filme/Stale/Stale.mkv", 70);
        let mut index = ResidentIndex::default();
        index.insert(PathBuf::from("/mnt/user/Filme/Stale/Stale.mkv"), None);

        let plan = MovePlan::new(
            vec![evict("/mnt/user/Filme/Stale/Stale.mkv", None)],
            Vec::new(),
        );
        let summary = executor
            .run(&plan, &mut index, &store, ExecMode::Apply)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert!(fs.contains(Path::new("/mnt/cache/Filme/Stale/Stale.mkv")));
    }
}
