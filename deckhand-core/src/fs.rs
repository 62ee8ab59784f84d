//! Minimal async filesystem seam used by the working-set builder, the
//! orphan sweep, and the move executor.
//!
//! Mirrors only what the engine needs: existence/size probes, listing,
//! deep walks, removal, and free-space queries. `RealFs` is backed by
//! `tokio::fs`; `InMemoryFs` backs tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn is_file(&self, path: &Path) -> bool;

    /// Size in bytes, or `None` if the path is not a regular file.
    async fn file_size(&self, path: &Path) -> Option<u64>;

    /// Immediate children of a directory (files and directories).
    async fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Every regular file below `root`, in stable (lexical) order.
    async fn walk_files(&self, root: &Path) -> io::Result<Vec<PathBuf>>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove `path` if it is an empty directory. Returns whether it was
    /// removed; a missing or non-empty directory is not an error.
    async fn remove_dir_if_empty(&self, path: &Path) -> io::Result<bool>;

    /// Free bytes on the filesystem holding `path`, or `None` when the
    /// platform cannot tell.
    async fn free_space(&self, path: &Path) -> Option<u64>;
}

/// Real filesystem backed by `tokio::fs`.
#[derive(Debug, Default)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for RealFs {
    async fn is_file(&self, path: &Path) -> bool {
        tokio::fs::metadata(path)
            .await
            .map(|md| md.is_file())
            .unwrap_or(false)
    }

    async fn file_size(&self, path: &Path) -> Option<u64> {
        let md = tokio::fs::metadata(path).await.ok()?;
        md.is_file().then_some(md.len())
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut rd = tokio::fs::read_dir(path).await?;
        while let Some(entry) = rd.next_entry().await? {
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    async fn walk_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut queue = VecDeque::from([root.to_path_buf()]);
        while let Some(dir) = queue.pop_front() {
            let mut rd = match tokio::fs::read_dir(&dir).await {
                Ok(rd) => rd,
                // The root itself must exist; unreadable subdirectories
                // are skipped rather than aborting the whole walk.
                Err(err) if dir == root => return Err(err),
                Err(_) => continue,
            };
            while let Some(entry) = rd.next_entry().await? {
                let md = entry.metadata().await?;
                if md.is_dir() {
                    queue.push_back(entry.path());
                } else if md.is_file() {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn remove_dir_if_empty(&self, path: &Path) -> io::Result<bool> {
        let mut rd = match tokio::fs::read_dir(path).await {
            Ok(rd) => rd,
            Err(_) => return Ok(false),
        };
        if rd.next_entry().await?.is_some() {
            return Ok(false);
        }
        match tokio::fs::remove_dir(path).await {
            Ok(()) => Ok(true),
            // Lost the race against a concurrent writer; leave it be.
            Err(_) => Ok(false),
        }
    }

    async fn free_space(&self, path: &Path) -> Option<u64> {
        let path = path.to_path_buf();
        let join = tokio::task::spawn_blocking(move || {
            let disks = sysinfo::Disks::new_with_refreshed_list();
            disks
                .list()
                .iter()
                .filter(|disk| path.starts_with(disk.mount_point()))
                .max_by_key(|disk| disk.mount_point().as_os_str().len())
                .map(|disk| disk.available_space())
        });
        join.await.ok().flatten()
    }
}

/// In-memory filesystem for tests.
///
/// Paths are treated literally; callers should use consistent absolute
/// paths. Shared via `Arc` so fakes (e.g. the in-memory transfer tool)
/// can mutate the same tree the engine observes.
#[derive(Debug, Default)]
pub struct InMemoryFs {
    state: Mutex<FsState>,
}

#[derive(Debug, Default)]
struct FsState {
    files: BTreeMap<PathBuf, u64>,
    dirs: BTreeSet<PathBuf>,
    free: BTreeMap<PathBuf, u64>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, len: u64) {
        let path = path.into();
        let mut state = self.state.lock().expect("fs state poisoned");
        let mut parent = path.parent().map(Path::to_path_buf);
        while let Some(dir) = parent {
            if !state.dirs.insert(dir.clone()) {
                break;
            }
            parent = dir.parent().map(Path::to_path_buf);
        }
        state.files.insert(path, len);
    }

    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut state = self.state.lock().expect("fs state poisoned");
        let mut current = Some(path);
        while let Some(dir) = current {
            if !state.dirs.insert(dir.clone()) {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
        }
    }

    /// Declare free space for a mount root; `free_space` answers with the
    /// longest matching root.
    pub fn set_free_space(&self, root: impl Into<PathBuf>, bytes: u64) {
        let mut state = self.state.lock().expect("fs state poisoned");
        state.free.insert(root.into(), bytes);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state
            .lock()
            .expect("fs state poisoned")
            .files
            .contains_key(path)
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .expect("fs state poisoned")
            .files
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn is_file(&self, path: &Path) -> bool {
        self.contains(path)
    }

    async fn file_size(&self, path: &Path) -> Option<u64> {
        self.state
            .lock()
            .expect("fs state poisoned")
            .files
            .get(path)
            .copied()
    }

    async fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.state.lock().expect("fs state poisoned");
        if !state.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such directory: {}", path.display()),
            ));
        }
        let mut entries: Vec<PathBuf> = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .filter(|candidate| candidate.parent() == Some(path))
            .cloned()
            .collect();
        entries.sort();
        entries.dedup();
        Ok(entries)
    }

    async fn walk_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.state.lock().expect("fs state poisoned");
        if !state.dirs.contains(root) && !state.files.contains_key(root) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such directory: {}", root.display()),
            ));
        }
        Ok(state
            .files
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect())
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.add_dir(path);
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock().expect("fs state poisoned");
        state.files.remove(path).map(|_| ()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }

    async fn remove_dir_if_empty(&self, path: &Path) -> io::Result<bool> {
        let mut state = self.state.lock().expect("fs state poisoned");
        if !state.dirs.contains(path) {
            return Ok(false);
        }
        let occupied = state
            .files
            .keys()
            .chain(state.dirs.iter())
            .any(|candidate| candidate.parent() == Some(path));
        if occupied {
            return Ok(false);
        }
        state.dirs.remove(path);
        Ok(true)
    }

    async fn free_space(&self, path: &Path) -> Option<u64> {
        let state = self.state.lock().expect("fs state poisoned");
        state
            .free
            .iter()
            .filter(|(root, _)| path.starts_with(root))
            .max_by_key(|(root, _)| root.as_os_str().len())
            .map(|(_, bytes)| *bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_fs_lists_and_walks() {
        let fs = InMemoryFs::new();
        fs.add_file("/mnt/cache/Serien/Dark/Season 1/S01E01.mkv", 100);
        fs.add_file("/mnt/cache/Serien/Dark/Season 1/S01E02.mkv", 100);
        fs.add_file("/mnt/cache/Serien/Dark/poster.jpg", 10);

        let children = fs.list_dir(Path::new("/mnt/cache/Serien/Dark")).await.unwrap();
        assert_eq!(
            children,
            vec![
                PathBuf::from("/mnt/cache/Serien/Dark/Season 1"),
                PathBuf::from("/mnt/cache/Serien/Dark/poster.jpg"),
            ]
        );

        let walked = fs.walk_files(Path::new("/mnt/cache/Serien")).await.unwrap();
        assert_eq!(walked.len(), 3);
    }

    #[tokio::test]
    async fn empty_dir_removal_respects_occupancy() {
        let fs = InMemoryFs::new();
        fs.add_file("/mnt/cache/Filme/Heat/Heat.mkv", 100);

        let dir = Path::new("/mnt/cache/Filme/Heat");
        assert!(!fs.remove_dir_if_empty(dir).await.unwrap());
        fs.remove_file(Path::new("/mnt/cache/Filme/Heat/Heat.mkv"))
            .await
            .unwrap();
        assert!(fs.remove_dir_if_empty(dir).await.unwrap());
        assert!(!fs.remove_dir_if_empty(dir).await.unwrap());
    }

    #[tokio::test]
    async fn free_space_uses_longest_matching_root() {
        let fs = InMemoryFs::new();
        fs.set_free_space("/mnt", 1);
        fs.set_free_space("/mnt/cache", 42);
        assert_eq!(fs.free_space(Path::new("/mnt/cache/x.mkv")).await, Some(42));
        assert_eq!(fs.free_space(Path::new("/mnt/disk1/x.mkv")).await, Some(1));
        assert_eq!(fs.free_space(Path::new("/srv/x")).await, None);
    }
}
