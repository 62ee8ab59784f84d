//! Persistence of the resident-file index and the origin-disk memory.
//!
//! The exclude list is the single source of truth external mover tooling
//! consults to know which cache files to leave alone. It is a plain-text
//! file, one physical path per line, rewritten completely and atomically
//! (write-new-then-replace) so a crash mid-write can never leave a
//! truncated index behind. A missing or corrupt index is fatal for the
//! cycle: planning against an unknown residency baseline risks evicting a
//! still-needed file, so the engine refuses to guess.

use deckhand_model::CycleConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("resident index missing at {0}; run `deckhandctl init` to seed an empty baseline")]
    MissingIndex(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("state files already exist; pass --force to reinitialize")]
    AlreadyInitialized,
}

/// The set of physical paths currently believed to be cache-resident.
///
/// Each entry optionally carries the label of the array disk the file was
/// fetched from, so a later evict can write back to the same disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResidentIndex {
    paths: BTreeSet<PathBuf>,
    origins: BTreeMap<PathBuf, String>,
}

impl ResidentIndex {
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn insert(&mut self, path: PathBuf, origin: Option<String>) {
        if let Some(label) = origin {
            self.origins.insert(path.clone(), label);
        }
        self.paths.insert(path);
    }

    /// Remove a path and its origin label. Returns whether it was present.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.origins.remove(path);
        self.paths.remove(path)
    }

    pub fn origin_of(&self, path: &Path) -> Option<&str> {
        self.origins.get(path).map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    pub fn as_set(&self) -> &BTreeSet<PathBuf> {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Last successful working-set contribution per instance, kept so an
/// unreachable instance's files are shielded from eviction instead of
/// looking abandoned.
pub type InstanceSets = BTreeMap<String, BTreeSet<PathBuf>>;

/// Owns the on-disk state files; the only component that writes them.
#[derive(Debug, Clone)]
pub struct StateStore {
    exclude_file: PathBuf,
    origin_file: PathBuf,
    instance_sets_file: PathBuf,
}

impl StateStore {
    pub fn new(config: &CycleConfig) -> Self {
        Self {
            exclude_file: config.exclude_file.clone(),
            origin_file: config.origin_file.clone(),
            instance_sets_file: config.instance_sets_file.clone(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.exclude_file.exists()
    }

    /// Seed empty state files. Refuses to clobber an existing baseline
    /// unless forced.
    pub fn init(&self, force: bool) -> Result<(), StateError> {
        if self.is_initialized() && !force {
            return Err(StateError::AlreadyInitialized);
        }
        self.save(&ResidentIndex::default())?;
        self.save_instance_sets(&InstanceSets::new())
    }

    pub fn load(&self) -> Result<ResidentIndex, StateError> {
        let contents = match std::fs::read_to_string(&self.exclude_file) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StateError::MissingIndex(self.exclude_file.clone()));
            }
            Err(source) => {
                return Err(StateError::Read {
                    path: self.exclude_file.clone(),
                    source,
                });
            }
        };
        let paths: BTreeSet<PathBuf> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect();

        let origins = match std::fs::read_to_string(&self.origin_file) {
            Ok(raw) => serde_json::from_str::<BTreeMap<PathBuf, String>>(&raw).map_err(
                |source| StateError::Corrupt {
                    path: self.origin_file.clone(),
                    source,
                },
            )?,
            // The origin map is auxiliary metadata; absent just means no
            // labels have been recorded yet.
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StateError::Read {
                    path: self.origin_file.clone(),
                    source,
                });
            }
        };

        debug!(
            resident = paths.len(),
            origins = origins.len(),
            "loaded resident index"
        );
        Ok(ResidentIndex { paths, origins })
    }

    /// Rewrite both state files completely and atomically.
    pub fn save(&self, index: &ResidentIndex) -> Result<(), StateError> {
        let mut exclude = String::new();
        for path in &index.paths {
            exclude.push_str(&path.to_string_lossy());
            exclude.push('\n');
        }
        atomic_write(&self.exclude_file, exclude.as_bytes()).map_err(|source| {
            StateError::Write {
                path: self.exclude_file.clone(),
                source,
            }
        })?;

        let origins = serde_json::to_vec_pretty(&index.origins).map_err(|source| {
            StateError::Corrupt {
                path: self.origin_file.clone(),
                source,
            }
        })?;
        atomic_write(&self.origin_file, &origins).map_err(|source| StateError::Write {
            path: self.origin_file.clone(),
            source,
        })
    }

    pub fn load_instance_sets(&self) -> Result<InstanceSets, StateError> {
        match std::fs::read_to_string(&self.instance_sets_file) {
            Ok(raw) => {
                serde_json::from_str(&raw).map_err(|source| StateError::Corrupt {
                    path: self.instance_sets_file.clone(),
                    source,
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(InstanceSets::new()),
            Err(source) => Err(StateError::Read {
                path: self.instance_sets_file.clone(),
                source,
            }),
        }
    }

    pub fn save_instance_sets(&self, sets: &InstanceSets) -> Result<(), StateError> {
        let raw = serde_json::to_vec_pretty(sets).map_err(|source| StateError::Corrupt {
            path: self.instance_sets_file.clone(),
            source,
        })?;
        atomic_write(&self.instance_sets_file, &raw).map_err(|source| StateError::Write {
            path: self.instance_sets_file.clone(),
            source,
        })
    }
}

/// Write-new-then-replace: write to a sibling temp file, fsync it, rename
/// it over the destination, and best-effort fsync the parent directory so
/// the rename metadata is durable too.
fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(format!(".tmp.{}", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.flush()?;
        file.sync_all()?;
    }

    if let Err(err) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(err);
    }

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> StateStore {
        StateStore {
            exclude_file: dir.join("deckhand_exclude.txt"),
            origin_file: dir.join("deckhand_origins.json"),
            instance_sets_file: dir.join("deckhand_instance_sets.json"),
        }
    }

    #[test]
    fn round_trips_index_with_origins() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let mut index = ResidentIndex::default();
        index.insert(PathBuf::from("/mnt/user/Filme/Heat.mkv"), Some("disk2".into()));
        index.insert(PathBuf::from("/mnt/user/Serien/Dark/S01E01.mkv"), None);
        store.save(&index).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, index);
        assert_eq!(
            loaded.origin_of(Path::new("/mnt/user/Filme/Heat.mkv")),
            Some("disk2")
        );
        assert_eq!(
            loaded.origin_of(Path::new("/mnt/user/Serien/Dark/S01E01.mkv")),
            None
        );
    }

    #[test]
    fn missing_index_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path()).load().unwrap_err();
        assert!(matches!(err, StateError::MissingIndex(_)));
    }

    #[test]
    fn corrupt_origin_map_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save(&ResidentIndex::default()).unwrap();
        std::fs::write(dir.path().join("deckhand_origins.json"), b"{ nope").unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
    }

    #[test]
    fn save_rewrites_completely_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let mut index = ResidentIndex::default();
        index.insert(PathBuf::from("/mnt/user/a.mkv"), None);
        index.insert(PathBuf::from("/mnt/user/b.mkv"), Some("disk1".into()));
        store.save(&index).unwrap();

        index.remove(Path::new("/mnt/user/b.mkv"));
        store.save(&index).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!loaded.contains(Path::new("/mnt/user/b.mkv")));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn init_refuses_to_clobber_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.init(false).unwrap();
        assert!(matches!(
            store.init(false),
            Err(StateError::AlreadyInitialized)
        ));
        store.init(true).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn instance_sets_round_trip_and_default_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.load_instance_sets().unwrap().is_empty());

        let mut sets = InstanceSets::new();
        sets.insert(
            "HomeServer".into(),
            BTreeSet::from([PathBuf::from("/mnt/user/Filme/Heat.mkv")]),
        );
        store.save_instance_sets(&sets).unwrap();
        assert_eq!(store.load_instance_sets().unwrap(), sets);
    }
}
