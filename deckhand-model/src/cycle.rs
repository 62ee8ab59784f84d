use crate::instance::{Instance, UserRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Whether recorded origin-disk labels are applied when evicting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginDiskPolicy {
    /// Record the source disk on fetch but let the array place evicted
    /// files automatically.
    Record,
    /// Record on fetch and write evicted files back to the recorded disk.
    #[default]
    Restore,
}

/// Immutable configuration snapshot for one planning cycle.
///
/// Every component receives this as input instead of reading ambient
/// state, keeping the working-set builder and diff engine pure functions
/// of (config, API responses, persisted state).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Fast tier root, e.g. `/mnt/cache`.
    pub cache_root: PathBuf,
    /// Bulk tier root (array view without the cache), e.g. `/mnt/user0`.
    pub array_root: PathBuf,
    /// Union share root both tiers merge into, e.g. `/mnt/user`.
    /// Translated physical paths - the identity key everywhere - live
    /// under this root.
    pub user_root: PathBuf,
    /// Physical array disk roots, e.g. `/mnt/disk1`, used for origin-disk
    /// detection and write-back.
    pub disk_roots: Vec<PathBuf>,
    /// Minimum free space the destination tier must retain after a copy.
    pub min_free_bytes: u64,
    /// Only consider resume entries played within this many days.
    pub days_to_monitor: Option<i64>,
    pub fetch_parallelism: usize,
    pub evict_parallelism: usize,
    pub origin_disk_policy: OriginDiskPolicy,
    /// Resident-file index consumed by external mover tooling.
    pub exclude_file: PathBuf,
    /// Physical path -> source disk label map.
    pub origin_file: PathBuf,
    /// Last successful per-instance working-set contributions.
    pub instance_sets_file: PathBuf,
    pub instances: Vec<Instance>,
    pub users: Vec<UserRecord>,
}

impl CycleConfig {
    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|inst| inst.name == name)
    }

    /// Users belonging to the named instance.
    pub fn users_of(&self, instance: &str) -> impl Iterator<Item = &UserRecord> {
        self.users.iter().filter(move |u| u.instance == instance)
    }

    /// Map a union-share path to its location on the cache tier.
    pub fn cache_path(&self, physical: &Path) -> Option<PathBuf> {
        physical
            .strip_prefix(&self.user_root)
            .ok()
            .map(|rel| self.cache_root.join(rel))
    }

    /// Map a union-share path to its location on the array view.
    pub fn array_path(&self, physical: &Path) -> Option<PathBuf> {
        physical
            .strip_prefix(&self.user_root)
            .ok()
            .map(|rel| self.array_root.join(rel))
    }

    /// Map a union-share path onto a specific physical disk root.
    pub fn disk_path(&self, disk_root: &Path, physical: &Path) -> Option<PathBuf> {
        physical
            .strip_prefix(&self.user_root)
            .ok()
            .map(|rel| disk_root.join(rel))
    }

    /// Map a cache-tier path back to its union-share identity.
    pub fn physical_from_cache(&self, cache: &Path) -> Option<PathBuf> {
        cache
            .strip_prefix(&self.cache_root)
            .ok()
            .map(|rel| self.user_root.join(rel))
    }

    /// The disk root whose label (final path component) matches `label`.
    pub fn disk_root_for(&self, label: &str) -> Option<&PathBuf> {
        self.disk_roots
            .iter()
            .find(|root| root.file_name().and_then(|n| n.to_str()) == Some(label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CycleConfig {
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
            exclude_file: PathBuf::from("/tmp/exclude.txt"),
            origin_file: PathBuf::from("/tmp/origins.json"),
            instance_sets_file: PathBuf::from("/tmp/sets.json"),
            instances: Vec::new(),
            users: Vec::new(),
        }
    }

    #[test]
    fn tier_mapping_round_trips() {
        let cfg = config();
        let physical = Path::new("/mnt/user/Movies/Heat (1995)/Heat.mkv");
        let cache = cfg.cache_path(physical).unwrap();
        assert_eq!(cache, Path::new("/mnt/cache/Movies/Heat (1995)/Heat.mkv"));
        assert_eq!(cfg.physical_from_cache(&cache).unwrap(), physical);
        assert_eq!(
            cfg.array_path(physical).unwrap(),
            Path::new("/mnt/user0/Movies/Heat (1995)/Heat.mkv")
        );
    }

    #[test]
    fn paths_outside_the_share_do_not_map() {
        let cfg = config();
        assert!(cfg.cache_path(Path::new("/srv/elsewhere/file.mkv")).is_none());
    }

    #[test]
    fn disk_root_lookup_by_label() {
        let cfg = config();
        assert_eq!(
            cfg.disk_root_for("disk2"),
            Some(&PathBuf::from("/mnt/disk2"))
        );
        assert_eq!(cfg.disk_root_for("disk9"), None);
    }
}
