//! Cache orphan sweep.
//!
//! Finds files sitting on the cache tier that the resident index knows
//! nothing about - leftovers from manual copies, crashed runs, or other
//! tools. The sweep only walks cache folders covered by some instance's
//! path-mapping rules, so unrelated shares (appdata, system folders) are
//! never touched. Orphans can be reported, evicted through the normal
//! executor path, or adopted into the index.

use crate::error::Result;
use crate::fs::FileSystem;
use crate::state::ResidentIndex;
use deckhand_model::{CycleConfig, MoveOp, MovePlan};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct OrphanSweep {
    /// Orphaned files, keyed by their union-share identity.
    pub orphans: BTreeSet<PathBuf>,
    pub total_bytes: u64,
}

impl OrphanSweep {
    /// An eviction-only plan returning every orphan to the array.
    pub fn eviction_plan(&self) -> MovePlan {
        MovePlan::new(
            self.orphans
                .iter()
                .map(|path| MoveOp::Evict {
                    path: path.clone(),
                    origin: None,
                })
                .collect(),
            Vec::new(),
        )
    }

    /// Add every orphan to the index so external tooling leaves it alone.
    pub fn adopt_into(&self, index: &mut ResidentIndex) {
        for path in &self.orphans {
            index.insert(path.clone(), None);
        }
    }
}

/// Walk the mapped cache folders and report files missing from the index.
pub async fn scan_orphans(
    config: &CycleConfig,
    fs: &Arc<dyn FileSystem>,
    index: &ResidentIndex,
) -> Result<OrphanSweep> {
    // Scan only cache folders some mapping rule can produce paths under.
    let mut targets: BTreeSet<PathBuf> = BTreeSet::new();
    for instance in &config.instances {
        for rule in &instance.path_rules {
            let replacement = Path::new(&rule.replacement);
            if let Ok(rel) = replacement.strip_prefix(&config.user_root) {
                targets.insert(config.cache_root.join(rel));
            }
        }
    }

    let mut sweep = OrphanSweep::default();
    let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
    for target in &targets {
        let files = match fs.walk_files(target).await {
            Ok(files) => files,
            // Not present on the cache tier at all.
            Err(err) => {
                debug!(target = %target.display(), error = %err, "skipping scan target");
                continue;
            }
        };
        for file in files {
            if !seen.insert(file.clone()) {
                continue;
            }
            // Never flag our own state files.
            if file
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("deckhand_"))
            {
                continue;
            }
            let Some(physical) = config.physical_from_cache(&file) else {
                continue;
            };
            if !index.contains(&physical) {
                sweep.total_bytes += fs.file_size(&file).await.unwrap_or(0);
                sweep.orphans.insert(physical);
            }
        }
    }

    info!(
        orphans = sweep.orphans.len(),
        bytes = sweep.total_bytes,
        "orphan sweep complete"
    );
    Ok(sweep)
}
