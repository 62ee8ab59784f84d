//! Working-set assembly.
//!
//! For every configured user and library this resolves the on-deck items
//! (capped by the library policy), expands series entries with the binge
//! lookahead, translates every reported path, picks up companion sidecar
//! files, and unions everything into one deduplicated set of physical
//! paths keyed by the translated path - the only identity that is unique
//! across instances even when reported paths collide.
//!
//! Instances are queried concurrently; the diff engine must not run until
//! every contribution (including per-series episode resolution) has
//! settled. An unreachable instance contributes nothing and is surfaced
//! as a warning.

use crate::episodes::binge_window;
use crate::fs::FileSystem;
use crate::gateway::{ApiItem, GatewayError, MediaServerApi};
use crate::translate::PathTranslator;
use chrono::Utc;
use deckhand_model::{CycleConfig, Instance, LibraryKind, LibraryPolicy, UserRecord};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on resume entries requested per user; policies cap far
/// lower, this only bounds the wire payload.
const RESUME_LIMIT: usize = 1000;

/// Companion files kept next to their media file.
const SIDECAR_EXTENSIONS: &[&str] = &[
    "nfo", "jpg", "jpeg", "png", "tbn", "bif", "ico", "srt", "sub", "ass", "vtt",
];

#[derive(Debug, Default)]
pub struct WorkingSetOutcome {
    /// The global deduplicated target set.
    pub files: BTreeSet<PathBuf>,
    /// Contribution per successfully queried instance.
    pub per_instance: BTreeMap<String, BTreeSet<PathBuf>>,
    /// Instances that could not be queried this cycle.
    pub failed_instances: Vec<String>,
    pub warnings: Vec<String>,
    pub dropped_untranslatable: usize,
}

#[derive(Debug, Default)]
struct InstanceContribution {
    files: BTreeSet<PathBuf>,
    warnings: Vec<String>,
    dropped_untranslatable: usize,
}

pub struct WorkingSetBuilder {
    config: Arc<CycleConfig>,
    fs: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for WorkingSetBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingSetBuilder")
            .field("instances", &self.config.instances.len())
            .finish()
    }
}

impl WorkingSetBuilder {
    pub fn new(config: Arc<CycleConfig>, fs: Arc<dyn FileSystem>) -> Self {
        Self { config, fs }
    }

    /// Query every instance concurrently and merge the contributions.
    pub async fn build(&self, gateways: &[Arc<dyn MediaServerApi>]) -> WorkingSetOutcome {
        let mut outcome = WorkingSetOutcome::default();

        let mut pairs: Vec<(&Instance, &Arc<dyn MediaServerApi>)> = Vec::new();
        for instance in &self.config.instances {
            match gateways
                .iter()
                .find(|gateway| gateway.instance_name() == instance.name)
            {
                Some(gateway) => pairs.push((instance, gateway)),
                None => outcome.warnings.push(format!(
                    "no gateway available for instance {:?}",
                    instance.name
                )),
            }
        }

        let results = join_all(
            pairs
                .iter()
                .map(|(instance, gateway)| self.collect_instance(instance, gateway.as_ref())),
        )
        .await;

        for ((instance, _), result) in pairs.iter().zip(results) {
            match result {
                Ok(contribution) => {
                    outcome.files.extend(contribution.files.iter().cloned());
                    outcome
                        .per_instance
                        .insert(instance.name.clone(), contribution.files);
                    outcome.warnings.extend(contribution.warnings);
                    outcome.dropped_untranslatable += contribution.dropped_untranslatable;
                }
                Err(err) => {
                    warn!(
                        instance = %instance.name,
                        error = %err,
                        "instance unreachable; it contributes nothing this cycle"
                    );
                    outcome.warnings.push(format!(
                        "instance {:?} unreachable: {err}",
                        instance.name
                    ));
                    outcome.failed_instances.push(instance.name.clone());
                }
            }
        }

        info!(
            files = outcome.files.len(),
            dropped_untranslatable = outcome.dropped_untranslatable,
            failed_instances = outcome.failed_instances.len(),
            "working set assembled"
        );
        outcome
    }

    async fn collect_instance(
        &self,
        instance: &Instance,
        gateway: &dyn MediaServerApi,
    ) -> Result<InstanceContribution, GatewayError> {
        let translator = PathTranslator::new(&instance.path_rules);
        let mut contribution = InstanceContribution::default();

        // Advisory only: the server's own idea of each library's kind
        // never overrides an explicit policy, it just flags mismatches.
        let server_kinds: BTreeMap<String, LibraryKind> = match gateway.virtual_folders().await {
            Ok(folders) => folders
                .iter()
                .filter_map(|folder| folder.library_kind().map(|kind| (folder.name.clone(), kind)))
                .collect(),
            Err(err) => {
                debug!(instance = %instance.name, error = %err, "virtual folder query failed");
                BTreeMap::new()
            }
        };

        let mut checked: BTreeSet<&str> = BTreeSet::new();
        for user in self.config.users_of(&instance.name) {
            for (library, policy) in &user.libraries {
                if checked.insert(library.as_str())
                    && let Some(server_kind) = server_kinds.get(library)
                    && *server_kind != policy.kind
                {
                    contribution.warnings.push(format!(
                        "library {:?} is {} on instance {:?} but configured as {}; keeping the configured policy",
                        library, server_kind, instance.name, policy.kind
                    ));
                }
            }
            self.collect_user(gateway, &translator, user, &mut contribution)
                .await?;
        }
        Ok(contribution)
    }

    async fn collect_user(
        &self,
        gateway: &dyn MediaServerApi,
        translator: &PathTranslator,
        user: &UserRecord,
        contribution: &mut InstanceContribution,
    ) -> Result<(), GatewayError> {
        let since = self
            .config
            .days_to_monitor
            .map(|days| Utc::now() - chrono::Duration::days(days));
        let resume = gateway
            .continue_watching(&user.id, RESUME_LIMIT, since)
            .await?;
        debug!(user = %user.display_name, entries = resume.len(), "continue watching");

        // Attribute each resume entry to exactly one configured library.
        let mut by_library: BTreeMap<&str, Vec<&ApiItem>> = BTreeMap::new();
        for item in &resume {
            match attribute(item, &user.libraries) {
                Some(library) => by_library.entry(library).or_default().push(item),
                None => debug!(
                    user = %user.display_name,
                    id = %item.id,
                    "resume entry matches no configured library"
                ),
            }
        }

        let mut favorite_slots: Option<(&String, &LibraryPolicy, usize)> = None;
        for (library, policy) in &user.libraries {
            let mut items = by_library.remove(library.as_str()).unwrap_or_default();
            if items.len() > policy.max_items {
                debug!(
                    user = %user.display_name,
                    library = %library,
                    kept = policy.max_items,
                    dropped = items.len() - policy.max_items,
                    "capping on-deck items"
                );
                items.truncate(policy.max_items);
            }
            if policy.kind == LibraryKind::Series
                && user.include_favorites
                && favorite_slots.is_none()
            {
                favorite_slots = Some((library, policy, policy.max_items - items.len()));
            }
            for item in items {
                match policy.kind {
                    LibraryKind::Movies => {
                        self.add_file(translator, library, item.primary_path(), contribution)
                            .await;
                    }
                    LibraryKind::Series => {
                        self.add_series_window(
                            gateway,
                            translator,
                            user,
                            library,
                            policy,
                            item,
                            contribution,
                        )
                        .await?;
                    }
                }
            }
        }

        // Favorite series fill whatever on-deck slots the first series
        // library has left, so the per-library cap still holds.
        if let Some((library, policy, slots)) = favorite_slots
            && slots > 0
        {
            let favorites = gateway.favorite_series(&user.id).await?;
            debug!(user = %user.display_name, library = %library, favorites = favorites.len(), "pinning favorites");
            for favorite in favorites.iter().take(slots) {
                self.add_series_window(
                    gateway,
                    translator,
                    user,
                    library,
                    policy,
                    favorite,
                    contribution,
                )
                .await?;
            }
        }
        Ok(())
    }

    /// The resume point plus the policy's lookahead, in season/episode
    /// order.
    #[allow(clippy::too_many_arguments)]
    async fn add_series_window(
        &self,
        gateway: &dyn MediaServerApi,
        translator: &PathTranslator,
        user: &UserRecord,
        library: &str,
        policy: &LibraryPolicy,
        item: &ApiItem,
        contribution: &mut InstanceContribution,
    ) -> Result<(), GatewayError> {
        // The resume file itself always belongs to the set, even when the
        // episode listing turns out not to contain it.
        if item.is_episode() {
            self.add_file(translator, library, item.primary_path(), contribution)
                .await;
        }

        let series_id = if item.is_episode() {
            item.series_id.as_deref()
        } else if item.is_series() {
            Some(item.id.as_str())
        } else {
            None
        };
        let Some(series_id) = series_id else {
            return Ok(());
        };

        let episodes = gateway.series_episodes(&user.id, series_id).await?;
        let anchor = if item.is_episode() {
            Some(item.id.as_str())
        } else {
            None
        };
        for episode in binge_window(&episodes, anchor, policy.lookahead) {
            self.add_file(translator, library, episode.primary_path(), contribution)
                .await;
        }
        Ok(())
    }

    async fn add_file(
        &self,
        translator: &PathTranslator,
        library: &str,
        reported: Option<&str>,
        contribution: &mut InstanceContribution,
    ) {
        let Some(reported) = reported else {
            return;
        };
        let Some(physical) = translator.translate(reported) else {
            warn!(library, reported, "untranslatable path dropped");
            contribution.dropped_untranslatable += 1;
            return;
        };
        self.add_sidecars(&physical, &mut contribution.files).await;
        contribution.files.insert(physical);
    }

    /// Companion files sharing the media file's stem (artwork, metadata,
    /// subtitles) ride along with it. Best-effort: an unreadable parent
    /// just means no sidecars.
    async fn add_sidecars(&self, physical: &Path, files: &mut BTreeSet<PathBuf>) {
        let Some(parent) = physical.parent() else {
            return;
        };
        let Some(stem) = physical.file_stem().and_then(|s| s.to_str()) else {
            return;
        };
        let stem = stem.to_lowercase();
        let Ok(entries) = self.fs.list_dir(parent).await else {
            return;
        };
        for entry in entries {
            let Some(ext) = entry.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !SIDECAR_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                continue;
            }
            let Some(candidate) = entry.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if candidate.to_lowercase().starts_with(&stem) {
                files.insert(entry);
            }
        }
    }
}

fn kind_matches(item: &ApiItem, kind: LibraryKind) -> bool {
    match kind {
        LibraryKind::Movies => item.is_movie(),
        LibraryKind::Series => item.is_episode() || item.is_series(),
    }
}

fn path_mentions(reported: &str, library: &str) -> bool {
    Path::new(reported)
        .components()
        .any(|component| component.as_os_str().to_str() == Some(library))
}

/// Pick the library a resume entry belongs to: a kind-matching library
/// named in the reported path wins, otherwise the first library of the
/// matching kind.
fn attribute<'a>(item: &ApiItem, libraries: &'a BTreeMap<String, LibraryPolicy>) -> Option<&'a str> {
    if let Some(reported) = item.primary_path() {
        for (name, policy) in libraries {
            if kind_matches(item, policy.kind) && path_mentions(reported, name) {
                return Some(name);
            }
        }
    }
    libraries
        .iter()
        .find(|(_, policy)| kind_matches(item, policy.kind))
        .map(|(name, _)| name.as_str())
}
