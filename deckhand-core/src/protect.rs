//! Live-playback protection.
//!
//! A snapshot of every currently-playing translated path across all
//! instances. Protection always wins: a protected path is excluded from
//! both eviction and fetch planning, and the executor re-queries the
//! snapshot immediately before each individual move because playback can
//! start between planning and execution.

use crate::gateway::MediaServerApi;
use crate::translate::PathTranslator;
use deckhand_model::CycleConfig;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Currently-playing physical paths, valid only for the moment it was
/// taken. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct ProtectionSet {
    paths: BTreeSet<PathBuf>,
    /// Instances whose sessions could not be queried. An unreachable
    /// instance is degraded, not "nothing is playing".
    pub degraded: Vec<String>,
}

impl ProtectionSet {
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn paths(&self) -> &BTreeSet<PathBuf> {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            degraded: Vec::new(),
        }
    }
}

/// Queries every instance's active sessions and unions the translated
/// playing paths into one blacklist.
pub struct SessionProtector {
    entries: Vec<(Arc<dyn MediaServerApi>, PathTranslator)>,
}

impl std::fmt::Debug for SessionProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProtector")
            .field("instances", &self.entries.len())
            .finish()
    }
}

impl SessionProtector {
    pub fn new(config: &CycleConfig, gateways: Vec<Arc<dyn MediaServerApi>>) -> Self {
        let entries = gateways
            .into_iter()
            .map(|gateway| {
                let rules = config
                    .instance(gateway.instance_name())
                    .map(|inst| inst.path_rules.as_slice())
                    .unwrap_or(&[]);
                let translator = PathTranslator::new(rules);
                (gateway, translator)
            })
            .collect();
        Self { entries }
    }

    /// Take a fresh snapshot across every instance.
    pub async fn snapshot(&self) -> ProtectionSet {
        let queries = self.entries.iter().map(|(gateway, translator)| async move {
            match gateway.active_sessions().await {
                Ok(sessions) => {
                    let mut playing = Vec::new();
                    for session in &sessions {
                        let Some(reported) = session.playing_path() else {
                            continue;
                        };
                        match translator.translate(reported) {
                            Some(physical) => playing.push(physical),
                            // An untranslatable playing path cannot
                            // collide with any planned path (those are
                            // all translated), but it is worth noticing.
                            None => warn!(
                                instance = gateway.instance_name(),
                                reported, "playing path is untranslatable"
                            ),
                        }
                    }
                    Ok(playing)
                }
                Err(err) => Err((gateway.instance_name().to_string(), err)),
            }
        });

        let mut set = ProtectionSet::default();
        for result in join_all(queries).await {
            match result {
                Ok(playing) => set.paths.extend(playing),
                Err((instance, err)) => {
                    warn!(%instance, error = %err, "session query failed; protection degraded");
                    set.degraded.push(instance);
                }
            }
        }
        debug!(playing = set.len(), degraded = set.degraded.len(), "protection snapshot");
        set
    }
}
