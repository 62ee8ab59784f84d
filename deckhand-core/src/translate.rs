use deckhand_model::PathRule;
use std::path::PathBuf;
use tracing::trace;

/// Rewrites server-reported paths into physical storage paths.
///
/// Pure and deterministic: the first rule whose prefix matches wins, with
/// the matched prefix substituted and the remainder untouched. Rule order
/// matters so more-specific prefixes can be listed before general
/// fallbacks. A path matching no rule is untranslatable and must be
/// dropped by the caller, never substituted.
#[derive(Debug, Clone)]
pub struct PathTranslator {
    rules: Vec<PathRule>,
}

impl PathTranslator {
    pub fn new(rules: &[PathRule]) -> Self {
        Self {
            rules: rules.to_vec(),
        }
    }

    pub fn translate(&self, reported: &str) -> Option<PathBuf> {
        for rule in &self.rules {
            if let Some(rest) = reported.strip_prefix(rule.prefix.as_str()) {
                let translated = format!("{}{}", rule.replacement, rest);
                trace!(reported, translated, prefix = %rule.prefix, "translated path");
                return Some(PathBuf::from(translated));
            }
        }
        None
    }
}
