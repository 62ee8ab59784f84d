//! Structural validation of the settings document.
//!
//! Hard errors abort before a cycle starts; warnings surface wizard
//! mistakes that have a safe interpretation (they are logged and the
//! cycle continues).

use crate::settings::{Settings, SettingsError};
use deckhand_model::{LibraryKind, OriginDiskPolicy};
use std::collections::HashSet;
use url::Url;

/// A non-fatal configuration finding with a remediation hint.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: String,
}

impl ConfigWarning {
    fn new(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hint: hint.into(),
        }
    }
}

impl Settings {
    /// Validate the document. Returns warnings on success.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, SettingsError> {
        let mut warnings = Vec::new();

        if self.instances.is_empty() {
            return Err(SettingsError::Invalid(
                "no media-server instances configured".into(),
            ));
        }

        let mut names = HashSet::new();
        for inst in &self.instances {
            if !names.insert(inst.name.as_str()) {
                return Err(SettingsError::Invalid(format!(
                    "duplicate instance name {:?}",
                    inst.name
                )));
            }
            Url::parse(&inst.url).map_err(|err| {
                SettingsError::Invalid(format!(
                    "instance {:?} has an invalid url {:?}: {err}",
                    inst.name, inst.url
                ))
            })?;
            if inst.api_key.is_empty() {
                warnings.push(ConfigWarning::new(
                    format!("instance {:?} has no API key", inst.name),
                    "every request to this instance will be rejected; add an api_key",
                ));
            }
            if inst.path_rules.is_empty() {
                warnings.push(ConfigWarning::new(
                    format!("instance {:?} has no path-mapping rules", inst.name),
                    "every path this server reports will be untranslatable and skipped",
                ));
            }
            // First match wins: a general prefix listed before a more
            // specific one that extends it makes the specific rule dead.
            for (i, general) in inst.path_rules.iter().enumerate() {
                for specific in inst.path_rules.iter().skip(i + 1) {
                    if specific.prefix.starts_with(&general.prefix)
                        && specific.prefix != general.prefix
                    {
                        warnings.push(ConfigWarning::new(
                            format!(
                                "instance {:?}: rule {:?} is shadowed by earlier rule {:?}",
                                inst.name, specific.prefix, general.prefix
                            ),
                            "order path_rules most-specific-first",
                        ));
                    }
                }
            }
        }

        for user in &self.users {
            if !names.contains(user.instance.as_str()) {
                return Err(SettingsError::Invalid(format!(
                    "user {:?} references unknown instance {:?}",
                    user.id, user.instance
                )));
            }
            if user.libraries.is_empty() {
                warnings.push(ConfigWarning::new(
                    format!("user {:?} monitors no libraries", user.id),
                    "add at least one library policy or remove the user",
                ));
            }
            for (library, policy) in &user.libraries {
                if policy.max_items == 0 {
                    warnings.push(ConfigWarning::new(
                        format!(
                            "user {:?} library {:?} has max_items 0",
                            user.id, library
                        ),
                        "this library will never contribute to the working set",
                    ));
                }
                if policy.kind == LibraryKind::Movies && policy.lookahead > 0 {
                    warnings.push(ConfigWarning::new(
                        format!(
                            "user {:?} library {:?} sets lookahead on a movie library",
                            user.id, library
                        ),
                        "lookahead only applies to series libraries and is ignored",
                    ));
                }
            }
        }

        if self.origin_disk_policy == OriginDiskPolicy::Restore && self.disk_roots.is_empty() {
            warnings.push(ConfigWarning::new(
                "origin_disk_policy is \"restore\" but disk_roots is empty",
                "evictions will fall back to automatic placement; list the array disks",
            ));
        }

        Ok(warnings)
    }
}
