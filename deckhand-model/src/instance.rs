use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One ordered path-mapping rule: a reported-path prefix and the physical
/// prefix that replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRule {
    pub prefix: String,
    pub replacement: String,
}

impl PathRule {
    pub fn new(prefix: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            replacement: replacement.into(),
        }
    }
}

/// A configured media-server instance.
///
/// Immutable once loaded; connection parameters plus the ordered
/// path-mapping rules for paths this server reports. Rule order matters:
/// the first matching prefix wins, so more specific prefixes must be
/// listed before general fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub url: String,
    pub api_key: String,
    pub path_rules: Vec<PathRule>,
}

/// The kind of content a monitored library contains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    Movies,
    Series,
}

impl std::fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryKind::Movies => write!(f, "movies"),
            LibraryKind::Series => write!(f, "series"),
        }
    }
}

/// Per-library residency policy for one user.
///
/// `max_items` caps how many on-deck items are kept per cycle.
/// `lookahead` is the number of episodes fetched ahead of the resume
/// point; it is meaningless for movie libraries and ignored there.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LibraryPolicy {
    pub kind: LibraryKind,
    pub max_items: usize,
    #[serde(default)]
    pub lookahead: u32,
}

/// A server-scoped user whose viewing state feeds the working set.
///
/// Identity is scoped to the owning instance: the same person on two
/// instances is two independent records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub display_name: String,
    /// Name of the owning [`Instance`].
    pub instance: String,
    /// Library name -> policy, ordered for deterministic iteration.
    pub libraries: BTreeMap<String, LibraryPolicy>,
    /// Also pin this user's favorite series, not just resumable items.
    #[serde(default)]
    pub include_favorites: bool,
}
