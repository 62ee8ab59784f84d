use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single planned move, keyed by translated physical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveOp {
    /// Return a file from the cache tier to the array.
    ///
    /// `origin` is the recorded array-disk label the file was originally
    /// fetched from, when known; the executor may write back to that disk
    /// instead of letting automatic placement scatter it.
    Evict {
        path: PathBuf,
        origin: Option<String>,
    },
    /// Bring a wanted file from the array onto the cache tier.
    Fetch { path: PathBuf },
}

impl MoveOp {
    pub fn path(&self) -> &Path {
        match self {
            MoveOp::Evict { path, .. } => path,
            MoveOp::Fetch { path } => path,
        }
    }

    pub fn is_evict(&self) -> bool {
        matches!(self, MoveOp::Evict { .. })
    }
}

/// An ordered, idempotent reconciliation plan.
///
/// Evictions always precede fetches so space is reclaimed before new
/// files land on a possibly near-full cache. Within each phase the
/// operations are in lexical path order, so identical inputs always
/// produce a byte-identical plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePlan {
    pub evictions: Vec<MoveOp>,
    pub fetches: Vec<MoveOp>,
}

impl MovePlan {
    pub fn new(evictions: Vec<MoveOp>, fetches: Vec<MoveOp>) -> Self {
        debug_assert!(evictions.iter().all(MoveOp::is_evict));
        debug_assert!(fetches.iter().all(|op| !op.is_evict()));
        Self { evictions, fetches }
    }

    pub fn is_empty(&self) -> bool {
        self.evictions.is_empty() && self.fetches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.evictions.len() + self.fetches.len()
    }

    /// All operations in execution order: evictions, then fetches.
    pub fn ops(&self) -> impl Iterator<Item = &MoveOp> {
        self.evictions.iter().chain(self.fetches.iter())
    }
}

/// Why an already-planned operation was skipped during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The file started playing between planning and execution. Not an
    /// error; the next cycle picks it up again.
    NowPlaying,
    /// The source file no longer exists where the plan expected it.
    MissingSource,
    /// Destination tier would drop below the minimum free-space threshold.
    InsufficientSpace,
    /// A user interrupt stopped new operations from launching.
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NowPlaying => write!(f, "currently playing"),
            SkipReason::MissingSource => write!(f, "source missing"),
            SkipReason::InsufficientSpace => write!(f, "insufficient free space"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}
