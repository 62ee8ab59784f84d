//! # Deckhand Core
//!
//! Residency planning and move orchestration for tiered media storage.
//!
//! Deckhand keeps the files a household is about to watch resident on the
//! fast cache tier and returns everything else to the bulk array. One
//! batch cycle flows strictly one direction:
//!
//! 1. [`gateway`] queries every configured media-server instance for
//!    continue-watching state and active playback sessions.
//! 2. [`workingset`] assembles the deduplicated target set of physical
//!    paths that must be cache-resident, applying per-user/per-library
//!    caps, series binge lookahead, and path translation.
//! 3. [`protect`] snapshots currently-playing paths into a blacklist that
//!    wins over both sides of the plan.
//! 4. [`plan`] diffs the target set against the persisted resident index
//!    and emits a deterministic evict-then-fetch plan.
//! 5. [`execute`] applies the plan (or just reports it), re-validating
//!    protection immediately before each operation.
//!
//! The resident index - the exclude list external mover tooling trusts -
//! is owned exclusively by [`state`] and rewritten atomically.
//!
//! All components receive an immutable [`deckhand_model::CycleConfig`]
//! snapshot instead of reading ambient state, so the builder and the diff
//! engine are pure functions of (config, API responses, persisted state).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod cycle;
pub mod episodes;
pub mod error;
pub mod execute;
pub mod fs;
pub mod gateway;
pub mod orphans;
pub mod plan;
pub mod protect;
pub mod state;
pub mod translate;
pub mod workingset;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{CoreError, Result};
pub use translate::PathTranslator;
