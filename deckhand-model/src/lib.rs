//! # Deckhand Model
//!
//! Shared domain types for the Deckhand cache residency planner.
//!
//! This crate holds the plain data the rest of the workspace operates on:
//! server instances and their path-mapping rules, users and per-library
//! policies, media files with their series ordering keys, the immutable
//! per-cycle configuration snapshot, and the move plan the diff engine
//! produces. No I/O lives here.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod cycle;
pub mod instance;
pub mod media;
pub mod plan;

pub use cycle::{CycleConfig, OriginDiskPolicy};
pub use instance::{Instance, LibraryKind, LibraryPolicy, PathRule, UserRecord};
pub use media::{EpisodeKey, MediaFile};
pub use plan::{MoveOp, MovePlan, SkipReason};
