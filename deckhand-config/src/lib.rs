//! Settings document handling for Deckhand.
//!
//! The interactive setup wizard (an external collaborator) produces a JSON
//! settings document. This crate parses it, applies defaults, validates it
//! (hard errors plus soft warnings), and converts it into the immutable
//! [`deckhand_model::CycleConfig`] snapshot the engine consumes. The core
//! never reads the document itself; it only ever sees the snapshot.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod settings;
pub mod validate;

pub use settings::{
    InstanceSettings, LibraryPolicySettings, PathRuleSettings, Settings, SettingsError,
    UserSettings,
};
pub use validate::ConfigWarning;
