//! Rule model and bundle loader
//!
//! Parses rule bundles (the hybrid format and the legacy flat format) into a
//! strongly-typed, immutable rule set and validates structural invariants.
//!
//! # Formats
//!
//! - **Single file**: `.json` or `.yaml`/`.yml`, dispatched on extension. A
//!   top-level `rules` list marks the hybrid format; a flat mapping is
//!   converted from the legacy format.
//! - **Directory**: an index file (`bundle.json`, `index.json`, or
//!   `manifest.json`) plus sibling YAML rule files whose `rules` lists are
//!   merged into one bundle.

pub mod legacy;
pub mod loader;
pub mod types;
pub mod validate;

pub use legacy::convert_legacy_bundle;
pub use loader::RulesLoader;
pub use types::*;
pub use validate::{is_plausible_policy_source, validate_rule};
