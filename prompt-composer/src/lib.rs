//! Template-aware chat message composer.
//!
//! Depend on this crate via `cargo add prompt-composer`. It bundles the
//! composer crates behind feature flags so embedders can leave out the
//! engine or the logging setup when they only need the data model.

#![warn(missing_docs, clippy::pedantic)]

/// Identifiers shared by every crate.
pub use composer_primitives as primitives;

/// Template definitions, instances, and value resolution.
pub use composer_templates as templates;

/// Document tree contract and in-memory document.
pub use composer_document as document;

/// Tool invocation and result extraction (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use composer_tools as tools;

/// Requirements, gate, runner, and submission (enabled by `engine` feature).
#[cfg(feature = "engine")]
pub use composer_engine as engine;

/// Configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use composer_config as config;

/// Tracing subscriber setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use composer_telemetry as telemetry;
