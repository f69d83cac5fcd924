//! Readiness, preprocessing, and submission for template-aware messages.
//!
//! The engine sits between a [`DocumentTree`](composer_document::DocumentTree)
//! and the outside world. Every read (requirements, gate, flattening) is a
//! fresh pass over the document; writes go through [`selection`] helpers or
//! the [`Composer`], which also reports what happened to a
//! [`ComposerObserver`].

#![warn(missing_docs, clippy::pedantic)]

mod composer;
mod error;
pub mod flatten;
pub mod gate;
pub mod index;
mod observer;
pub mod requirements;
pub mod runner;
pub mod selection;

pub use composer::{ChatTransport, Composer, SubmitOutcome};
pub use error::{EngineError, EngineResult};
pub use flatten::{
    build_user_inline_children_from_text, render_marker, to_plain_text_replacing_variables,
};
pub use gate::{Blocker, GateReport, SelectionReadiness, evaluate_submission};
pub use index::{SelectionEntry, SelectionIndex};
pub use observer::{
    CollectingObserver, ComposerEvent, ComposerObserver, CompositeObserver, TracingObserver,
};
pub use requirements::{PendingTool, Requirements, compute_requirements, requirements_for};
pub use runner::{
    CallOutcome, PlannedCall, PreprocessorFailure, RunReport, apply_outcomes, execute_planned,
    plan_ready_preprocessors, run_all_ready_preprocessors,
};
