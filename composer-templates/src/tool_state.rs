//! Preprocessor state machine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};

/// Run status of one preprocessor within a selection instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Declared but not yet scheduled by the user.
    #[default]
    Pending,
    /// Scheduled to run on the next submission.
    Ready,
    /// Ran successfully (or failed under an ignore policy).
    Done,
}

impl ToolStatus {
    /// Returns `true` once the preprocessor no longer needs to run.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Events that drive [`ToolState`] transitions.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolEvent {
    /// The user asked for the preprocessor to run. Also used to re-run a
    /// finished preprocessor.
    MarkReady,
    /// A run succeeded with the extracted result.
    Complete {
        /// Effective arguments the tool was invoked with.
        args: Map<String, Value>,
        /// Extracted result.
        result: Value,
    },
    /// A run failed; the state stays ready so the next submission retries.
    Fail {
        /// Human-readable failure.
        error: String,
    },
    /// A run failed under [`OnErrorPolicy::Ignore`](crate::OnErrorPolicy::Ignore).
    FailIgnored {
        /// Human-readable failure.
        error: String,
    },
}

impl ToolEvent {
    /// Short name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MarkReady => "mark_ready",
            Self::Complete { .. } => "complete",
            Self::Fail { .. } => "fail",
            Self::FailIgnored { .. } => "fail_ignored",
        }
    }
}

/// Per-instance state of one preprocessor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolState {
    /// Current status.
    pub status: ToolStatus,
    /// Effective arguments of the last successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
    /// User edits shadowing the declared static arguments.
    #[serde(
        default,
        rename = "argOverrides",
        skip_serializing_if = "Option::is_none"
    )]
    pub arg_overrides: Option<Map<String, Value>>,
    /// Extracted result of the last successful run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error of the last failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolState {
    /// Creates a pending state.
    #[must_use]
    pub fn pending() -> Self {
        Self::default()
    }

    /// Applies an event, returning the resulting status.
    ///
    /// Status never moves backwards on its own: only an explicit
    /// [`ToolEvent::MarkReady`] takes a finished preprocessor back to ready.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::InvalidToolTransition`] when a completion or
    /// failure arrives for a preprocessor that is not ready.
    pub fn apply(&mut self, id: &str, event: ToolEvent) -> TemplateResult<ToolStatus> {
        let from = self.status;
        let event_name = event.name();

        match (from, event) {
            (_, ToolEvent::MarkReady) => {
                self.status = ToolStatus::Ready;
                self.error = None;
            }
            (ToolStatus::Ready, ToolEvent::Complete { args, result }) => {
                self.status = ToolStatus::Done;
                self.args = Some(args);
                self.result = Some(result);
                self.error = None;
            }
            (ToolStatus::Ready, ToolEvent::Fail { error }) => {
                self.error = Some(error);
            }
            (ToolStatus::Ready, ToolEvent::FailIgnored { error }) => {
                self.status = ToolStatus::Done;
                self.result = None;
                self.error = Some(error);
            }
            _ => {
                return Err(TemplateError::InvalidToolTransition {
                    id: id.to_owned(),
                    from,
                    event: event_name,
                });
            }
        }

        if from != self.status {
            debug!(
                pre_processor = id,
                ?from,
                to = ?self.status,
                event = event_name,
                "preprocessor transition"
            );
        }

        Ok(self.status)
    }

    /// Replaces the argument overrides without touching the status.
    pub fn set_arg_overrides(&mut self, args: Map<String, Value>) {
        self.arg_overrides = if args.is_empty() { None } else { Some(args) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete(result: Value) -> ToolEvent {
        ToolEvent::Complete {
            args: Map::new(),
            result,
        }
    }

    #[test]
    fn pending_to_done_flow() {
        let mut state = ToolState::pending();
        assert_eq!(state.apply("p1", ToolEvent::MarkReady).unwrap(), ToolStatus::Ready);
        assert_eq!(state.apply("p1", complete(json!("ok"))).unwrap(), ToolStatus::Done);
        assert_eq!(state.result, Some(json!("ok")));
    }

    #[test]
    fn failure_keeps_ready_for_retry() {
        let mut state = ToolState::pending();
        state.apply("p1", ToolEvent::MarkReady).unwrap();
        state
            .apply("p1", ToolEvent::Fail { error: "boom".into() })
            .unwrap();
        assert_eq!(state.status, ToolStatus::Ready);
        assert_eq!(state.error.as_deref(), Some("boom"));

        state.apply("p1", complete(json!(1))).unwrap();
        assert!(state.status.is_done());
        assert!(state.error.is_none());
    }

    #[test]
    fn ignored_failure_finishes_without_result() {
        let mut state = ToolState::pending();
        state.apply("p1", ToolEvent::MarkReady).unwrap();
        state
            .apply("p1", ToolEvent::FailIgnored { error: "boom".into() })
            .unwrap();
        assert_eq!(state.status, ToolStatus::Done);
        assert!(state.result.is_none());
    }

    #[test]
    fn completion_requires_ready() {
        let mut state = ToolState::pending();
        let err = state
            .apply("p1", complete(json!(1)))
            .expect_err("pending cannot complete");
        assert!(matches!(
            err,
            TemplateError::InvalidToolTransition {
                from: ToolStatus::Pending,
                event: "complete",
                ..
            }
        ));
    }

    #[test]
    fn editing_args_does_not_reset_done() {
        let mut state = ToolState::pending();
        state.apply("p1", ToolEvent::MarkReady).unwrap();
        state.apply("p1", complete(json!(1))).unwrap();

        let mut args = Map::new();
        args.insert("q".into(), json!("dogs"));
        state.set_arg_overrides(args);
        assert_eq!(state.status, ToolStatus::Done);

        // explicit re-run
        state.apply("p1", ToolEvent::MarkReady).unwrap();
        assert_eq!(state.status, ToolStatus::Ready);
    }
}
