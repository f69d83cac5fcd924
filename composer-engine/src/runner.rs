//! Preprocessor runner.
//!
//! A run has three phases so tool latency never overlaps document access:
//! [`plan_ready_preprocessors`] reads the document, [`execute_planned`] talks
//! to the tools, and [`apply_outcomes`] writes results back to selections that
//! are still present. Application is sequential, one outcome at a time.

use std::time::Duration;

use composer_config::{ComposerConfig, RunnerConfig};
use composer_document::{DocumentTree, Node};
use composer_primitives::{SelectionId, TemplateKey};
use composer_templates::{
    OnErrorPolicy, PreProcessorCall, ToolEvent, ToolFallback, ToolStatus, effective_args,
};
use composer_tools::{ToolError, ToolInvoker, ToolResult, extract_path, reject_error_payload};
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::index::{SelectionIndex, instance_at};
use crate::observer::{ComposerEvent, ComposerObserver};
use crate::requirements::{requirements_for, value_lookup};

/// A preprocessor that failed during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreprocessorFailure {
    /// Owning selection.
    pub selection_id: SelectionId,
    /// Preprocessor id.
    pub pre_processor_id: String,
    /// Variable the result would have been saved to.
    pub save_as: String,
    /// Human-readable failure.
    pub error: String,
}

/// Summary of one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// `true` when no preprocessor failed.
    pub ok: bool,
    /// Every failure, in planning order.
    pub errors: Vec<PreprocessorFailure>,
    /// Results written to a selection.
    pub completed: usize,
    /// Outcomes discarded because their selection left the document.
    pub dropped: usize,
}

/// A ready preprocessor captured at planning time.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedCall {
    /// Owning selection.
    pub selection_id: SelectionId,
    /// Template of the owning selection.
    pub key: TemplateKey,
    /// Effective preprocessor declaration.
    pub pre_processor: PreProcessorCall,
    /// Effective arguments.
    pub args: Map<String, Value>,
    /// Argument variables without a value.
    pub unresolved: Vec<String>,
}

/// Result of executing one planned call.
#[derive(Debug)]
pub struct CallOutcome {
    /// The call that ran.
    pub call: PlannedCall,
    /// Extracted value or failure.
    pub result: ToolResult<Value>,
}

/// Collects every ready preprocessor of every selection, in document order
/// then declaration order.
#[must_use]
pub fn plan_ready_preprocessors<D>(doc: &D, fallback: ToolFallback) -> Vec<PlannedCall>
where
    D: DocumentTree + ?Sized,
{
    let index = SelectionIndex::scan(doc);
    let mut planned = Vec::new();

    for entry in index.entries() {
        let Some(instance) = instance_at(doc, &entry.path) else {
            continue;
        };
        let requirements = requirements_for(instance, fallback);
        let lookup = value_lookup(&requirements.variable_values, instance.variables());

        for call in instance.effective().pre_processors() {
            let Some(state) = instance.tool_state(&call.id) else {
                continue;
            };
            if state.status != ToolStatus::Ready {
                continue;
            }
            let args = effective_args(call, Some(state), lookup);
            planned.push(PlannedCall {
                selection_id: entry.selection_id,
                key: entry.key.clone(),
                pre_processor: call.clone(),
                args: args.args,
                unresolved: args.unresolved,
            });
        }
    }

    planned
}

/// Invokes planned calls, at most `max_concurrent_calls` at a time.
///
/// Outcomes come back in planning order. Calls with unresolved inputs are
/// not sent to the tool and fail immediately.
pub async fn execute_planned(
    calls: Vec<PlannedCall>,
    invoker: &dyn ToolInvoker,
    config: &RunnerConfig,
) -> Vec<CallOutcome> {
    let limit = config.max_concurrent_calls.max(1);
    let timeout_ms = config.call_timeout_ms;

    stream::iter(calls)
        .map(move |call| async move {
            let result = invoke_one(&call, invoker, timeout_ms).await;
            CallOutcome { call, result }
        })
        .buffered(limit)
        .collect()
        .await
}

async fn invoke_one(
    call: &PlannedCall,
    invoker: &dyn ToolInvoker,
    timeout_ms: Option<u64>,
) -> ToolResult<Value> {
    if let Some(name) = call.unresolved.first() {
        return Err(ToolError::execution(format!("argument variable `{name}` has no value")));
    }

    let tool_id = call.pre_processor.tool_id.as_str();
    debug!(
        selection_id = %call.selection_id,
        pre_processor = %call.pre_processor.id,
        tool_id,
        "invoking tool"
    );
    let invocation = invoker.invoke(tool_id, Value::Object(call.args.clone()));
    let raw = match timeout_ms {
        Some(millis) => tokio::time::timeout(Duration::from_millis(millis), invocation)
            .await
            .map_err(|_| ToolError::Timeout { millis })??,
        None => invocation.await?,
    };

    let payload = reject_error_payload(raw)?;
    match call.pre_processor.path_expr.as_deref() {
        Some(expr) => extract_path(&payload, expr),
        None => Ok(payload),
    }
}

/// Writes outcomes back to their selections.
///
/// An outcome whose selection no longer resolves is dropped. With
/// `drop_late_results` off, a selection of the same template is used instead.
pub fn apply_outcomes<D>(
    doc: &mut D,
    outcomes: Vec<CallOutcome>,
    config: &RunnerConfig,
    observer: &dyn ComposerObserver,
) -> RunReport
where
    D: DocumentTree + ?Sized,
{
    let index = SelectionIndex::scan(doc);
    let mut report = RunReport::default();

    for CallOutcome { call, result } in outcomes {
        let entry = if config.drop_late_results {
            index.by_id(call.selection_id)
        } else {
            index.resolve(call.selection_id, &call.key)
        };
        let Some(instance) = entry
            .and_then(|entry| doc.node_mut(&entry.path))
            .and_then(Node::as_selection_mut)
        else {
            warn!(
                selection_id = %call.selection_id,
                pre_processor = %call.pre_processor.id,
                "dropping result for removed selection"
            );
            report.dropped += 1;
            continue;
        };

        let selection_id = instance.selection_id();
        let id = call.pre_processor.id.as_str();
        let save_as = call.pre_processor.save_as.as_str();

        let event = match (&result, call.pre_processor.on_error) {
            (Ok(value), _) => ToolEvent::Complete {
                args: call.args.clone(),
                result: value.clone(),
            },
            (Err(err), OnErrorPolicy::Fail) => ToolEvent::Fail {
                error: err.to_string(),
            },
            (Err(err), OnErrorPolicy::Ignore) => ToolEvent::FailIgnored {
                error: err.to_string(),
            },
        };

        let status = match instance.apply_tool_event(id, event) {
            Ok(status) => status,
            Err(err) => {
                warn!(
                    %selection_id,
                    pre_processor = id,
                    ?err,
                    "dropping result for re-scheduled preprocessor"
                );
                report.dropped += 1;
                continue;
            }
        };

        match result {
            Ok(value) => {
                instance.set_variable(save_as, Some(value));
                report.completed += 1;
                observer.on_event(&ComposerEvent::VariablesUpdated { selection_id });
            }
            Err(err) if call.pre_processor.on_error == OnErrorPolicy::Ignore => {
                warn!(
                    %selection_id,
                    pre_processor = id,
                    error = %err,
                    "ignoring preprocessor failure"
                );
            }
            Err(err) => {
                warn!(%selection_id, pre_processor = id, error = %err, "preprocessor failed");
                report.errors.push(PreprocessorFailure {
                    selection_id,
                    pre_processor_id: id.to_owned(),
                    save_as: save_as.to_owned(),
                    error: err.to_string(),
                });
            }
        }

        observer.on_event(&ComposerEvent::ToolStateChanged {
            selection_id,
            pre_processor: id.to_owned(),
            status,
        });
    }

    report.ok = report.errors.is_empty();
    report
}

/// Plans, executes, and applies every ready preprocessor in the document.
pub async fn run_all_ready_preprocessors<D>(
    doc: &mut D,
    invoker: &dyn ToolInvoker,
    config: &ComposerConfig,
    observer: &dyn ComposerObserver,
) -> RunReport
where
    D: DocumentTree + ?Sized,
{
    let planned = plan_ready_preprocessors(doc, config.resolution.tool_fallback);
    if planned.is_empty() {
        return RunReport {
            ok: true,
            ..RunReport::default()
        };
    }

    debug!(calls = planned.len(), "running ready preprocessors");
    let outcomes = execute_planned(planned, invoker, &config.runner).await;
    apply_outcomes(doc, outcomes, &config.runner, observer)
}
