//! Submission pipeline and the user-facing editing surface.

use std::sync::Arc;

use async_trait::async_trait;
use composer_config::ComposerConfig;
use composer_document::DocumentTree;
use composer_primitives::{SelectionId, TemplateKey};
use composer_templates::{TemplateOverrides, TemplateSelectionInstance, TemplateStore};
use composer_tools::ToolInvoker;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::flatten::to_plain_text_replacing_variables;
use crate::gate::{GateReport, evaluate_submission};
use crate::observer::{ComposerEvent, ComposerObserver, TracingObserver};
use crate::runner::{RunReport, run_all_ready_preprocessors};
use crate::selection;

/// Destination of a finished message.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends the flattened message text.
    ///
    /// # Errors
    ///
    /// Implementations return [`EngineError::Transport`] when delivery fails.
    async fn send(&self, text: &str) -> EngineResult<()>;
}

/// What happened to a submit attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// The gate refused; focus was moved to the first blocker.
    Blocked(GateReport),
    /// At least one preprocessor failed; focus was moved to the first failure.
    ToolsFailed(RunReport),
    /// The message was delivered and the document cleared.
    Sent(String),
}

/// Template-aware message composer.
///
/// Holds the collaborators and configuration; document state stays with the
/// caller and is passed to every operation.
pub struct Composer {
    config: ComposerConfig,
    store: Arc<dyn TemplateStore>,
    tools: Arc<dyn ToolInvoker>,
    observer: Arc<dyn ComposerObserver>,
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Composer {
    /// Creates a composer with default configuration that logs its events.
    #[must_use]
    pub fn new(store: Arc<dyn TemplateStore>, tools: Arc<dyn ToolInvoker>) -> Self {
        Self {
            config: ComposerConfig::default(),
            store,
            tools,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ComposerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ComposerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    fn emit(&self, event: &ComposerEvent) {
        self.observer.on_event(event);
    }

    /// Fetches a template and inserts a fresh selection of it at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TemplateNotFound`] for unknown keys, store
    /// failures, or tree errors for invalid paths.
    pub async fn insert_template<D>(
        &self,
        doc: &mut D,
        key: &TemplateKey,
        path: &[usize],
    ) -> EngineResult<SelectionId>
    where
        D: DocumentTree + ?Sized,
    {
        let definition = self
            .store
            .fetch(key)
            .await?
            .ok_or_else(|| EngineError::TemplateNotFound { key: key.clone() })?;

        let instance = TemplateSelectionInstance::new(key.clone(), definition);
        let selection_id = selection::insert_selection(doc, path, instance)?;
        info!(%selection_id, %key, "template inserted");
        Ok(selection_id)
    }

    /// Evaluates the submission gate without side effects.
    #[must_use]
    pub fn readiness<D>(&self, doc: &D) -> GateReport
    where
        D: DocumentTree + ?Sized,
    {
        evaluate_submission(doc, &self.config)
    }

    /// Returns the text the document would be sent as.
    #[must_use]
    pub fn plain_text<D>(&self, doc: &D) -> String
    where
        D: DocumentTree + ?Sized,
    {
        to_plain_text_replacing_variables(
            doc,
            self.config.resolution.tool_fallback,
            &self.config.flatten.paragraph_separator,
        )
    }

    /// Commits raw marker input. See [`selection::commit_variable`].
    ///
    /// # Errors
    ///
    /// Propagates lookup and coercion failures.
    pub fn commit_variable<D>(
        &self,
        doc: &mut D,
        selection_id: SelectionId,
        name: &str,
        raw: &str,
    ) -> EngineResult<bool>
    where
        D: DocumentTree + ?Sized,
    {
        let changed = selection::commit_variable(doc, selection_id, name, raw)?;
        if changed {
            self.emit(&ComposerEvent::VariablesUpdated { selection_id });
        }
        Ok(changed)
    }

    /// Saves the override modal. See [`selection::apply_overrides`].
    ///
    /// # Errors
    ///
    /// Propagates lookup and coercion failures.
    pub fn apply_overrides<D>(
        &self,
        doc: &mut D,
        selection_id: SelectionId,
        overrides: TemplateOverrides,
        values: &[(&str, &str)],
    ) -> EngineResult<()>
    where
        D: DocumentTree + ?Sized,
    {
        selection::apply_overrides(doc, selection_id, overrides, values)?;
        self.emit(&ComposerEvent::VariablesUpdated { selection_id });
        Ok(())
    }

    /// Schedules a preprocessor for the next run.
    ///
    /// # Errors
    ///
    /// Fails for unknown selections or preprocessors.
    pub fn mark_tool_ready<D>(
        &self,
        doc: &mut D,
        selection_id: SelectionId,
        pre_processor_id: &str,
    ) -> EngineResult<()>
    where
        D: DocumentTree + ?Sized,
    {
        let status = selection::mark_tool_ready(doc, selection_id, pre_processor_id)?;
        self.emit(&ComposerEvent::ToolStateChanged {
            selection_id,
            pre_processor: pre_processor_id.to_owned(),
            status,
        });
        Ok(())
    }

    /// Edits a preprocessor's argument overrides.
    ///
    /// # Errors
    ///
    /// Fails for unknown selections or preprocessors.
    pub fn set_tool_args<D>(
        &self,
        doc: &mut D,
        selection_id: SelectionId,
        pre_processor_id: &str,
        args: Map<String, Value>,
    ) -> EngineResult<()>
    where
        D: DocumentTree + ?Sized,
    {
        selection::set_tool_args(doc, selection_id, pre_processor_id, args)
    }

    /// Removes a selection with its markers.
    ///
    /// # Errors
    ///
    /// Fails when the selection is not in the document.
    pub fn remove_selection<D>(
        &self,
        doc: &mut D,
        selection_id: SelectionId,
    ) -> EngineResult<TemplateSelectionInstance>
    where
        D: DocumentTree + ?Sized,
    {
        let instance = selection::remove_selection(doc, selection_id)?;
        self.emit(&ComposerEvent::SelectionRemoved {
            selection_id,
            flattened: false,
        });
        Ok(instance)
    }

    /// Turns a selection into literal text.
    ///
    /// # Errors
    ///
    /// Fails when the selection is not in the document.
    pub fn flatten_selection<D>(
        &self,
        doc: &mut D,
        selection_id: SelectionId,
    ) -> EngineResult<TemplateSelectionInstance>
    where
        D: DocumentTree + ?Sized,
    {
        let fallback = self.config.resolution.tool_fallback;
        let instance = selection::flatten_selection(doc, selection_id, fallback)?;
        self.emit(&ComposerEvent::SelectionRemoved {
            selection_id,
            flattened: true,
        });
        Ok(instance)
    }

    /// Runs every ready preprocessor outside of a submission.
    pub async fn run_preprocessors<D>(&self, doc: &mut D) -> RunReport
    where
        D: DocumentTree + ?Sized,
    {
        run_all_ready_preprocessors(
            doc,
            self.tools.as_ref(),
            &self.config,
            self.observer.as_ref(),
        )
        .await
    }

    /// Gate, run preprocessors, gate again, flatten, send, clear.
    ///
    /// Stops at the first stage that fails and reports it as an outcome;
    /// nothing is retried automatically. The second gate check catches
    /// preprocessors that finished without producing a required value.
    ///
    /// # Errors
    ///
    /// Only transport failures are errors. The document is kept intact when
    /// delivery fails.
    pub async fn submit<D>(
        &self,
        doc: &mut D,
        transport: &dyn ChatTransport,
    ) -> EngineResult<SubmitOutcome>
    where
        D: DocumentTree + ?Sized,
    {
        if let Some(report) = self.check_gate(doc) {
            return Ok(SubmitOutcome::Blocked(report));
        }

        let run = self.run_preprocessors(doc).await;
        if !run.ok {
            self.emit(&ComposerEvent::ToolRunFailed {
                failures: run.errors.clone(),
            });
            if let Some(first) = run.errors.first() {
                let focus =
                    selection::focus_selection(doc, first.selection_id, Some(&first.save_as));
                if let Some(event) = focus {
                    self.emit(&event);
                }
            }
            return Ok(SubmitOutcome::ToolsFailed(run));
        }

        if let Some(report) = self.check_gate(doc) {
            return Ok(SubmitOutcome::Blocked(report));
        }

        let text = self.plain_text(doc);
        transport.send(&text).await?;
        doc.clear();
        self.emit(&ComposerEvent::Submitted { bytes: text.len() });
        Ok(SubmitOutcome::Sent(text))
    }

    /// Returns the report when the gate refuses, after surfacing its blocker.
    fn check_gate<D>(&self, doc: &mut D) -> Option<GateReport>
    where
        D: DocumentTree + ?Sized,
    {
        let report = self.readiness(doc);
        if report.is_allowed() {
            return None;
        }

        debug!(
            required = report.required_count,
            pending = report.pending_tool_count,
            empty = report.empty_message,
            "submission blocked"
        );
        self.surface_blocker(doc, &report);
        Some(report)
    }

    fn surface_blocker<D>(&self, doc: &mut D, report: &GateReport)
    where
        D: DocumentTree + ?Sized,
    {
        if let Some(blocker) = &report.first_blocker {
            if let Some(selection_id) = blocker.selection_id() {
                let variable = blocker.focus_variable();
                if let Some(event) = selection::focus_selection(doc, selection_id, variable) {
                    self.emit(&event);
                }
            }
        }

        let selections = report.blocking_selections();
        if !selections.is_empty() {
            self.emit(&ComposerEvent::Flash { selections });
        }
    }
}
