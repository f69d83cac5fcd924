//! Notifications emitted by the composer.
//!
//! Editors subscribe through [`ComposerObserver`] instead of global events:
//! toolbars listen for [`ComposerEvent::Flash`], inline markers re-render on
//! [`ComposerEvent::VariablesUpdated`] for their selection, and so on.

use std::sync::{Arc, Mutex, PoisonError};

use composer_document::TreePath;
use composer_primitives::SelectionId;
use composer_templates::ToolStatus;
use tracing::{debug, info, warn};

use crate::runner::PreprocessorFailure;

/// Something the UI may want to react to.
#[derive(Clone, Debug, PartialEq)]
pub enum ComposerEvent {
    /// Draw attention to the toolbars of every blocking selection.
    Flash {
        /// Selections with missing values or pending preprocessors.
        selections: Vec<SelectionId>,
    },
    /// The cursor was moved to a blocking item.
    FocusMoved {
        /// Selection owning the item.
        selection_id: SelectionId,
        /// Variable the cursor now sits on, when a marker was found.
        variable: Option<String>,
        /// Path the cursor collapsed to.
        path: TreePath,
    },
    /// Stored values of a selection changed.
    VariablesUpdated {
        /// Affected selection.
        selection_id: SelectionId,
    },
    /// A preprocessor changed status or recorded an error.
    ToolStateChanged {
        /// Owning selection.
        selection_id: SelectionId,
        /// Preprocessor id.
        pre_processor: String,
        /// Status after the change.
        status: ToolStatus,
    },
    /// Preprocessors failed during submission.
    ToolRunFailed {
        /// Every failure of the run.
        failures: Vec<PreprocessorFailure>,
    },
    /// A selection left the document.
    SelectionRemoved {
        /// Removed selection.
        selection_id: SelectionId,
        /// `true` when its markers were turned into literal text.
        flattened: bool,
    },
    /// The message was handed to the chat transport.
    Submitted {
        /// Length of the sent text in bytes.
        bytes: usize,
    },
}

/// Receives composer notifications.
pub trait ComposerObserver: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &ComposerEvent);
}

/// Observer that writes events to the tracing system.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ComposerObserver for TracingObserver {
    fn on_event(&self, event: &ComposerEvent) {
        match event {
            ComposerEvent::Flash { selections } => {
                debug!(count = selections.len(), "flash blocking selections");
            }
            ComposerEvent::FocusMoved {
                selection_id,
                variable,
                path,
            } => {
                debug!(%selection_id, ?variable, ?path, "focus moved to blocker");
            }
            ComposerEvent::VariablesUpdated { selection_id } => {
                debug!(%selection_id, "selection variables updated");
            }
            ComposerEvent::ToolStateChanged {
                selection_id,
                pre_processor,
                status,
            } => {
                debug!(%selection_id, %pre_processor, ?status, "preprocessor state changed");
            }
            ComposerEvent::ToolRunFailed { failures } => {
                for failure in failures {
                    warn!(
                        selection_id = %failure.selection_id,
                        pre_processor = %failure.pre_processor_id,
                        save_as = %failure.save_as,
                        error = %failure.error,
                        "preprocessor failed"
                    );
                }
            }
            ComposerEvent::SelectionRemoved {
                selection_id,
                flattened,
            } => {
                debug!(%selection_id, flattened, "selection removed");
            }
            ComposerEvent::Submitted { bytes } => {
                info!(bytes, "message submitted");
            }
        }
    }
}

/// Composite observer that forwards events to a collection of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ComposerObserver>>,
}

impl CompositeObserver {
    /// Creates a new composite observer from the supplied list.
    #[must_use]
    pub fn new<I>(observers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ComposerObserver>>,
    {
        Self {
            observers: observers.into_iter().collect(),
        }
    }

    /// Adds an observer to the composite set.
    pub fn push(&mut self, observer: Arc<dyn ComposerObserver>) {
        self.observers.push(observer);
    }
}

impl ComposerObserver for CompositeObserver {
    fn on_event(&self, event: &ComposerEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Observer that keeps every event, for tests and replay.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ComposerEvent>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Removes and returns the collected events.
    #[must_use]
    pub fn drain(&self) -> Vec<ComposerEvent> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.drain(..).collect()
    }
}

impl ComposerObserver for CollectingObserver {
    fn on_event(&self, event: &ComposerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
