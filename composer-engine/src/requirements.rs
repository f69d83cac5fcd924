//! Per-selection readiness.

use std::collections::BTreeMap;

use composer_templates::{
    PreProcessorCall, TemplateSelectionInstance, ToolContext, ToolFallback, ToolState, ToolStatus,
    Variable, effective_args, effective_value, is_empty_value,
};
use serde_json::Value;

/// A preprocessor that has not finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTool {
    /// Preprocessor id.
    pub id: String,
    /// Variable the result is written to.
    pub save_as: String,
    /// Current status, `Pending` or `Ready`.
    pub status: ToolStatus,
    /// Variables referenced by the arguments that have no value yet.
    pub unresolved_inputs: Vec<String>,
    /// Error of the last failed run.
    pub error: Option<String>,
}

impl PendingTool {
    /// Returns `true` when this preprocessor blocks submission: it was never
    /// scheduled, or it cannot be invoked because an input is missing.
    /// A ready preprocessor with complete inputs is run at submission.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.status == ToolStatus::Pending || !self.unresolved_inputs.is_empty()
    }
}

/// Readiness of one selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Requirements {
    /// Effective value of every declared variable, in schema order.
    pub variable_values: BTreeMap<String, Option<Value>>,
    /// Required variables without a value and without a pending
    /// preprocessor that will produce one, in schema order.
    pub required_variables: Vec<String>,
    /// `required_variables.len()`.
    pub required_count: usize,
    /// Preprocessors not yet done, in declaration order.
    pub pending_tools: Vec<PendingTool>,
}

impl Requirements {
    /// Returns the preprocessors that block submission.
    pub fn blocking_tools(&self) -> impl Iterator<Item = &PendingTool> {
        self.pending_tools.iter().filter(|tool| tool.is_blocking())
    }

    /// Number of preprocessors that block submission.
    #[must_use]
    pub fn blocking_tool_count(&self) -> usize {
        self.blocking_tools().count()
    }

    /// Returns `true` when nothing blocks submission.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.required_count == 0 && self.blocking_tool_count() == 0
    }

    /// Returns the effective value of one variable.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.variable_values.get(name)?.as_ref()
    }
}

/// Computes what still blocks one selection.
///
/// A required variable counts as missing only when it has no effective value
/// and no unfinished preprocessor saves into it; in that case the
/// preprocessor is reported instead, so nothing is counted twice.
#[must_use]
pub fn compute_requirements(
    variables_schema: &[Variable],
    user_values: &BTreeMap<String, Value>,
    pre_processors: Option<&[PreProcessorCall]>,
    tool_states: Option<&BTreeMap<String, ToolState>>,
    fallback: ToolFallback,
) -> Requirements {
    let no_states = BTreeMap::new();
    let states = tool_states.unwrap_or(&no_states);
    let tools = pre_processors.map(|calls| ToolContext::new(calls, states).with_fallback(fallback));

    let variable_values: BTreeMap<String, Option<Value>> = variables_schema
        .iter()
        .map(|var| (var.name.clone(), effective_value(var, user_values, tools)))
        .collect();

    let lookup = value_lookup(&variable_values, user_values);

    let pending_tools: Vec<PendingTool> = pre_processors
        .unwrap_or_default()
        .iter()
        .filter_map(|call| {
            let state = states.get(&call.id);
            let status = state.map_or(ToolStatus::Pending, |s| s.status);
            if status.is_done() {
                return None;
            }
            let args = effective_args(call, state, lookup);
            Some(PendingTool {
                id: call.id.clone(),
                save_as: call.save_as.clone(),
                status,
                unresolved_inputs: args.unresolved,
                error: state.and_then(|s| s.error.clone()),
            })
        })
        .collect();

    let required_variables: Vec<String> = variables_schema
        .iter()
        .filter(|var| var.required)
        .filter(|var| {
            variable_values
                .get(&var.name)
                .and_then(Option::as_ref)
                .is_none_or(is_empty_value)
        })
        .filter(|var| !pending_tools.iter().any(|tool| tool.save_as == var.name))
        .map(|var| var.name.clone())
        .collect();

    Requirements {
        variable_values,
        required_count: required_variables.len(),
        required_variables,
        pending_tools,
    }
}

/// Looks up argument inputs: declared variables by effective value, anything
/// else by stored value. Empty values count as missing.
pub(crate) fn value_lookup<'a>(
    variable_values: &'a BTreeMap<String, Option<Value>>,
    user_values: &'a BTreeMap<String, Value>,
) -> impl Fn(&str) -> Option<Value> + Copy + 'a {
    move |name| {
        match variable_values.get(name) {
            Some(value) => value.clone(),
            None => user_values.get(name).cloned(),
        }
        .filter(|v| !is_empty_value(v))
    }
}

/// Computes the requirements of an instance from its effective template.
#[must_use]
pub fn requirements_for(
    instance: &TemplateSelectionInstance,
    fallback: ToolFallback,
) -> Requirements {
    let effective = instance.effective();
    compute_requirements(
        effective.variables_schema(),
        instance.variables(),
        Some(effective.pre_processors()),
        Some(instance.tool_states()),
        fallback,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use composer_primitives::TemplateKey;
    use composer_templates::{TemplateDefinition, ToolEvent, VariableSource, VariableType};
    use serde_json::{Map, json};

    fn key() -> TemplateKey {
        TemplateKey::new("core", "t", "1").unwrap()
    }

    fn topic_template() -> TemplateDefinition {
        TemplateDefinition::new("Topic")
            .with_variable(Variable::new("topic", VariableType::String).required())
            .with_variable(Variable::new("tone", VariableType::String).with_default("dry"))
    }

    #[test]
    fn scenario_missing_required_topic() {
        let mut instance = TemplateSelectionInstance::new(key(), topic_template());
        let req = requirements_for(&instance, ToolFallback::BySaveAs);
        assert_eq!(req.required_count, 1);
        assert_eq!(req.required_variables, vec!["topic"]);
        assert_eq!(req.value("tone"), Some(&json!("dry")));

        instance.set_variable("topic", Some(json!("cats")));
        let req = requirements_for(&instance, ToolFallback::BySaveAs);
        assert_eq!(req.required_count, 0);
        assert!(req.is_ready());
    }

    #[test]
    fn filling_one_required_value_decrements_by_one() {
        let def = TemplateDefinition::new("Two")
            .with_variable(Variable::new("a", VariableType::String).required())
            .with_variable(Variable::new("b", VariableType::Number).required());
        let mut instance = TemplateSelectionInstance::new(key(), def);
        let before = requirements_for(&instance, ToolFallback::BySaveAs);

        instance.set_variable("b", Some(json!(2)));
        let after = requirements_for(&instance, ToolFallback::BySaveAs);

        assert_eq!(after.required_count, before.required_count - 1);
        assert!(!after.required_variables.contains(&"b".to_owned()));
        assert_eq!(after.required_variables, vec!["a"]);
    }

    #[test]
    fn tool_backed_variable_is_counted_once() {
        let def = TemplateDefinition::new("Summary")
            .with_variable(
                Variable::new("summary", VariableType::String)
                    .with_source(VariableSource::Tool)
                    .required(),
            )
            .with_pre_processor(composer_templates::PreProcessorCall::new(
                "p1", "search", "summary",
            ));
        let instance = TemplateSelectionInstance::new(key(), def);

        let req = requirements_for(&instance, ToolFallback::BySaveAs);
        assert_eq!(req.required_count, 0);
        assert_eq!(req.pending_tools.len(), 1);
        assert_eq!(req.blocking_tool_count(), 1);
        assert!(!req.is_ready());
    }

    #[test]
    fn unbacked_tool_variable_is_missing() {
        let def = TemplateDefinition::new("Orphan").with_variable(
            Variable::new("summary", VariableType::String)
                .with_source(VariableSource::Tool)
                .required(),
        );
        let instance = TemplateSelectionInstance::new(key(), def);
        let req = requirements_for(&instance, ToolFallback::BySaveAs);
        assert_eq!(req.required_variables, vec!["summary"]);
    }

    #[test]
    fn ready_tool_blocks_only_on_missing_inputs() {
        let def = TemplateDefinition::new("Search")
            .with_variable(Variable::new("query", VariableType::String))
            .with_pre_processor(
                composer_templates::PreProcessorCall::new("p1", "search", "hits")
                    .with_arg("q", "{{query}}"),
            );
        let mut instance = TemplateSelectionInstance::new(key(), def);
        instance.apply_tool_event("p1", ToolEvent::MarkReady).unwrap();

        let req = requirements_for(&instance, ToolFallback::BySaveAs);
        assert_eq!(req.pending_tools[0].unresolved_inputs, vec!["query"]);
        assert_eq!(req.blocking_tool_count(), 1);

        instance.set_variable("query", Some(json!("rust")));
        let req = requirements_for(&instance, ToolFallback::BySaveAs);
        assert_eq!(req.pending_tools.len(), 1);
        assert_eq!(req.blocking_tool_count(), 0);
        assert!(req.is_ready());
    }

    #[test]
    fn done_tools_are_not_pending() {
        let def = TemplateDefinition::new("Search")
            .with_pre_processor(composer_templates::PreProcessorCall::new("p1", "search", "hits"));
        let mut instance = TemplateSelectionInstance::new(key(), def);
        instance.apply_tool_event("p1", ToolEvent::MarkReady).unwrap();
        instance
            .apply_tool_event(
                "p1",
                ToolEvent::Complete {
                    args: Map::new(),
                    result: json!([]),
                },
            )
            .unwrap();

        assert!(requirements_for(&instance, ToolFallback::BySaveAs).pending_tools.is_empty());
    }

    #[test]
    fn without_pre_processors_nothing_is_pending() {
        let schema = vec![Variable::new("x", VariableType::String).required()];
        let req =
            compute_requirements(&schema, &BTreeMap::new(), None, None, ToolFallback::BySaveAs);
        assert_eq!(req.required_variables, vec!["x"]);
        assert!(req.pending_tools.is_empty());
    }
}
