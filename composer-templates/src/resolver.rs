//! Effective value resolution for variables and preprocessor arguments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::definition::{PreProcessorCall, Variable, VariableSource};
use crate::placeholder::scan_placeholders;
use crate::tool_state::ToolState;
use crate::value::{is_empty_value, plain};

/// How a tool-sourced variable finds a result when it has no stored value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFallback {
    /// Only results of preprocessors whose `save_as` names the variable.
    #[default]
    BySaveAs,
    /// The first preprocessor result of any kind, in declaration order.
    FirstResult,
}

/// Preprocessor view used by tool-sourced variables.
#[derive(Clone, Copy, Debug)]
pub struct ToolContext<'a> {
    pre_processors: &'a [PreProcessorCall],
    states: &'a BTreeMap<String, ToolState>,
    fallback: ToolFallback,
}

impl<'a> ToolContext<'a> {
    /// Creates a context using [`ToolFallback::BySaveAs`].
    #[must_use]
    pub fn new(
        pre_processors: &'a [PreProcessorCall],
        states: &'a BTreeMap<String, ToolState>,
    ) -> Self {
        Self {
            pre_processors,
            states,
            fallback: ToolFallback::default(),
        }
    }

    /// Selects the fallback matching rule.
    #[must_use]
    pub fn with_fallback(mut self, fallback: ToolFallback) -> Self {
        self.fallback = fallback;
        self
    }

    fn result_for(&self, var: &Variable) -> Option<Value> {
        self.pre_processors
            .iter()
            .filter(|call| match self.fallback {
                ToolFallback::BySaveAs => call.save_as == var.name,
                ToolFallback::FirstResult => true,
            })
            .find_map(|call| self.states.get(&call.id)?.result.clone())
    }
}

/// Computes a variable's effective value. First match wins:
///
/// 1. the user-entered value,
/// 2. the static value of a static variable,
/// 3. a non-empty default,
/// 4. a preprocessor result for tool-sourced variables.
///
/// Never cached; call it on every read.
#[must_use]
pub fn effective_value(
    var: &Variable,
    user_values: &BTreeMap<String, Value>,
    tools: Option<ToolContext<'_>>,
) -> Option<Value> {
    if let Some(value) = user_values.get(&var.name).filter(|v| !v.is_null()) {
        return Some(value.clone());
    }

    if var.source == VariableSource::Static {
        if let Some(value) = var.static_val.as_ref().filter(|v| !v.is_null()) {
            return Some(value.clone());
        }
    }

    if let Some(value) = var.default.as_ref().filter(|v| !is_empty_value(v)) {
        return Some(value.clone());
    }

    match (var.source, tools) {
        (VariableSource::Tool, Some(ctx)) => ctx.result_for(var),
        (VariableSource::User | VariableSource::Static | VariableSource::Tool, _) => None,
    }
}

/// Arguments a preprocessor would be invoked with right now.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectiveArgs {
    /// Static args shadowed by overrides, placeholders substituted.
    pub args: Map<String, Value>,
    /// Referenced variables without an effective value, in order of use.
    pub unresolved: Vec<String>,
}

impl EffectiveArgs {
    /// Returns `true` when every referenced variable resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Computes the effective arguments of a preprocessor.
///
/// Declared args are shadowed key by key by the state's overrides. String
/// values are then searched for `{{name}}` tokens: a string that is exactly
/// one token becomes the typed value, otherwise each token is interpolated.
/// Tokens whose variable has no value are left in place and reported.
pub fn effective_args<F>(
    call: &PreProcessorCall,
    state: Option<&ToolState>,
    mut lookup: F,
) -> EffectiveArgs
where
    F: FnMut(&str) -> Option<Value>,
{
    let mut merged = call.args.clone();
    if let Some(overrides) = state.and_then(|s| s.arg_overrides.as_ref()) {
        for (name, value) in overrides {
            merged.insert(name.clone(), value.clone());
        }
    }

    let mut unresolved = Vec::new();
    let args = merged
        .into_iter()
        .map(|(name, value)| (name, substitute_value(value, &mut lookup, &mut unresolved)))
        .collect();

    EffectiveArgs { args, unresolved }
}

fn substitute_value<F>(value: Value, lookup: &mut F, unresolved: &mut Vec<String>) -> Value
where
    F: FnMut(&str) -> Option<Value>,
{
    match value {
        Value::String(text) => substitute_string(text, lookup, unresolved),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| substitute_value(item, lookup, unresolved))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute_value(v, lookup, unresolved)))
                .collect(),
        ),
        other => other,
    }
}

fn substitute_string<F>(text: String, lookup: &mut F, unresolved: &mut Vec<String>) -> Value
where
    F: FnMut(&str) -> Option<Value>,
{
    let placeholders = scan_placeholders(&text);
    if placeholders.is_empty() {
        return Value::String(text);
    }

    let mut note_missing = |name: &str| {
        if !unresolved.iter().any(|n| n == name) {
            unresolved.push(name.to_owned());
        }
    };

    if let [only] = placeholders.as_slice() {
        if only.range == (0..text.len()) {
            return if let Some(value) = lookup(&only.name) {
                value
            } else {
                note_missing(&only.name);
                Value::String(text)
            };
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for placeholder in &placeholders {
        out.push_str(&text[last..placeholder.range.start]);
        if let Some(value) = lookup(&placeholder.name) {
            out.push_str(&plain(&value));
        } else {
            note_missing(&placeholder.name);
            out.push_str(&text[placeholder.range.clone()]);
        }
        last = placeholder.range.end;
    }
    out.push_str(&text[last..]);
    Value::String(out)
}
