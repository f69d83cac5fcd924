//! Extraction of sub-values from raw tool results.
//!
//! Three path syntaxes are accepted:
//!
//! - JSON pointer: `/data/items/0/title`
//! - rooted dotted path: `$.data.items[0].title`
//! - bare dotted path: `data.items.0.title`
//!
//! `$` or an empty expression selects the whole result.

use serde_json::Value;

use crate::registry::{ToolError, ToolResult};

/// Applies `expr` to `value`, returning a copy of the selected sub-value.
///
/// # Errors
///
/// Returns [`ToolError::Extraction`] when the expression is malformed or
/// selects nothing.
pub fn extract_path(value: &Value, expr: &str) -> ToolResult<Value> {
    let expr_trimmed = expr.trim();
    if expr_trimmed.is_empty() || expr_trimmed == "$" {
        return Ok(value.clone());
    }

    let pointer = if expr_trimmed.starts_with('/') {
        expr_trimmed.to_owned()
    } else {
        dotted_to_pointer(expr_trimmed).map_err(|reason| extraction(expr, reason))?
    };

    value
        .pointer(&pointer)
        .cloned()
        .ok_or_else(|| extraction(expr, "path not found"))
}

/// Turns a tool result that carries an `error` field into an error.
///
/// Tools report failures either by failing the call or by answering with a
/// payload such as `{"error": "quota exceeded"}`; both take the same path.
///
/// # Errors
///
/// Returns [`ToolError::Execution`] for objects with a non-null `error`.
pub fn reject_error_payload(value: Value) -> ToolResult<Value> {
    match value.get("error") {
        None | Some(Value::Null) => Ok(value),
        Some(Value::String(message)) => Err(ToolError::execution(message.clone())),
        Some(other) => Err(ToolError::execution(other.to_string())),
    }
}

fn dotted_to_pointer(expr: &str) -> Result<String, String> {
    let body = expr
        .strip_prefix("$.")
        .or_else(|| expr.strip_prefix('$'))
        .unwrap_or(expr);

    let mut pointer = String::new();
    for segment in body.split('.') {
        if segment.is_empty() {
            return Err("empty path segment".into());
        }

        let (key, indices) = match segment.find('[') {
            Some(open) => segment.split_at(open),
            None => (segment, ""),
        };

        if !key.is_empty() {
            push_token(&mut pointer, key);
        }

        let mut rest = indices;
        while !rest.is_empty() {
            let Some(inner) = rest.strip_prefix('[') else {
                return Err(format!("unexpected `{rest}`"));
            };
            let Some(close) = inner.find(']') else {
                return Err("unclosed `[`".into());
            };
            let index = &inner[..close];
            if index.parse::<usize>().is_err() {
                return Err(format!("`{index}` is not an array index"));
            }
            push_token(&mut pointer, index);
            rest = &inner[close + 1..];
        }
    }

    Ok(pointer)
}

fn push_token(pointer: &mut String, token: &str) {
    pointer.push('/');
    pointer.push_str(&token.replace('~', "~0").replace('/', "~1"));
}

fn extraction(expr: &str, reason: impl Into<String>) -> ToolError {
    ToolError::Extraction {
        expr: expr.to_owned(),
        reason: reason.into(),
    }
}
