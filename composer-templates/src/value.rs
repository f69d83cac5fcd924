//! Typed rendering and coercion of variable values.
//!
//! Values are stored as [`serde_json::Value`] so tool results can flow into
//! variables unchanged; the declared [`VariableType`] decides how a value is
//! parsed from user input and how it is printed into the final message.

use chrono::NaiveDate;
use serde_json::{Number, Value};

use crate::definition::{Variable, VariableType};
use crate::error::{TemplateError, TemplateResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Returns `true` for values that must fall through the precedence chain.
#[must_use]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => false,
    }
}

/// Renders a value as message text according to the declared type.
#[must_use]
pub fn render_value(var_type: VariableType, value: &Value) -> String {
    match var_type {
        VariableType::String | VariableType::Enum => plain(value),
        VariableType::Number => match value {
            Value::Number(n) => n.to_string(),
            other => plain(other),
        },
        VariableType::Boolean => match value {
            Value::Bool(b) => b.to_string(),
            other => plain(other),
        },
        VariableType::Date => match value {
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map_or_else(|_| s.clone(), |date| date.format(DATE_FORMAT).to_string()),
            other => plain(other),
        },
    }
}

pub(crate) fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Variable {
    /// Parses raw user input into a typed value.
    ///
    /// Blank input yields `Ok(None)`, meaning the stored value should be
    /// cleared so resolution falls through to static/default/tool values.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::InvalidValue`] when the input does not parse
    /// as the declared type or is not one of the allowed enum values.
    pub fn coerce_input(&self, raw: &str) -> TemplateResult<Option<Value>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        let value = match self.var_type {
            VariableType::String => Value::String(raw.to_owned()),
            VariableType::Number => Value::Number(parse_number(raw).ok_or_else(|| {
                TemplateError::invalid_value(&self.name, format!("`{raw}` is not a number"))
            })?),
            VariableType::Boolean => Value::Bool(parse_bool(raw).ok_or_else(|| {
                TemplateError::invalid_value(&self.name, format!("`{raw}` is not a boolean"))
            })?),
            VariableType::Enum => {
                if !self.enum_values.iter().any(|allowed| allowed == raw) {
                    return Err(TemplateError::invalid_value(
                        &self.name,
                        format!(
                            "`{raw}` is not one of: {}",
                            self.enum_values.join(", ")
                        ),
                    ));
                }
                Value::String(raw.to_owned())
            }
            VariableType::Date => {
                let date = NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|err| {
                    TemplateError::invalid_value(&self.name, format!("`{raw}`: {err}"))
                })?;
                Value::String(date.format(DATE_FORMAT).to_string())
            }
        };

        Ok(Some(value))
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Number::from(int));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_values() {
        assert!(is_empty_value(&Value::Null));
        assert!(is_empty_value(&json!("")));
        assert!(!is_empty_value(&json!(" ")));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(false)));
    }

    #[test]
    fn renders_by_type() {
        assert_eq!(render_value(VariableType::String, &json!("cats")), "cats");
        assert_eq!(render_value(VariableType::Number, &json!(4.5)), "4.5");
        assert_eq!(render_value(VariableType::Boolean, &json!(true)), "true");
        assert_eq!(
            render_value(VariableType::Date, &json!("2024-01-01")),
            "2024-01-01"
        );
        assert_eq!(
            render_value(VariableType::String, &json!({"k": 1})),
            r#"{"k":1}"#
        );
    }

    #[test]
    fn coerces_numbers() {
        let var = Variable::new("n", VariableType::Number);
        assert_eq!(var.coerce_input(" 42 ").unwrap(), Some(json!(42)));
        assert_eq!(var.coerce_input("2.5").unwrap(), Some(json!(2.5)));
        assert!(var.coerce_input("many").is_err());
    }

    #[test]
    fn coerces_booleans() {
        let var = Variable::new("b", VariableType::Boolean);
        assert_eq!(var.coerce_input("Yes").unwrap(), Some(json!(true)));
        assert_eq!(var.coerce_input("0").unwrap(), Some(json!(false)));
        assert!(var.coerce_input("maybe").is_err());
    }

    #[test]
    fn enforces_enum_values() {
        let var = Variable::new("tone", VariableType::Enum).with_enum_values(["dry", "warm"]);
        assert_eq!(var.coerce_input("warm").unwrap(), Some(json!("warm")));
        let err = var.coerce_input("hot").expect_err("not allowed");
        assert!(matches!(err, TemplateError::InvalidValue { name, .. } if name == "tone"));
    }

    #[test]
    fn validates_dates() {
        let var = Variable::new("date", VariableType::Date);
        assert_eq!(
            var.coerce_input("2024-02-02").unwrap(),
            Some(json!("2024-02-02"))
        );
        assert!(var.coerce_input("02/02/2024").is_err());
    }

    #[test]
    fn blank_input_clears() {
        let var = Variable::new("s", VariableType::String);
        assert_eq!(var.coerce_input("   ").unwrap(), None);
    }
}
