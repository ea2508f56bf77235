//! Schema validation of parameter maps.

use crate::schema::{ModelSchema, ParamKind, ParameterDescriptor, UnionShape};
use crate::types::ParamMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

/// Outcome of validating a parameter map against a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            message: message.into(),
        });
    }
}

/// Check `values` against every descriptor of `schema`.
///
/// Collects every violation instead of stopping at the first. Keys the
/// schema does not describe are accepted.
pub fn validate_parameters(schema: &ModelSchema, values: &ParamMap) -> ValidationReport {
    let mut report = ValidationReport::default();

    for descriptor in &schema.parameters {
        let name = descriptor.name.as_str();
        let required = descriptor.required || schema.required.contains(name);
        match values.get(name) {
            None | Some(Value::Null) => {
                if required {
                    report.push(name, "required parameter is missing");
                }
            }
            Some(value) => check_value(descriptor, value, &mut report),
        }
    }

    report.valid = report.errors.is_empty();
    report
}

fn check_value(descriptor: &ParameterDescriptor, value: &Value, report: &mut ValidationReport) {
    let name = descriptor.name.as_str();
    let constraints = &descriptor.constraints;

    match descriptor.kind {
        ParamKind::String => {
            let Some(text) = value.as_str() else {
                report.push(name, format!("expected a string, got {}", type_name(value)));
                return;
            };
            // An empty string is the neutral value of a field with no default.
            let neutral = text.is_empty() && descriptor.default.is_none();
            if let Some(pattern) = constraints.pattern.as_ref().filter(|_| !neutral) {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(text) => {
                        report.push(name, format!("'{text}' does not match pattern {pattern}"))
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Skipping invalid pattern for {name}: {e}"),
                }
            }
            check_membership(name, value, &constraints.values, report);
        }
        ParamKind::Integer => {
            if !(value.is_i64() || value.is_u64()) {
                report.push(name, format!("expected an integer, got {}", type_name(value)));
                return;
            }
            check_bounds(descriptor, value, report);
        }
        ParamKind::Number => {
            if !value.is_number() {
                report.push(name, format!("expected a number, got {}", type_name(value)));
                return;
            }
            check_bounds(descriptor, value, report);
        }
        ParamKind::Boolean => {
            if !value.is_boolean() {
                report.push(name, format!("expected a boolean, got {}", type_name(value)));
            }
        }
        ParamKind::Enum => check_membership(name, value, &constraints.values, report),
        ParamKind::Union => {
            if !descriptor.shapes.is_empty()
                && !descriptor.shapes.iter().any(|shape| matches_shape(shape, value))
            {
                report.push(name, format!("{value} does not match any accepted shape"));
            }
        }
        ParamKind::Hidden => {}
    }
}

fn check_bounds(descriptor: &ParameterDescriptor, value: &Value, report: &mut ValidationReport) {
    let Some(number) = value.as_f64() else {
        return;
    };
    let name = descriptor.name.as_str();
    if let Some(min) = descriptor.constraints.minimum {
        if number < min {
            report.push(name, format!("{number} is below the minimum {min}"));
        }
    }
    if let Some(max) = descriptor.constraints.maximum {
        if number > max {
            report.push(name, format!("{number} is above the maximum {max}"));
        }
    }
}

fn check_membership(name: &str, value: &Value, allowed: &[Value], report: &mut ValidationReport) {
    if !allowed.is_empty() && !allowed.contains(value) {
        let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
        report.push(
            name,
            format!("{value} is not one of [{}]", options.join(", ")),
        );
    }
}

fn matches_shape(shape: &UnionShape, value: &Value) -> bool {
    match (shape, value) {
        (UnionShape::Preset { values }, Value::String(s)) => {
            values.is_empty() || values.iter().any(|v| v == s)
        }
        (UnionShape::Custom { fields }, Value::Object(map)) => {
            fields.iter().all(|(field, kind)| {
                map.get(field).is_some_and(|v| match kind {
                    ParamKind::Integer => v.is_i64() || v.is_u64(),
                    ParamKind::Number => v.is_number(),
                    ParamKind::Boolean => v.is_boolean(),
                    ParamKind::String | ParamKind::Enum => v.is_string(),
                    ParamKind::Union | ParamKind::Hidden => true,
                })
            })
        }
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
