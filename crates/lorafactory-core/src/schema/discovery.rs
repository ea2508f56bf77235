//! Live schema discovery from JSON-schema and OpenAPI documents.

use super::{
    Constraints, ModelSchema, ParamKind, ParameterDescriptor, SchemaOrigin, SchemaSource,
    UnionShape,
};
use crate::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

const MAX_REF_DEPTH: usize = 8;

/// Fetches `discovery_url` with `{model}` substituted and parses the result.
pub struct HttpSchemaSource {
    url_template: String,
    client: reqwest::Client,
}

impl HttpSchemaSource {
    pub fn new(url_template: &str, timeout: Duration) -> Self {
        Self {
            url_template: url_template.to_string(),
            client: crate::provider::http::client(timeout),
        }
    }
}

#[async_trait]
impl SchemaSource for HttpSchemaSource {
    async fn discover(&self, model_id: &str) -> ProviderResult<ModelSchema> {
        let url = self.url_template.replace("{model}", model_id);
        tracing::debug!("Discovering schema at {url}");

        let unavailable =
            |reason: String| ProviderError::SchemaUnavailable(format!("{model_id}: {reason}"));

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {status}")));
        }
        let doc: Value = resp.json().await.map_err(|e| unavailable(e.to_string()))?;

        parse_document(model_id, &doc)
            .ok_or_else(|| unavailable("no input schema in document".to_string()))
    }
}

/// Parse a discovery document into a schema.
///
/// Accepts an OpenAPI document (`paths.*.post.requestBody`), a document with
/// `components.schemas.*Input`, or a flat JSON-schema object.
pub fn parse_document(model_id: &str, doc: &Value) -> Option<ModelSchema> {
    let input = request_body_schema(doc)
        .or_else(|| components_input(doc))
        .or_else(|| doc.get("properties").is_some().then_some(doc))?;
    let input = resolve(doc, input, 0)?;
    let properties = input.get("properties")?.as_object()?;

    let required: Vec<&str> = input
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let parameters = property_order(input, properties)
        .into_iter()
        .filter_map(|name| {
            let property = properties.get(name)?;
            Some(descriptor(doc, name, property, required.contains(&name)))
        })
        .collect::<Vec<_>>();

    if parameters.is_empty() {
        return None;
    }
    Some(ModelSchema::new(model_id, SchemaOrigin::Live, parameters))
}

fn request_body_schema(doc: &Value) -> Option<&Value> {
    doc.get("paths")?
        .as_object()?
        .values()
        .filter_map(|item| item.get("post")?.get("requestBody"))
        .find_map(|body| body.get("content")?.get("application/json")?.get("schema"))
}

fn components_input(doc: &Value) -> Option<&Value> {
    doc.get("components")?
        .get("schemas")?
        .as_object()?
        .iter()
        .find(|(name, _)| name.ends_with("Input"))
        .map(|(_, schema)| schema)
}

/// Follow local `#/...` references.
fn resolve<'a>(doc: &'a Value, value: &'a Value, depth: usize) -> Option<&'a Value> {
    match value.get("$ref").and_then(Value::as_str) {
        Some(reference) if depth < MAX_REF_DEPTH => {
            let target = doc.pointer(reference.strip_prefix('#')?)?;
            resolve(doc, target, depth + 1)
        }
        Some(_) => None,
        None => Some(value),
    }
}

/// Declared order when the document carries one, else required names first.
fn property_order<'a>(input: &'a Value, properties: &'a Map<String, Value>) -> Vec<&'a str> {
    if let Some(order) = input.get("x-fal-order-properties").and_then(Value::as_array) {
        let mut names: Vec<&str> = order
            .iter()
            .filter_map(Value::as_str)
            .filter(|n| properties.contains_key(*n))
            .collect();
        for name in properties.keys() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        return names;
    }

    let required: Vec<&str> = input
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let mut names: Vec<&str> = properties.keys().map(String::as_str).collect();
    names.sort_by_key(|n| !required.contains(n));
    names
}

fn descriptor(doc: &Value, name: &str, property: &Value, required: bool) -> ParameterDescriptor {
    let property = resolve(doc, property, 0).unwrap_or(property);
    let mut descriptor = ParameterDescriptor::new(name, ParamKind::Hidden);
    descriptor.required = required;
    descriptor.default = property.get("default").cloned();
    descriptor.description = property
        .get("description")
        .and_then(Value::as_str)
        .map(String::from);

    let alternatives: Vec<&Value> = property
        .get("anyOf")
        .or_else(|| property.get("oneOf"))
        .and_then(Value::as_array)
        .map(|alts| {
            alts.iter()
                .filter_map(|alt| resolve(doc, alt, 0))
                .filter(|alt| schema_type(alt) != Some("null"))
                .collect()
        })
        .unwrap_or_default();

    match alternatives.as_slice() {
        [] => {
            descriptor.kind = primitive_kind(property);
            descriptor.constraints = constraints(property);
        }
        [single] => {
            descriptor.kind = primitive_kind(single);
            descriptor.constraints = constraints(single);
        }
        many => {
            descriptor.kind = ParamKind::Union;
            descriptor.shapes = many.iter().filter_map(|alt| union_shape(doc, alt)).collect();
        }
    }
    descriptor
}

fn primitive_kind(schema: &Value) -> ParamKind {
    if schema.get("enum").is_some() {
        return ParamKind::Enum;
    }
    match schema_type(schema) {
        Some("string") => ParamKind::String,
        Some("integer") => ParamKind::Integer,
        Some("number") => ParamKind::Number,
        Some("boolean") => ParamKind::Boolean,
        _ => ParamKind::Hidden,
    }
}

/// The declared `type`. A list such as `["integer", "null"]` yields its
/// first non-null entry.
fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(name) => Some(name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|name| *name != "null")
            .or_else(|| names.first().and_then(Value::as_str)),
        _ => None,
    }
}

fn constraints(schema: &Value) -> Constraints {
    Constraints {
        minimum: schema.get("minimum").and_then(Value::as_f64),
        maximum: schema.get("maximum").and_then(Value::as_f64),
        pattern: schema
            .get("pattern")
            .and_then(Value::as_str)
            .map(String::from),
        values: schema
            .get("enum")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

fn union_shape(doc: &Value, alt: &Value) -> Option<UnionShape> {
    if let Some(values) = alt.get("enum").and_then(Value::as_array) {
        return Some(UnionShape::Preset {
            values: values
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
        });
    }
    match schema_type(alt) {
        Some("string") => Some(UnionShape::Preset { values: Vec::new() }),
        Some("object") | None => {
            let properties = alt.get("properties")?.as_object()?;
            let fields: BTreeMap<String, ParamKind> = properties
                .iter()
                .map(|(name, schema)| {
                    let schema = resolve(doc, schema, 0).unwrap_or(schema);
                    (name.clone(), primitive_kind(schema))
                })
                .collect();
            Some(UnionShape::Custom { fields })
        }
        _ => None,
    }
}
