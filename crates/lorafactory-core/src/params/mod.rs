//! Translation of generic parameter values into provider wire shapes.
//!
//! Callers describe a job with one generic vocabulary (`image_size`,
//! `aspect_ratio`, `resolution`, `steps`, `guidance`, `num_images`, ...).
//! Per-model rules rename and reshape those values for each provider. The
//! translator never performs I/O and never reads a live schema.

mod cost;
mod rules;
mod shape;
mod validate;

pub use cost::cost_multiplier;
pub use rules::MappingRule;
pub use shape::ShapeValue;
pub use validate::{validate_parameters, ValidationIssue, ValidationReport};

use crate::types::ParamMap;
use std::collections::HashMap;

/// Maps generic parameter values to a provider's request shape.
#[derive(Clone)]
pub struct ParameterTranslator {
    rules: HashMap<String, MappingRule>,
}

impl Default for ParameterTranslator {
    fn default() -> Self {
        let mut translator = Self::empty();
        for (model_id, rule) in rules::builtin() {
            translator.rules.insert(model_id.to_string(), rule);
        }
        translator
    }
}

impl ParameterTranslator {
    /// Translator with the built-in model rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Translator with no rules; every model passes through.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Register or replace the rule for `model_id`.
    pub fn with_rule(mut self, model_id: &str, rule: MappingRule) -> Self {
        self.rules.insert(model_id.to_string(), rule);
        self
    }

    pub fn has_rule(&self, model_id: &str) -> bool {
        self.rules.contains_key(model_id)
    }

    /// Produce the provider-specific parameter map.
    ///
    /// Generic values win over static overrides. Models without a rule get
    /// that merge unchanged.
    pub fn map_parameters(
        &self,
        model_id: &str,
        provider_id: &str,
        generic: &ParamMap,
        overrides: &ParamMap,
    ) -> ParamMap {
        let mut merged = overrides.clone();
        for (key, value) in generic {
            merged.insert(key.clone(), value.clone());
        }

        match self.rules.get(model_id) {
            Some(rule) => rule(provider_id, &merged),
            None => merged,
        }
    }
}

impl std::fmt::Debug for ParameterTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut models: Vec<_> = self.rules.keys().collect();
        models.sort();
        f.debug_struct("ParameterTranslator")
            .field("rules", &models)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{fallback_schema, SchemaStore};
    use serde_json::json;

    fn params(value: serde_json::Value) -> ParamMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_unknown_model_passes_through_with_generic_winning() {
        let translator = ParameterTranslator::new();
        let mapped = translator.map_parameters(
            "acme/unknown",
            "fal",
            &params(json!({"width": 512, "style": "ink"})),
            &params(json!({"width": 256, "quality": "high"})),
        );
        assert_eq!(
            mapped,
            params(json!({"width": 512, "style": "ink", "quality": "high"}))
        );
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let translator = ParameterTranslator::new();
        let generic = params(json!({
            "image_size": {"width": 1280, "height": 720},
            "steps": 30,
            "num_images": 2,
            "seed": 7
        }));
        for model in [
            "fal-ai/flux/dev",
            "fal-ai/bytedance/seedream/v4/text-to-image",
            "bytedance/seedream-v4-text-to-image",
            "fal-ai/nano-banana/edit",
            "acme/unknown",
        ] {
            for provider in ["fal", "kie", "openrouter"] {
                let a = translator.map_parameters(model, provider, &generic, &ParamMap::new());
                let b = translator.map_parameters(model, provider, &generic, &ParamMap::new());
                assert_eq!(a, b, "{model} on {provider}");
            }
        }
    }

    #[test]
    fn test_same_model_branches_on_provider() {
        let translator = ParameterTranslator::new();
        let generic = params(json!({"image_size": "landscape_16_9", "num_images": 2}));
        let model = "fal-ai/bytedance/seedream/v4/text-to-image";

        let fal = translator.map_parameters(model, "fal", &generic, &ParamMap::new());
        assert_eq!(fal.get("image_size"), Some(&json!("landscape_16_9")));
        assert!(!fal.contains_key("aspect_ratio"));

        let kie = translator.map_parameters(model, "kie", &generic, &ParamMap::new());
        assert_eq!(kie.get("aspect_ratio"), Some(&json!("16:9")));
        assert_eq!(kie.get("resolution"), Some(&json!("1K")));
        assert_eq!(kie.get("max_images"), Some(&json!(2)));
        assert!(!kie.contains_key("image_size"));
    }

    #[test]
    fn test_defaults_round_trip_validates() {
        let translator = ParameterTranslator::new();
        for (model, provider) in [
            ("fal-ai/flux/dev", "fal"),
            ("fal-ai/nano-banana/edit", "fal"),
            ("fal-ai/bytedance/seedream/v4/text-to-image", "fal"),
            ("bytedance/seedream-v4-text-to-image", "kie"),
        ] {
            let schema = fallback_schema(model).unwrap();
            let mapped =
                translator.map_parameters(model, provider, &schema.defaults(), &ParamMap::new());
            let report = validate_parameters(&schema, &mapped);
            assert!(report.valid, "{model}: {:?}", report.errors);
        }
    }

    #[test]
    fn test_discovered_schema_defaults_round_trip() {
        let doc = json!({
            "type": "object",
            "required": ["prompt", "style_id"],
            "properties": {
                "prompt": {"type": "string"},
                "style_id": {"type": "string", "pattern": "^[a-z]+-[0-9]+$"},
                "steps": {"type": ["integer", "null"], "minimum": 4, "maximum": 50},
                "format": {"enum": ["png", "jpeg"], "type": "string"}
            }
        });
        let schema = crate::schema::parse_document("acme/styled", &doc).unwrap();
        let translator = ParameterTranslator::new();
        let mapped =
            translator.map_parameters("acme/styled", "fal", &schema.defaults(), &ParamMap::new());
        let report = validate_parameters(&schema, &mapped);
        assert!(report.valid, "{:?}", report.errors);

        // A supplied value still has to match the pattern.
        let bad = params(json!({"prompt": "p", "style_id": "Neon"}));
        let report = validate_parameters(&schema, &bad);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].field, "style_id");
    }

    #[tokio::test]
    async fn test_minimal_schema_defaults_round_trip() {
        let translator = ParameterTranslator::new();
        let schema = SchemaStore::new().fetch_schema("acme/unknown").await;
        let mapped =
            translator.map_parameters("acme/unknown", "kie", &schema.defaults(), &ParamMap::new());
        assert!(validate_parameters(&schema, &mapped).valid);
    }

    #[test]
    fn test_custom_rule_replaces_builtin() {
        fn upper(_provider: &str, values: &ParamMap) -> ParamMap {
            values
                .iter()
                .map(|(k, v)| (k.to_uppercase(), v.clone()))
                .collect()
        }
        let translator = ParameterTranslator::empty().with_rule("m", upper);
        assert!(translator.has_rule("m"));
        let mapped = translator.map_parameters("m", "fal", &params(json!({"a": 1})), &ParamMap::new());
        assert_eq!(mapped, params(json!({"A": 1})));
    }
}
