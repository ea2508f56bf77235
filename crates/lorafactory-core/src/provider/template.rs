//! Declarative provider driven entirely by configuration.
//!
//! Endpoints, auth, body templates and response paths come from a
//! [`TemplateProviderConfig`]. String values in templates may contain
//! `{{placeholders}}`; a string that is exactly one placeholder is replaced by
//! the raw JSON value so numbers and objects keep their type.

use super::extract;
use super::http::{self, Operation};
use super::{
    resolve_env_var, AssetData, CaptionRequest, Credential, EditRequest, ImageProvider,
    ImageRequest, PromptRequest,
};
use crate::config::{AuthScheme, EndpointTemplate, TemplateProviderConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::types::{Capability, ParamMap, PromptRecord};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("placeholder regex should be valid")
});

static EXACT_PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}$")
        .expect("exact placeholder regex should be valid")
});

/// Substitute placeholders inside a string; missing names render empty.
fn render_str(template: &str, vars: &ParamMap) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &regex::Captures<'_>| var_text(vars, &caps[1]))
        .into_owned()
}

fn var_text(vars: &ParamMap, name: &str) -> String {
    match vars.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Substitute placeholders into a URL path.
///
/// Values are percent-encoded one segment at a time, so a `/` inside a
/// model id still separates path segments but `?` or `#` cannot change the
/// request target.
fn render_path(template: &str, vars: &ParamMap) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &regex::Captures<'_>| {
            var_text(vars, &caps[1])
                .split('/')
                .map(|segment| urlencoding::encode(segment).into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .into_owned()
}

/// Render a JSON template. Object entries whose exact placeholder has no
/// value are dropped rather than sent as `null`.
fn render_value(template: &Value, vars: &ParamMap) -> Value {
    match template {
        Value::String(s) => match EXACT_PLACEHOLDER_REGEX.captures(s) {
            Some(caps) => vars.get(&caps[1]).cloned().unwrap_or(Value::Null),
            None => Value::String(render_str(s, vars)),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .filter_map(|(k, v)| {
                    let rendered = render_value(v, vars);
                    let dropped = rendered.is_null() && v.is_string();
                    (!dropped).then(|| (k.clone(), rendered))
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Provider whose every operation is described by configuration.
pub struct TemplateProvider {
    config: TemplateProviderConfig,
    name: String,
    capabilities: Vec<Capability>,
    credential: Credential,
    client: reqwest::Client,
    timeout: Duration,
}

impl TemplateProvider {
    pub fn new(config: TemplateProviderConfig, timeout: Duration) -> Self {
        let ops = &config.operations;
        let capabilities = [
            (Capability::GenerateImage, ops.generate_image.is_some()),
            (Capability::EditImage, ops.edit_image.is_some()),
            (Capability::GenerateTextPrompts, ops.generate_prompts.is_some()),
            (Capability::CaptionImage, ops.caption_image.is_some()),
            (Capability::UploadAsset, ops.upload_asset.is_some()),
        ]
        .into_iter()
        .filter_map(|(cap, present)| present.then_some(cap))
        .collect();

        let name = if config.name.is_empty() {
            config.id.clone()
        } else {
            config.name.clone()
        };
        let credential = Credential::new(resolve_env_var(&config.api_key).as_deref());

        Self {
            config,
            name,
            capabilities,
            credential,
            client: http::client(timeout),
            timeout,
        }
    }

    /// Render and send one templated request, returning the value found at
    /// the template's response path.
    async fn call(
        &self,
        capability: Capability,
        template: Option<&EndpointTemplate>,
        op: Operation,
        vars: ParamMap,
        params: &ParamMap,
        model: Option<&str>,
    ) -> ProviderResult<Value> {
        let id = self.config.id.as_str();
        let template =
            template.ok_or_else(|| ProviderError::unsupported(id, capability, model))?;

        let secret = match self.config.auth {
            AuthScheme::None => None,
            _ => Some(self.credential.require(id)?),
        };

        let method = reqwest::Method::from_bytes(template.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                ProviderError::transport(id, format!("invalid HTTP method '{}'", template.method))
            })?;
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            render_path(&template.path, &vars)
        );

        let mut request = self.client.request(method, &url).timeout(self.timeout);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), render_str(value, &vars));
        }
        if let Some(secret) = secret {
            request = match &self.config.auth {
                AuthScheme::Bearer => request.bearer_auth(secret),
                AuthScheme::Header { name, prefix } => {
                    request.header(name.as_str(), format!("{prefix}{secret}"))
                }
                AuthScheme::Query { name } => request.query(&[(name.as_str(), secret.as_str())]),
                AuthScheme::None => request,
            };
        }

        let mut body = template.body.as_ref().map(|b| render_value(b, &vars));
        if template.merge_params {
            let mut merged = match body.take() {
                Some(Value::Object(map)) => map,
                _ => ParamMap::new(),
            };
            for (k, v) in params {
                merged.entry(k.clone()).or_insert_with(|| v.clone());
            }
            body = Some(Value::Object(merged));
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        tracing::debug!("{id}: {} {url}", template.method);
        let resp = http::send_json(id, op, request).await?;

        extract::json_path(&resp, &template.response_path)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                ProviderError::parse(
                    id,
                    format!("nothing at response path '{}'", template.response_path),
                )
            })
    }

    fn as_locator(&self, value: Value) -> ProviderResult<String> {
        value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| ProviderError::parse(&self.config.id, "result is not a locator string"))
    }
}

fn vars_with(params: &ParamMap, pairs: &[(&str, &str)]) -> ParamMap {
    let mut vars = params.clone();
    for (k, v) in pairs {
        vars.insert((*k).to_string(), Value::String((*v).to_string()));
    }
    vars
}

#[async_trait]
impl ImageProvider for TemplateProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn set_credential(&self, secret: Option<&str>) {
        self.credential.set(secret);
    }

    fn is_authenticated(&self) -> bool {
        self.config.auth == AuthScheme::None || self.credential.is_set()
    }

    async fn upload_asset(&self, asset: &AssetData) -> ProviderResult<String> {
        let data_url = asset.data_url();
        let vars = vars_with(
            &ParamMap::new(),
            &[
                ("data", &asset.data),
                ("data_url", &data_url),
                ("media_type", &asset.media_type),
            ],
        );
        let value = self
            .call(
                Capability::UploadAsset,
                self.config.operations.upload_asset.as_ref(),
                Operation::Upload,
                vars,
                &ParamMap::new(),
                None,
            )
            .await?;
        value
            .as_str()
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| ProviderError::Upload {
                provider: self.config.id.clone(),
                message: "upload result is not a locator string".to_string(),
                status_code: None,
            })
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<String> {
        let vars = vars_with(
            &request.params,
            &[("prompt", &request.prompt), ("model", &request.model_id)],
        );
        let value = self
            .call(
                Capability::GenerateImage,
                self.config.operations.generate_image.as_ref(),
                Operation::Generate,
                vars,
                &request.params,
                Some(&request.model_id),
            )
            .await?;
        self.as_locator(value)
    }

    async fn edit_image(&self, request: &EditRequest) -> ProviderResult<String> {
        let vars = vars_with(
            &request.params,
            &[
                ("prompt", &request.prompt),
                ("model", &request.model_id),
                ("source", &request.source),
            ],
        );
        let value = self
            .call(
                Capability::EditImage,
                self.config.operations.edit_image.as_ref(),
                Operation::Generate,
                vars,
                &request.params,
                Some(&request.model_id),
            )
            .await?;
        self.as_locator(value)
    }

    async fn generate_prompts(&self, request: &PromptRequest) -> ProviderResult<Vec<PromptRecord>> {
        let vars = vars_with(
            &ParamMap::new(),
            &[
                ("system_prompt", &request.system_prompt),
                ("user_prompt", &request.user_prompt),
                ("model", &request.model_id),
            ],
        );
        let value = self
            .call(
                Capability::GenerateTextPrompts,
                self.config.operations.generate_prompts.as_ref(),
                Operation::Generate,
                vars,
                &ParamMap::new(),
                Some(&request.model_id),
            )
            .await?;

        let items = match value {
            Value::Array(items) => items,
            Value::String(text) => extract::first_json_array(&text).ok_or_else(|| {
                ProviderError::parse(&self.config.id, "no JSON array in prompt response")
            })?,
            other => {
                return Err(ProviderError::parse(
                    &self.config.id,
                    format!("prompt result is neither text nor array: {other}"),
                ))
            }
        };
        extract::prompt_records(items).map_err(|e| ProviderError::parse(&self.config.id, e))
    }

    async fn caption_image(&self, request: &CaptionRequest) -> ProviderResult<String> {
        let vars = vars_with(
            &ParamMap::new(),
            &[
                ("image", &request.locator),
                ("model", &request.model_id),
                ("instruction", request.instruction()),
            ],
        );
        let value = self
            .call(
                Capability::CaptionImage,
                self.config.operations.caption_image.as_ref(),
                Operation::Generate,
                vars,
                &ParamMap::new(),
                Some(&request.model_id),
            )
            .await?;
        self.as_locator(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateOperations;
    use serde_json::json;

    fn config(base_url: &str, auth: AuthScheme) -> TemplateProviderConfig {
        TemplateProviderConfig {
            id: "acme".to_string(),
            name: "Acme Images".to_string(),
            base_url: base_url.to_string(),
            api_key: "acme-secret".to_string(),
            auth,
            headers: Default::default(),
            operations: TemplateOperations {
                generate_image: Some(EndpointTemplate {
                    method: "POST".to_string(),
                    path: "/v1/models/{{model}}/generate".to_string(),
                    body: Some(json!({
                        "input": {"text": "{{prompt}}", "steps": "{{steps}}", "seed": "{{seed}}"},
                        "label": "job for {{model}}"
                    })),
                    merge_params: false,
                    response_path: "output.images.0".to_string(),
                }),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_render_value_keeps_types_and_drops_missing() {
        let mut vars = ParamMap::new();
        vars.insert("prompt".to_string(), json!("a cat"));
        vars.insert("steps".to_string(), json!(28));
        let rendered = render_value(
            &json!({"text": "{{prompt}}", "steps": "{{ steps }}", "seed": "{{seed}}", "note": "n={{steps}}"}),
            &vars,
        );
        assert_eq!(
            rendered,
            json!({"text": "a cat", "steps": 28, "note": "n=28"})
        );
    }

    #[test]
    fn test_render_path_encodes_values() {
        let mut vars = ParamMap::new();
        vars.insert("model".to_string(), json!("acme/xl?debug=1#frag"));
        vars.insert("version".to_string(), json!(2));
        assert_eq!(
            render_path("/v{{version}}/models/{{model}}/generate", &vars),
            "/v2/models/acme/xl%3Fdebug%3D1%23frag/generate"
        );
        assert_eq!(
            render_path("/models/{{model}}", &ParamMap::new()),
            "/models/"
        );
    }

    #[test]
    fn test_capabilities_follow_configured_operations() {
        let provider = TemplateProvider::new(
            config("http://127.0.0.1:9", AuthScheme::Bearer),
            Duration::from_secs(1),
        );
        assert_eq!(provider.capabilities(), &[Capability::GenerateImage]);
        assert_eq!(provider.name(), "Acme Images");
    }

    #[tokio::test]
    async fn test_generate_image_from_template() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/models/acme-xl/generate")
            .match_header("x-key", "Token acme-secret")
            .match_body(mockito::Matcher::Json(json!({
                "input": {"text": "a lighthouse", "steps": 30},
                "label": "job for acme-xl"
            })))
            .with_status(200)
            .with_body(r#"{"output": {"images": ["https://acme.test/1.png"]}}"#)
            .create_async()
            .await;

        let provider = TemplateProvider::new(
            config(
                &server.url(),
                AuthScheme::Header {
                    name: "X-Key".to_string(),
                    prefix: "Token ".to_string(),
                },
            ),
            Duration::from_secs(5),
        );
        let mut params = ParamMap::new();
        params.insert("steps".to_string(), json!(30));
        let url = provider
            .generate_image(&ImageRequest {
                prompt: "a lighthouse".to_string(),
                model_id: "acme-xl".to_string(),
                params,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(url, "https://acme.test/1.png");
    }

    #[tokio::test]
    async fn test_query_auth_and_merge_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/gen")
            .match_query(mockito::Matcher::UrlEncoded(
                "key".into(),
                "acme-secret".into(),
            ))
            .match_body(mockito::Matcher::Json(json!({
                "prompt": "a fox",
                "width": 512
            })))
            .with_status(200)
            .with_body(r#"{"url": "https://acme.test/fox.png"}"#)
            .create_async()
            .await;

        let mut cfg = config(
            &server.url(),
            AuthScheme::Query {
                name: "key".to_string(),
            },
        );
        cfg.operations.generate_image = Some(EndpointTemplate {
            method: "post".to_string(),
            path: "/gen".to_string(),
            body: Some(json!({"prompt": "{{prompt}}"})),
            merge_params: true,
            response_path: "url".to_string(),
        });
        let provider = TemplateProvider::new(cfg, Duration::from_secs(5));
        let mut params = ParamMap::new();
        params.insert("width".to_string(), json!(512));

        let url = provider
            .generate_image(&ImageRequest {
                prompt: "a fox".to_string(),
                model_id: "m".to_string(),
                params,
            })
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(url, "https://acme.test/fox.png");
    }

    #[tokio::test]
    async fn test_unconfigured_operation_is_unsupported() {
        let provider = TemplateProvider::new(
            config("http://127.0.0.1:9", AuthScheme::Bearer),
            Duration::from_secs(1),
        );
        let err = provider
            .caption_image(&CaptionRequest {
                locator: "https://x.test/a.png".to_string(),
                model_id: "m".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::CapabilityUnsupported {
                capability: Capability::CaptionImage,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_response_path_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/models/m/generate")
            .with_status(200)
            .with_body(r#"{"output": {"images": []}}"#)
            .create_async()
            .await;

        let provider =
            TemplateProvider::new(config(&server.url(), AuthScheme::Bearer), Duration::from_secs(5));
        let err = provider
            .generate_image(&ImageRequest {
                prompt: "x".to_string(),
                model_id: "m".to_string(),
                params: ParamMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_no_auth_scheme_is_always_authenticated() {
        let mut cfg = config("http://127.0.0.1:9", AuthScheme::None);
        cfg.api_key = String::new();
        let provider = TemplateProvider::new(cfg, Duration::from_secs(1));
        assert!(provider.is_authenticated());
    }
}
