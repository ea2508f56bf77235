//! Immediate-subscribe provider (fal.ai style).
//!
//! One blocking request per operation: the backend queues internally and the
//! call returns once the result exists. Assets are embedded as data URLs.

use super::http::{self, Operation};
use super::{AssetData, Credential, EditRequest, ImageProvider, ImageRequest};
use crate::error::{GenerationCause, ProviderError, ProviderResult};
use crate::types::{Capability, ParamMap};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};

const CAPABILITIES: [Capability; 3] = [
    Capability::GenerateImage,
    Capability::EditImage,
    Capability::UploadAsset,
];

/// Provider that calls `{endpoint}/{model_id}` and waits for the result.
pub struct SubscribeProvider {
    id: String,
    name: String,
    endpoint: String,
    credential: Credential,
    edit_models: Vec<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl SubscribeProvider {
    pub fn new(endpoint: &str, api_key: Option<&str>, timeout: Duration) -> Self {
        Self {
            id: "fal".to_string(),
            name: "fal.ai".to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential: Credential::new(api_key),
            edit_models: Vec::new(),
            client: http::client(timeout),
            timeout,
        }
    }

    /// Additional models that accept a source image.
    pub fn with_edit_models(mut self, models: Vec<String>) -> Self {
        self.edit_models = models;
        self
    }

    async fn run(&self, model_id: &str, body: ParamMap) -> ProviderResult<String> {
        let key = self.credential.require(&self.id)?;
        let url = format!("{}/{}", self.endpoint, model_id.trim_start_matches('/'));
        let start = Instant::now();

        tracing::debug!("Subscribing to {url}");
        let resp = http::send_json(
            &self.id,
            Operation::Generate,
            self.client
                .post(&url)
                .header("Authorization", format!("Key {key}"))
                .json(&Value::Object(body))
                .timeout(self.timeout),
        )
        .await?;

        let locator = first_image(&self.id, &resp)?;
        tracing::debug!(
            "{model_id} finished in {}ms",
            start.elapsed().as_millis()
        );
        Ok(locator)
    }
}

/// Pull the first image URL out of a subscribe response.
///
/// Accepts `images[0].url` and `image.url`. A response whose first image is
/// flagged by the backend's safety checker is a content-policy rejection.
fn first_image(provider: &str, resp: &Value) -> ProviderResult<String> {
    let flagged = resp
        .get("has_nsfw_concepts")
        .and_then(Value::as_array)
        .and_then(|flags| flags.first())
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if flagged {
        return Err(ProviderError::Generation {
            provider: provider.to_string(),
            cause: GenerationCause::ContentPolicy,
            message: "output flagged by the backend safety checker".to_string(),
            status_code: None,
        });
    }

    resp.get("images")
        .and_then(|images| images.get(0))
        .or_else(|| resp.get("image"))
        .and_then(|image| image.get("url"))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(String::from)
        .ok_or_else(|| ProviderError::parse(provider, "response contains no image URL"))
}

#[async_trait]
impl ImageProvider for SubscribeProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &CAPABILITIES
    }

    fn set_credential(&self, secret: Option<&str>) {
        self.credential.set(secret);
    }

    fn is_authenticated(&self) -> bool {
        self.credential.is_set()
    }

    async fn upload_asset(&self, asset: &AssetData) -> ProviderResult<String> {
        // The backend accepts data URLs wherever it accepts an image URL.
        Ok(asset.data_url())
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<String> {
        let mut body = request.params.clone();
        body.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        self.run(&request.model_id, body).await
    }

    async fn edit_image(&self, request: &EditRequest) -> ProviderResult<String> {
        if !super::supports_edit(&request.model_id, &self.edit_models) {
            return Err(ProviderError::unsupported(
                &self.id,
                Capability::EditImage,
                Some(&request.model_id),
            ));
        }
        let mut body = request.params.clone();
        body.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        body.insert(
            "image_urls".to_string(),
            Value::Array(vec![Value::String(request.source.clone())]),
        );
        self.run(&request.model_id, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(url: &str, key: Option<&str>) -> SubscribeProvider {
        SubscribeProvider::new(url, key, Duration::from_secs(5))
    }

    fn request(model: &str) -> ImageRequest {
        let mut params = ParamMap::new();
        params.insert("image_size".to_string(), json!("square_hd"));
        ImageRequest {
            prompt: "a lighthouse at dusk".to_string(),
            model_id: model.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_generate_image_returns_first_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/fal-ai/flux/dev")
            .match_header("authorization", "Key test-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "prompt": "a lighthouse at dusk",
                "image_size": "square_hd"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"images": [{"url": "https://fal.media/out/1.png"}], "seed": 3}"#)
            .create_async()
            .await;

        let provider = provider(&server.url(), Some("test-key"));
        let url = provider.generate_image(&request("fal-ai/flux/dev")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(url, "https://fal.media/out/1.png");
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let provider = provider(&server.url(), None);
        let err = provider
            .generate_image(&request("fal-ai/flux/dev"))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ProviderError::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn test_edit_requires_edit_model() {
        let provider = provider("http://127.0.0.1:9", Some("k"));
        let err = provider
            .edit_image(&EditRequest {
                source: "https://x.test/a.png".to_string(),
                prompt: "make it night".to_string(),
                model_id: "fal-ai/flux/dev".to_string(),
                params: ParamMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::CapabilityUnsupported { .. }));
    }

    #[tokio::test]
    async fn test_edit_sends_source_as_image_urls() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/fal-ai/nano-banana/edit")
            .match_body(mockito::Matcher::PartialJson(json!({
                "image_urls": ["https://x.test/a.png"],
                "prompt": "make it night"
            })))
            .with_status(200)
            .with_body(r#"{"images": [{"url": "https://fal.media/out/2.png"}]}"#)
            .create_async()
            .await;

        let provider = provider(&server.url(), Some("k"));
        let url = provider
            .edit_image(&EditRequest {
                source: "https://x.test/a.png".to_string(),
                prompt: "make it night".to_string(),
                model_id: "fal-ai/nano-banana/edit".to_string(),
                params: ParamMap::new(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(url, "https://fal.media/out/2.png");
    }

    #[tokio::test]
    async fn test_validation_failure_is_classified() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/fal-ai/flux/dev")
            .with_status(422)
            .with_body(r#"{"detail": [{"loc": ["body", "image_size"], "msg": "invalid"}]}"#)
            .create_async()
            .await;

        let provider = provider(&server.url(), Some("k"));
        let err = provider
            .generate_image(&request("fal-ai/flux/dev"))
            .await
            .unwrap_err();
        match err {
            ProviderError::Generation {
                cause, status_code, ..
            } => {
                assert_eq!(cause, GenerationCause::Validation);
                assert_eq!(status_code, Some(422));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_first_image_flagged_is_content_policy() {
        let resp = json!({"images": [{"url": "https://x.test/a.png"}], "has_nsfw_concepts": [true]});
        let err = first_image("fal", &resp).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Generation {
                cause: GenerationCause::ContentPolicy,
                ..
            }
        ));
    }

    #[test]
    fn test_first_image_missing_is_parse_error() {
        let err = first_image("fal", &json!({"images": []})).unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_upload_returns_data_url_without_network() {
        let provider = provider("http://127.0.0.1:9", None);
        let asset = AssetData::from_bytes(&[1, 2, 3], "png");
        let locator = provider.upload_asset(&asset).await.unwrap();
        assert_eq!(locator, "data:image/png;base64,AQID");
    }
}
