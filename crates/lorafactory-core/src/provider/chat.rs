//! Chat-completion provider with media embedded in responses (OpenRouter style).
//!
//! One `/chat/completions` endpoint serves prompts, captions and images.
//! Images come back inside the assistant message and are extracted with a
//! strict locator pattern; edits attach the source as an extra image part.

use super::extract;
use super::http::{self, Operation};
use super::{
    AssetData, CaptionRequest, Credential, EditRequest, ImageProvider, ImageRequest,
    PromptRequest,
};
use crate::error::{ProviderError, ProviderResult};
use crate::types::{Capability, ParamMap, PromptRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const CAPABILITIES: [Capability; 5] = Capability::ALL;

/// Provider speaking the Chat Completions API.
pub struct ChatProvider {
    id: String,
    name: String,
    credential: Credential,
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl ChatProvider {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Self {
        Self {
            id: "openrouter".to_string(),
            name: "OpenRouter".to_string(),
            credential: Credential::new(api_key),
            client: http::client(timeout),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            timeout,
        }
    }
}

// --- Request types ---

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ParamMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ChatContent>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize, Deserialize)]
struct ImageUrl {
    url: String,
}

impl ChatMessage {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            content: vec![ChatContent::Text {
                text: text.to_string(),
            }],
        }
    }

    fn with_image(role: &str, text: &str, image_url: &str) -> Self {
        Self {
            role: role.to_string(),
            content: vec![
                ChatContent::Text {
                    text: text.to_string(),
                },
                ChatContent::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.to_string(),
                    },
                },
            ],
        }
    }
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    images: Vec<ImagePart>,
}

#[derive(Deserialize)]
struct ImagePart {
    image_url: ImageUrl,
}

impl ChatProvider {
    async fn complete(&self, body: &ChatRequest) -> ProviderResult<ChoiceMessage> {
        let key = self.credential.require(&self.id)?;
        let start = Instant::now();

        let resp = http::send_json(
            &self.id,
            Operation::Generate,
            self.client
                .post(&self.endpoint)
                .bearer_auth(&key)
                .json(body)
                .timeout(self.timeout),
        )
        .await?;

        let chat: ChatResponse = serde_json::from_value(resp).map_err(|e| {
            ProviderError::parse(&self.id, format!("unexpected completion shape: {e}"))
        })?;
        tracing::debug!(
            "{} completion took {}ms",
            body.model,
            start.elapsed().as_millis()
        );

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| {
                ProviderError::parse(&self.id, "empty choices array, no content generated")
            })
    }

    fn image_request(&self, model_id: &str, message: ChatMessage, params: &ParamMap) -> ChatRequest {
        ChatRequest {
            model: model_id.to_string(),
            messages: vec![message],
            modalities: Some(vec!["image".to_string(), "text".to_string()]),
            image_config: (!params.is_empty()).then(|| params.clone()),
            max_tokens: None,
            temperature: None,
        }
    }

    /// Structured image parts first, then the free-text content.
    fn locator(&self, message: ChoiceMessage) -> ProviderResult<String> {
        if let Some(part) = message.images.into_iter().next() {
            if let Some(url) = extract::media_locator(&part.image_url.url) {
                return Ok(url);
            }
        }
        message
            .content
            .as_deref()
            .and_then(extract::media_locator)
            .ok_or_else(|| ProviderError::parse(&self.id, "no image locator in response"))
    }
}

#[async_trait]
impl ImageProvider for ChatProvider {
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
        Ok(asset.data_url())
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<String> {
        let body = self.image_request(
            &request.model_id,
            ChatMessage::text("user", &request.prompt),
            &request.params,
        );
        let message = self.complete(&body).await?;
        self.locator(message)
    }

    async fn edit_image(&self, request: &EditRequest) -> ProviderResult<String> {
        let body = self.image_request(
            &request.model_id,
            ChatMessage::with_image("user", &request.prompt, &request.source),
            &request.params,
        );
        let message = self.complete(&body).await?;
        self.locator(message)
    }

    async fn generate_prompts(&self, request: &PromptRequest) -> ProviderResult<Vec<PromptRecord>> {
        let body = ChatRequest {
            model: request.model_id.clone(),
            messages: vec![
                ChatMessage::text("system", &request.system_prompt),
                ChatMessage::text("user", &request.user_prompt),
            ],
            modalities: None,
            image_config: None,
            max_tokens: Some(4096),
            temperature: Some(0.9),
        };
        let message = self.complete(&body).await?;
        let text = message.content.unwrap_or_default();

        let items = extract::first_json_array(&text)
            .ok_or_else(|| ProviderError::parse(&self.id, "no JSON array in prompt response"))?;
        extract::prompt_records(items).map_err(|e| ProviderError::parse(&self.id, e))
    }

    async fn caption_image(&self, request: &CaptionRequest) -> ProviderResult<String> {
        let body = ChatRequest {
            model: request.model_id.clone(),
            messages: vec![ChatMessage::with_image(
                "user",
                request.instruction(),
                &request.locator,
            )],
            modalities: None,
            image_config: None,
            max_tokens: Some(300),
            temperature: Some(0.3),
        };
        let message = self.complete(&body).await?;
        let text = message.content.unwrap_or_default().trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::parse(&self.id, "empty caption"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(url: &str) -> ChatProvider {
        ChatProvider::new(&format!("{url}/api/v1"), Some("or-key"), Duration::from_secs(5))
    }

    fn completion(content: &str) -> String {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_generate_prompts_parses_embedded_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/chat/completions")
            .match_header("authorization", "Bearer or-key")
            .with_status(200)
            .with_body(completion(
                "Here are your prompts:\n```json\n[{\"prompt\": \"p1\", \"edit\": \"e1\"}, {\"prompt\": \"p2\"}]\n```",
            ))
            .create_async()
            .await;

        let records = provider(&server.url())
            .generate_prompts(&PromptRequest {
                system_prompt: "sys".to_string(),
                user_prompt: "user".to_string(),
                model_id: "openai/gpt-4o-mini".to_string(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].edit.as_deref(), Some("e1"));
        assert_eq!(records[1].prompt, "p2");
    }

    #[tokio::test]
    async fn test_generate_prompts_without_array_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/chat/completions")
            .with_status(200)
            .with_body(completion("I cannot help with that."))
            .create_async()
            .await;

        let err = provider(&server.url())
            .generate_prompts(&PromptRequest {
                system_prompt: "sys".to_string(),
                user_prompt: "user".to_string(),
                model_id: "m".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_generate_image_extracts_url_from_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "google/gemini-2.5-flash-image",
                "modalities": ["image", "text"]
            })))
            .with_status(200)
            .with_body(completion("Done! ![img](https://cdn.test/gen/7.png)"))
            .create_async()
            .await;

        let url = provider(&server.url())
            .generate_image(&ImageRequest {
                prompt: "a fox".to_string(),
                model_id: "google/gemini-2.5-flash-image".to_string(),
                params: ParamMap::new(),
            })
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.test/gen/7.png");
    }

    #[tokio::test]
    async fn test_generate_image_prefers_structured_images() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "choices": [{"message": {
                "content": "see https://cdn.test/other.png",
                "images": [{"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}]
            }}]
        });
        let _mock = server
            .mock("POST", "/api/v1/chat/completions")
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let url = provider(&server.url())
            .generate_image(&ImageRequest {
                prompt: "a fox".to_string(),
                model_id: "m".to_string(),
                params: ParamMap::new(),
            })
            .await
            .unwrap();
        assert_eq!(url, "data:image/png;base64,AAAA");
    }

    #[tokio::test]
    async fn test_generate_image_without_locator_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/chat/completions")
            .with_status(200)
            .with_body(completion("Here is a description of a fox instead."))
            .create_async()
            .await;

        let err = provider(&server.url())
            .generate_image(&ImageRequest {
                prompt: "a fox".to_string(),
                model_id: "m".to_string(),
                params: ParamMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_edit_attaches_source_image_part() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(json!({
                "messages": [{"role": "user", "content": [
                    {"type": "text", "text": "add snow"},
                    {"type": "image_url", "image_url": {"url": "https://cdn.test/src.png"}}
                ]}]
            })))
            .with_status(200)
            .with_body(completion("https://cdn.test/edited.jpg"))
            .create_async()
            .await;

        let url = provider(&server.url())
            .edit_image(&EditRequest {
                source: "https://cdn.test/src.png".to_string(),
                prompt: "add snow".to_string(),
                model_id: "m".to_string(),
                params: ParamMap::new(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(url, "https://cdn.test/edited.jpg");
    }

    #[tokio::test]
    async fn test_caption_trims_text() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/chat/completions")
            .with_status(200)
            .with_body(completion("  A woman smiling in soft studio light.\n"))
            .create_async()
            .await;

        let caption = provider(&server.url())
            .caption_image(&CaptionRequest {
                locator: "https://cdn.test/a.png".to_string(),
                model_id: "m".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(caption, "A woman smiling in soft studio light.");
    }

    #[tokio::test]
    async fn test_unauthenticated_without_key() {
        let provider = ChatProvider::new("http://127.0.0.1:9", None, Duration::from_secs(1));
        let err = provider
            .caption_image(&CaptionRequest {
                locator: "https://cdn.test/a.png".to_string(),
                model_id: "m".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unauthenticated { .. }));
    }
}
