//! Create-task/poll provider (Kie.ai style).
//!
//! Generation creates a remote task and then polls its record on a
//! [`PollPolicy`]. Results arrive as a JSON string inside the task record.

use super::http::{self, Operation};
use super::poll::{poll_task, PollPolicy, RemoteTask, TaskPoll};
use super::{AssetData, Credential, EditRequest, ImageProvider, ImageRequest};
use crate::error::{ProviderError, ProviderResult};
use crate::types::{Capability, ParamMap};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const CAPABILITIES: [Capability; 3] = [
    Capability::GenerateImage,
    Capability::EditImage,
    Capability::UploadAsset,
];

const PENDING_STATES: [&str; 3] = ["waiting", "queuing", "generating"];

/// Provider that creates remote tasks and polls them to completion.
pub struct TaskProvider {
    id: String,
    name: String,
    endpoint: String,
    credential: Credential,
    edit_models: Vec<String>,
    policy: PollPolicy,
    client: reqwest::Client,
    timeout: Duration,
}

impl TaskProvider {
    pub fn new(endpoint: &str, api_key: Option<&str>, policy: PollPolicy, timeout: Duration) -> Self {
        Self {
            id: "kie".to_string(),
            name: "Kie.ai".to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential: Credential::new(api_key),
            edit_models: Vec::new(),
            policy,
            client: http::client(timeout),
            timeout,
        }
    }

    pub fn with_edit_models(mut self, models: Vec<String>) -> Self {
        self.edit_models = models;
        self
    }

    /// Create a task and poll it until it yields an image URL.
    async fn run(&self, model_id: &str, input: ParamMap) -> ProviderResult<String> {
        let key = self.credential.require(&self.id)?;
        let mut task = self.create_task(&key, model_id, input).await?;
        tracing::debug!("Created task {} for {model_id}", task.task_id);

        poll_task(&self.id, &mut task, &self.policy, |task_id| {
            let key = key.clone();
            async move { self.check_task(&key, &task_id).await }
        })
        .await
    }

    async fn create_task(
        &self,
        key: &str,
        model_id: &str,
        input: ParamMap,
    ) -> ProviderResult<RemoteTask> {
        let url = format!("{}/api/v1/jobs/createTask", self.endpoint);
        let resp = http::send_json(
            &self.id,
            Operation::Generate,
            self.client
                .post(&url)
                .bearer_auth(key)
                .json(&json!({ "model": model_id, "input": input }))
                .timeout(self.timeout),
        )
        .await?;
        let data = envelope_data(&self.id, Operation::Generate, &resp)?;

        data.get("taskId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(RemoteTask::new)
            .ok_or_else(|| ProviderError::parse(&self.id, "createTask returned no taskId"))
    }

    async fn check_task(&self, key: &str, task_id: &str) -> ProviderResult<TaskPoll<String>> {
        let url = format!("{}/api/v1/jobs/recordInfo", self.endpoint);
        let resp = http::send_json(
            &self.id,
            Operation::Generate,
            self.client
                .get(&url)
                .bearer_auth(key)
                .query(&[("taskId", task_id)])
                .timeout(self.timeout),
        )
        .await?;
        let data = envelope_data(&self.id, Operation::Generate, &resp)?;
        interpret_record(&self.id, data)
    }
}

/// Unwrap the `{code, msg, data}` envelope; a non-200 `code` is a failure
/// even when the HTTP status was 200.
fn envelope_data<'a>(provider: &str, op: Operation, resp: &'a Value) -> ProviderResult<&'a Value> {
    let code = resp.get("code").and_then(Value::as_u64).unwrap_or(200);
    if code != 200 {
        let msg = resp
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let status = u16::try_from(code).ok();
        let cause = http::classify(status.unwrap_or(0), &msg);
        return Err(op.failure(provider, cause, format!("code {code}: {msg}"), status));
    }
    resp.get("data")
        .filter(|d| !d.is_null())
        .ok_or_else(|| ProviderError::parse(provider, "response has no data field"))
}

/// Map a task record onto a poll observation.
///
/// Unknown states are treated as pending; only `success` and `fail` end
/// the poll.
fn interpret_record(provider: &str, data: &Value) -> ProviderResult<TaskPoll<String>> {
    let state = data.get("state").and_then(Value::as_str).unwrap_or("");
    match state {
        "success" => {
            let result_json = data.get("resultJson").and_then(Value::as_str).unwrap_or("");
            let result: Value = serde_json::from_str(result_json).map_err(|e| {
                ProviderError::parse(provider, format!("resultJson is not JSON: {e}"))
            })?;
            result
                .get("resultUrls")
                .and_then(|urls| urls.get(0))
                .and_then(Value::as_str)
                .map(|url| TaskPoll::Success(url.to_string()))
                .ok_or_else(|| ProviderError::parse(provider, "task succeeded without resultUrls"))
        }
        "fail" => {
            let message = data
                .get("failMsg")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("task failed without a message");
            Ok(TaskPoll::Failed(message.to_string()))
        }
        other => {
            if !PENDING_STATES.contains(&other) {
                tracing::debug!("Treating unknown task state '{other}' as pending");
            }
            Ok(TaskPoll::Pending)
        }
    }
}

#[async_trait]
impl ImageProvider for TaskProvider {
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
        let key = self.credential.require(&self.id)?;
        let url = format!("{}/api/file-base64-upload", self.endpoint);
        let resp = http::send_json(
            &self.id,
            Operation::Upload,
            self.client
                .post(&url)
                .bearer_auth(&key)
                .json(&json!({
                    "base64Data": asset.data_url(),
                    "uploadPath": "lorafactory",
                }))
                .timeout(self.timeout),
        )
        .await?;
        let data = envelope_data(&self.id, Operation::Upload, &resp)?;

        data.get("downloadUrl")
            .or_else(|| data.get("fileUrl"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ProviderError::Upload {
                provider: self.id.clone(),
                message: "upload response has no download URL".to_string(),
                status_code: None,
            })
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<String> {
        let mut input = request.params.clone();
        input.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        self.run(&request.model_id, input).await
    }

    async fn edit_image(&self, request: &EditRequest) -> ProviderResult<String> {
        if !super::supports_edit(&request.model_id, &self.edit_models) {
            return Err(ProviderError::unsupported(
                &self.id,
                Capability::EditImage,
                Some(&request.model_id),
            ));
        }
        let mut input = request.params.clone();
        input.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        input.insert(
            "image_urls".to_string(),
            Value::Array(vec![Value::String(request.source.clone())]),
        );
        self.run(&request.model_id, input).await
    }
}

impl std::fmt::Debug for TaskProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProvider")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("policy", &self.policy)
            .finish()
    }
}
