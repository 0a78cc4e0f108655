//! Yupp.ai client: chat turn submission and reward claims.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{response_lines, ChatCall, LineStream, UpstreamClient, UpstreamError};
use crate::config::UpstreamConfig;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36 Edg/137.0.0.0";
const SESSION_COOKIE: &str = "__Secure-yupp.session-token";
/// Server action id of the chat submit endpoint.
const CHAT_NEXT_ACTION: &str = "7fbcb7bc0fcb4b0833ac4d1a1981315749f0dc7c09";
const COMPONENT_STREAM: &str = "text/x-component";
const UNDEFINED: &str = "$undefined";

/// Total timeout for non-streaming turns. Streaming turns have none, since
/// reqwest would apply it to the whole body.
const NON_STREAM_TIMEOUT: Duration = Duration::from_secs(300);

pub struct YuppClient {
    client: Client,
    base_url: String,
}

impl YuppClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .no_proxy()
            .build()
            .map_err(UpstreamError::transport)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn session_cookie(token: &str) -> String {
        format!("{}={}", SESSION_COOKIE, token)
    }

    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Request body for a chat turn. Positional, mirroring the web client's
/// server-action arguments.
pub fn chat_payload(conversation_id: &Uuid, transcript: &str, model_name: &str) -> Value {
    json!([
        conversation_id.to_string(),
        Uuid::new_v4().to_string(),
        transcript,
        UNDEFINED,
        UNDEFINED,
        [],
        UNDEFINED,
        [{ "modelName": model_name, "promptModifierId": UNDEFINED }],
        "text",
        false,
        UNDEFINED,
    ])
}

/// New credit balance from a reward-claim response.
pub fn extract_balance(body: &Value) -> Option<f64> {
    body.get(0)?
        .pointer("/result/data/json/currentCreditBalance")?
        .as_f64()
}

#[async_trait]
impl UpstreamClient for YuppClient {
    async fn open_chat(&self, token: &str, call: &ChatCall) -> Result<LineStream, UpstreamError> {
        let conversation_id = Uuid::new_v4();
        let url = format!("{}/chat/{}?stream=true", self.base_url, conversation_id);
        let payload = chat_payload(&conversation_id, &call.transcript, &call.model_name);

        let mut request = self
            .client
            .post(&url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, COMPONENT_STREAM)
            .header(CONTENT_TYPE, "application/json")
            .header("next-action", CHAT_NEXT_ACTION)
            .header("sec-fetch-site", "same-origin")
            .header(COOKIE, Self::session_cookie(token))
            .json(&payload);
        if !call.stream {
            request = request.timeout(NON_STREAM_TIMEOUT);
        }

        tracing::debug!(
            conversation = %conversation_id,
            model = %call.model_name,
            "Opening upstream chat turn"
        );

        let response = request.send().await.map_err(UpstreamError::transport)?;
        let response = Self::error_for_status(response).await?;
        Ok(response_lines(response.bytes_stream()))
    }

    async fn claim_reward(&self, token: &str, reward_id: &str) -> Result<f64, UpstreamError> {
        let url = format!("{}/api/trpc/reward.claim?batch=1", self.base_url);
        let payload = json!({ "0": { "json": { "rewardId": reward_id } } });

        let response = self
            .client
            .post(&url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(CONTENT_TYPE, "application/json")
            .header("sec-fetch-site", "same-origin")
            .header(COOKIE, Self::session_cookie(token))
            .json(&payload)
            .send()
            .await
            .map_err(UpstreamError::transport)?;
        let response = Self::error_for_status(response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(format!("Failed to parse reward response: {}", e)))?;
        extract_balance(&body)
            .ok_or_else(|| UpstreamError::Parse("reward response has no credit balance".to_string()))
    }
}
