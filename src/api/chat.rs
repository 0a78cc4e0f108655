//! OpenAI-compatible endpoints.
//!
//! `POST /v1/chat/completions` answers either as an SSE stream of
//! `chat.completion.chunk` frames closed by `data: [DONE]`, or as one
//! `chat.completion` object. `GET /v1/models` and `GET /models` list the
//! registry; `GET /debug` flips the chunk-tracing switch.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::decode::{AssembledMessage, Delta, DeltaStream};
use crate::error::GatewayError;
use crate::gateway::ChatReply;
use crate::models::clean_model_name;
use crate::openai::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    ChunkChoice, ChunkDelta, MessageContent, Usage,
};

use super::auth::authorize;
use super::routes::AppState;

const TEXT_EVENT_STREAM: &str = "text/event-stream";
const NO_CACHE: &str = "no-cache";
const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    r#type: &'static str,
    code: u16,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
        let body = ErrorResponse {
            error: ErrorBody {
                message: self.to_string(),
                r#type: self.error_type(),
                code: status.as_u16(),
            },
        };
        let mut response = (status, Json(body)).into_response();
        if matches!(self, GatewayError::MissingApiKey) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routes
// ─────────────────────────────────────────────────────────────────────────────

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/models", get(list_models_public))
        .route("/debug", get(debug_switch))
}

async fn list_models(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    authorize(&headers, &state.client_keys)?;
    Ok(list_models_public(State(state)).await)
}

async fn list_models_public(State(state): State<Arc<AppState>>) -> Response {
    let created = chrono::Utc::now().timestamp();
    Json(state.gateway.models().list(created)).into_response()
}

#[derive(Debug, Deserialize)]
struct DebugQuery {
    enable: Option<bool>,
}

async fn debug_switch(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DebugQuery>,
) -> Json<serde_json::Value> {
    if let Some(enable) = query.enable {
        state.gateway.set_debug_mode(enable);
    }
    Json(json!({ "debug_mode": state.gateway.debug_mode() }))
}

// ─────────────────────────────────────────────────────────────────────────────
// POST /v1/chat/completions
// ─────────────────────────────────────────────────────────────────────────────

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    authorize(&headers, &state.client_keys)?;

    let request: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

    let reply = match state.gateway.complete(&request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(model = %request.model, status = e.status_code(), error = %e, "Chat request failed");
            return Err(e);
        }
    };

    let completion = Completion {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        created: chrono::Utc::now().timestamp(),
        model: clean_model_name(&request.model),
    };

    Ok(match reply {
        ChatReply::Stream(deltas) => {
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_EVENT_STREAM));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
            headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
            (StatusCode::OK, headers, Body::from_stream(completion.sse(deltas))).into_response()
        }
        ChatReply::Complete(message) => Json(completion.response(message)).into_response(),
    })
}

/// Identity shared by every frame of one completion.
struct Completion {
    id: String,
    created: i64,
    model: String,
}

impl Completion {
    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
        }
    }

    fn frame(&self, delta: Delta) -> Bytes {
        let payload = match delta {
            Delta::Role => self.chunk(
                ChunkDelta {
                    role: Some("assistant".to_string()),
                    ..ChunkDelta::default()
                },
                None,
            ),
            Delta::Content(text) => self.chunk(
                ChunkDelta {
                    content: Some(text),
                    ..ChunkDelta::default()
                },
                None,
            ),
            Delta::Reasoning(text) => self.chunk(
                ChunkDelta {
                    reasoning_content: Some(text),
                    ..ChunkDelta::default()
                },
                None,
            ),
            Delta::Error(message) => {
                let error = json!({ "error": { "message": message, "type": "decode_error" } });
                return Bytes::from(format!("data: {}\n\n", error));
            }
            Delta::Finish => self.chunk(ChunkDelta::default(), Some("stop")),
        };
        match serde_json::to_string(&payload) {
            Ok(json) => Bytes::from(format!("data: {}\n\n", json)),
            Err(e) => {
                tracing::error!("Failed to serialize stream chunk: {}", e);
                Bytes::new()
            }
        }
    }

    /// SSE body. Keeps polling the decoder after `[DONE]` so its completion
    /// hook runs.
    fn sse(self, mut deltas: DeltaStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        async_stream::stream! {
            while let Some(delta) = deltas.next().await {
                let finished = delta == Delta::Finish;
                yield Ok(self.frame(delta));
                if finished {
                    yield Ok(Bytes::from_static(DONE_FRAME));
                }
            }
        }
    }

    fn response(self, message: AssembledMessage) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: self.id,
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model,
            choices: vec![Choice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: MessageContent::Text(message.content),
                    reasoning_content: message.reasoning,
                },
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion() -> Completion {
        Completion {
            id: "chatcmpl-test".to_string(),
            created: 1_700_000_000,
            model: "claude-sonnet".to_string(),
        }
    }

    fn frame_json(frame: &Bytes) -> serde_json::Value {
        let text = std::str::from_utf8(frame).unwrap();
        let payload = text
            .strip_prefix("data: ")
            .and_then(|t| t.strip_suffix("\n\n"))
            .unwrap();
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn role_and_content_frames() {
        let c = completion();
        let role = frame_json(&c.frame(Delta::Role));
        assert_eq!(role["object"], "chat.completion.chunk");
        assert_eq!(role["id"], "chatcmpl-test");
        assert_eq!(role["choices"][0]["delta"], json!({ "role": "assistant" }));
        assert!(role["choices"][0]["finish_reason"].is_null());

        let content = frame_json(&c.frame(Delta::Content("hi".to_string())));
        assert_eq!(content["choices"][0]["delta"], json!({ "content": "hi" }));

        let reasoning = frame_json(&c.frame(Delta::Reasoning("hmm".to_string())));
        assert_eq!(
            reasoning["choices"][0]["delta"],
            json!({ "reasoning_content": "hmm" })
        );
    }

    #[test]
    fn finish_and_error_frames() {
        let c = completion();
        let finish = frame_json(&c.frame(Delta::Finish));
        assert_eq!(finish["choices"][0]["delta"], json!({}));
        assert_eq!(finish["choices"][0]["finish_reason"], "stop");

        let error = frame_json(&c.frame(Delta::Error("boom".to_string())));
        assert_eq!(
            error,
            json!({ "error": { "message": "boom", "type": "decode_error" } })
        );
    }

    #[tokio::test]
    async fn sse_body_ends_with_done() {
        let deltas: DeltaStream = Box::pin(futures::stream::iter(vec![
            Delta::Role,
            Delta::Content("x".to_string()),
            Delta::Finish,
        ]));
        let frames: Vec<Bytes> = completion()
            .sse(deltas)
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[3], Bytes::from_static(DONE_FRAME));
    }

    #[test]
    fn non_stream_response_shape() {
        let response = completion().response(AssembledMessage {
            content: "answer".to_string(),
            reasoning: Some("why".to_string()),
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["message"]["role"], "assistant");
        assert_eq!(value["choices"][0]["message"]["content"], "answer");
        assert_eq!(value["choices"][0]["message"]["reasoning_content"], "why");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(
            value["usage"],
            json!({ "prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0 })
        );
    }

    #[test]
    fn missing_key_error_asks_for_bearer() {
        let response = GatewayError::MissingApiKey.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );

        let response = GatewayError::InvalidApiKey.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }
}
