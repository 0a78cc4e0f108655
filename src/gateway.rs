//! Request orchestration.
//!
//! One [`Gateway`] is built at startup and shared by every handler. For each
//! chat request it resolves the model, formats the transcript, walks the
//! account pool until an upstream call is accepted, and wraps the response in
//! the stream decoder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::account_pool::{mask_token, AccountLease, AccountOutcome, SharedAccountPool};
use crate::decode::{assemble, decode_stream, AssembledMessage, DeltaStream, RewardHook};
use crate::error::GatewayError;
use crate::formatter::format_transcript;
use crate::models::ModelRegistry;
use crate::openai::ChatCompletionRequest;
use crate::upstream::{ChatCall, LineStream, SharedUpstream, UpstreamError};

/// What a chat request produced.
pub enum ChatReply {
    /// Live deltas, framed by `Role` and `Finish`.
    Stream(DeltaStream),
    Complete(AssembledMessage),
}

impl std::fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("ChatReply::Stream(..)"),
            Self::Complete(message) => f.debug_tuple("ChatReply::Complete").field(message).finish(),
        }
    }
}

pub struct Gateway {
    pool: SharedAccountPool,
    models: Arc<ModelRegistry>,
    upstream: SharedUpstream,
    debug: Arc<AtomicBool>,
}

impl Gateway {
    pub fn new(
        pool: SharedAccountPool,
        models: Arc<ModelRegistry>,
        upstream: SharedUpstream,
        debug_mode: bool,
    ) -> Self {
        Self {
            pool,
            models,
            upstream,
            debug: Arc::new(AtomicBool::new(debug_mode)),
        }
    }

    pub fn pool(&self) -> &SharedAccountPool {
        &self.pool
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn debug_mode(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "Debug mode switched");
    }

    /// Run one chat request.
    pub async fn complete(&self, request: &ChatCompletionRequest) -> Result<ChatReply, GatewayError> {
        let model_name = self.models.resolve(&request.model)?.to_string();
        if request.messages.is_empty() {
            return Err(GatewayError::EmptyMessages);
        }

        let call = ChatCall {
            transcript: format_transcript(&request.messages),
            model_name,
            stream: request.stream,
        };
        let (lease, lines) = self.open_with_failover(&call).await?;

        let hook = self.reward_hook(lease.token().to_string());
        let deltas = decode_stream(lines, self.debug_mode(), Some(hook));
        if call.stream {
            Ok(ChatReply::Stream(deltas))
        } else {
            assemble(deltas).await.map(ChatReply::Complete)
        }
    }

    /// Try accounts until one gets the call accepted. Auth and transient
    /// failures move on to the next account; a client failure ends the loop
    /// with the upstream's own status and body.
    async fn open_with_failover(
        &self,
        call: &ChatCall,
    ) -> Result<(AccountLease, LineStream), GatewayError> {
        let attempts = self.pool.size();
        if attempts == 0 {
            return Err(GatewayError::NoAccountAvailable);
        }

        for attempt in 1..=attempts {
            let lease = self
                .pool
                .select()
                .await
                .map_err(|_| GatewayError::NoAccountAvailable)?;

            match self.upstream.open_chat(lease.token(), call).await {
                Ok(lines) => {
                    self.pool.record_outcome(&lease, AccountOutcome::Success).await;
                    tracing::debug!(
                        attempt,
                        account = %lease.masked_token(),
                        model = %call.model_name,
                        "Upstream accepted chat turn"
                    );
                    return Ok((lease, lines));
                }
                Err(err) => {
                    let outcome = err.outcome();
                    self.pool.record_outcome(&lease, outcome).await;
                    tracing::warn!(
                        attempt,
                        account = %lease.masked_token(),
                        outcome = %outcome,
                        error = %err,
                        "Upstream attempt failed"
                    );
                    if outcome == AccountOutcome::ClientFailure {
                        if let UpstreamError::Status { status, body } = err {
                            return Err(GatewayError::UpstreamClient { status, body });
                        }
                    }
                }
            }
        }

        tracing::error!(attempts, "All upstream attempts failed");
        Err(GatewayError::AttemptsExhausted)
    }

    fn reward_hook(&self, token: String) -> RewardHook {
        let upstream = self.upstream.clone();
        Box::new(move |reward_id| {
            tokio::spawn(async move {
                let account = mask_token(&token);
                match upstream.claim_reward(&token, &reward_id).await {
                    Ok(balance) => tracing::info!(
                        account = %account,
                        reward = %reward_id,
                        balance,
                        "Reward claimed"
                    ),
                    Err(e) => tracing::warn!(
                        account = %account,
                        reward = %reward_id,
                        error = %e,
                        "Failed to claim reward"
                    ),
                }
            });
        })
    }
}
