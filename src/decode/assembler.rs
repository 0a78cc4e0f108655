//! Non-streaming responses: collapse a delta stream into one message.

use futures::{Stream, StreamExt};

use super::Delta;
use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssembledMessage {
    pub content: String,
    /// None when the model produced no reasoning.
    pub reasoning: Option<String>,
}

/// Concatenate content and reasoning deltas up to `Finish`.
///
/// The stream is always drained to its end so completion side effects still
/// run; an error delta fails the whole assembly.
pub async fn assemble<S>(deltas: S) -> Result<AssembledMessage, GatewayError>
where
    S: Stream<Item = Delta>,
{
    futures::pin_mut!(deltas);

    let mut content = String::new();
    let mut reasoning = String::new();
    let mut failure = None;
    let mut finished = false;

    while let Some(delta) = deltas.next().await {
        if finished || failure.is_some() {
            continue;
        }
        match delta {
            Delta::Role => {}
            Delta::Content(text) => content.push_str(&text),
            Delta::Reasoning(text) => reasoning.push_str(&text),
            Delta::Error(message) => failure = Some(message),
            Delta::Finish => finished = true,
        }
    }

    if let Some(message) = failure {
        return Err(GatewayError::Decode(message));
    }
    Ok(AssembledMessage {
        content,
        reasoning: (!reasoning.is_empty()).then_some(reasoning),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_stream;
    use crate::upstream::{LineStream, UpstreamError};

    fn stream_of(deltas: Vec<Delta>) -> impl Stream<Item = Delta> {
        futures::stream::iter(deltas)
    }

    #[tokio::test]
    async fn concatenates_until_finish() {
        let message = assemble(stream_of(vec![
            Delta::Role,
            Delta::Reasoning("think ".to_string()),
            Delta::Reasoning("hard".to_string()),
            Delta::Content("Hello".to_string()),
            Delta::Content(" world".to_string()),
            Delta::Finish,
            Delta::Content("ignored".to_string()),
        ]))
        .await
        .unwrap();
        assert_eq!(message.content, "Hello world");
        assert_eq!(message.reasoning.as_deref(), Some("think hard"));
    }

    #[tokio::test]
    async fn no_reasoning_is_none() {
        let message = assemble(stream_of(vec![
            Delta::Role,
            Delta::Content("x".to_string()),
            Delta::Finish,
        ]))
        .await
        .unwrap();
        assert_eq!(message.reasoning, None);
    }

    #[tokio::test]
    async fn error_delta_fails_assembly() {
        let err = assemble(stream_of(vec![
            Delta::Role,
            Delta::Content("partial".to_string()),
            Delta::Error("connection reset".to_string()),
            Delta::Finish,
        ]))
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::Decode(ref m) if m == "connection reset"));
    }

    #[tokio::test]
    async fn matches_streamed_concatenation() {
        let turn = [
            r#"1:{"leftStream":{"next":"$@10"},"rightStream":{"next":"$@20"}}"#,
            r#"e:{"modelSelections":[{"selectionSource":"RANDOM"},{"selectionSource":"USER_SELECTED"}]}"#,
            r#"20:{"curr":"One <think>inner","next":"$@21"}"#,
            r#"10:{"curr":"left","next":"$@11"}"#,
            r#"21:{"curr":" more</think> two","next":"$@22"}"#,
            r#"22:{"curr":" three","next":"$undefined"}"#,
        ];
        let lines = || -> LineStream {
            let owned: Vec<Result<String, UpstreamError>> =
                turn.iter().map(|l| Ok(l.to_string())).collect();
            Box::pin(futures::stream::iter(owned))
        };

        let streamed: Vec<Delta> = decode_stream(lines(), false, None).collect().await;
        let mut content = String::new();
        let mut reasoning = String::new();
        for delta in streamed {
            match delta {
                Delta::Content(t) => content.push_str(&t),
                Delta::Reasoning(t) => reasoning.push_str(&t),
                _ => {}
            }
        }

        let assembled = assemble(decode_stream(lines(), false, None)).await.unwrap();
        assert_eq!(assembled.content, content);
        assert_eq!(assembled.content, "One  two three");
        assert_eq!(assembled.reasoning.as_deref(), Some(reasoning.as_str()));
        assert_eq!(reasoning, "inner more");
    }
}
