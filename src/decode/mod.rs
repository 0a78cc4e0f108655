//! Upstream stream decoding.
//!
//! Turns the upstream's `<hex-id>:<json>` line stream into OpenAI-shaped
//! deltas:
//!
//! - [`chunk`]: line parsing and the typed payload union
//! - [`content`]: content filtering and `<think>` splitting
//! - [`decoder`]: the branch-following state machine
//! - [`assembler`]: collapses a delta stream into one message
//!
//! [`decode_stream`] drives a [`StreamDecoder`] over a live line stream and
//! guarantees the framing: one leading [`Delta::Role`], one trailing
//! [`Delta::Finish`], and at most one [`Delta::Error`] just before it.

pub mod assembler;
pub mod chunk;
pub mod content;
pub mod decoder;

use std::pin::Pin;

use futures::{Stream, StreamExt};

use crate::upstream::LineStream;

pub use assembler::{assemble, AssembledMessage};
pub use chunk::{parse_line, Chunk, ChunkPayload, StreamLinkRef};
pub use decoder::StreamDecoder;

/// One unit of decoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Always first.
    Role,
    Content(String),
    Reasoning(String),
    /// The line stream failed; always followed by `Finish`.
    Error(String),
    /// Always last.
    Finish,
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Delta> + Send>>;

/// Called with the pending reward id once the stream has finished.
pub type RewardHook = Box<dyn FnOnce(String) + Send>;

/// Decode a line stream lazily.
///
/// The reward hook runs after `Finish` has been handed to the consumer, and
/// only if the consumer keeps polling until the stream ends. Dropping the
/// stream early drops `lines` with it.
pub fn decode_stream(
    mut lines: LineStream,
    trace: bool,
    on_reward: Option<RewardHook>,
) -> DeltaStream {
    Box::pin(async_stream::stream! {
        let mut decoder = StreamDecoder::new(trace);
        yield Delta::Role;

        let mut failure = None;
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    for delta in decoder.feed_line(&line) {
                        yield delta;
                    }
                }
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            }
        }
        for delta in decoder.finish() {
            yield delta;
        }
        if let Some(message) = failure {
            tracing::warn!(error = %message, "Upstream stream failed mid-response");
            yield Delta::Error(message);
        }
        yield Delta::Finish;

        tracing::debug!(
            lines = decoder.lines(),
            skipped = decoder.skipped(),
            content_chars = decoder.answer().chars().count(),
            reasoning_chars = decoder.reasoning().chars().count(),
            "Stream decoding completed"
        );

        if let (Some(hook), Some(reward_id)) = (on_reward, decoder.take_pending_reward()) {
            hook(reward_id);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{response_lines, UpstreamError};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn lines(items: Vec<Result<&str, UpstreamError>>) -> LineStream {
        let owned: Vec<Result<String, UpstreamError>> = items
            .into_iter()
            .map(|item| item.map(str::to_string))
            .collect();
        Box::pin(futures::stream::iter(owned))
    }

    fn ok_lines(items: &[&str]) -> LineStream {
        lines(items.iter().map(|line| Ok(*line)).collect())
    }

    const TURN: &[&str] = &[
        r#"a:{"unclaimedRewardInfo":{"rewardId":"rw-9"}}"#,
        r#"1:{"leftStream":{"next":"$@10"},"rightStream":{"next":"$@20"}}"#,
        r#"e:{"modelSelections":[{"selectionSource":"USER_SELECTED"},{"selectionSource":"RANDOM"}]}"#,
        r#"10:{"curr":"<think>plan","next":"$@11"}"#,
        r#"20:{"curr":"other branch","next":"$@21"}"#,
        r#"11:{"curr":"</think>Sure","next":"$@12"}"#,
        r#"12:{"curr":", done.","next":"$undefined"}"#,
    ];

    #[tokio::test]
    async fn framing_wraps_decoded_content() {
        let deltas: Vec<Delta> = decode_stream(ok_lines(TURN), false, None).collect().await;
        assert_eq!(
            deltas,
            vec![
                Delta::Role,
                Delta::Reasoning("plan".to_string()),
                Delta::Content("Sure".to_string()),
                Delta::Content(", done.".to_string()),
                Delta::Finish,
            ]
        );
    }

    #[tokio::test]
    async fn empty_input_still_frames() {
        let deltas: Vec<Delta> = decode_stream(ok_lines(&[]), false, None).collect().await;
        assert_eq!(deltas, vec![Delta::Role, Delta::Finish]);

        let deltas: Vec<Delta> = decode_stream(ok_lines(&["junk", "", "zz"]), true, None)
            .collect()
            .await;
        assert_eq!(deltas, vec![Delta::Role, Delta::Finish]);
    }

    #[tokio::test]
    async fn stream_failure_becomes_error_then_finish() {
        let input = lines(vec![
            Ok(r#"5:{"curr":"partial"}"#),
            Err(UpstreamError::Stream("connection reset".to_string())),
            Ok(r#"6:{"curr":"never"}"#),
        ]);
        let deltas: Vec<Delta> = decode_stream(input, false, None).collect().await;
        assert_eq!(deltas.len(), 4);
        assert_eq!(deltas[0], Delta::Role);
        assert_eq!(deltas[1], Delta::Content("partial".to_string()));
        assert!(matches!(&deltas[2], Delta::Error(m) if m.contains("connection reset")));
        assert_eq!(deltas[3], Delta::Finish);
    }

    #[tokio::test]
    async fn reward_hook_fires_after_finish() {
        let claimed = Arc::new(Mutex::new(Vec::new()));
        let sink = claimed.clone();
        let hook: RewardHook = Box::new(move |id| sink.lock().unwrap().push(id));

        let mut stream = decode_stream(ok_lines(TURN), false, Some(hook));
        while let Some(delta) = stream.next().await {
            if delta == Delta::Finish {
                assert!(claimed.lock().unwrap().is_empty());
            }
        }
        assert_eq!(*claimed.lock().unwrap(), vec!["rw-9".to_string()]);
    }

    #[tokio::test]
    async fn held_partial_marker_is_flushed_before_finish() {
        let deltas: Vec<Delta> = decode_stream(ok_lines(&[r#"5:{"curr":"a <thi"}"#]), false, None)
            .collect()
            .await;
        assert_eq!(
            deltas,
            vec![
                Delta::Role,
                Delta::Content("a ".to_string()),
                Delta::Content("<thi".to_string()),
                Delta::Finish,
            ]
        );
    }

    #[tokio::test]
    async fn undecodable_line_is_skipped_not_fatal() {
        let body = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"5:{\"curr\":\"before\"}\n")),
            Ok(Bytes::from_static(b"zz:\xff\xfe garbage\n")),
            Ok(Bytes::from_static(b"6:{\"curr\":\"after\"}\n")),
        ];
        let deltas: Vec<Delta> = decode_stream(response_lines(futures::stream::iter(body)), false, None)
            .collect()
            .await;
        assert_eq!(
            deltas,
            vec![
                Delta::Role,
                Delta::Content("before".to_string()),
                Delta::Content("after".to_string()),
                Delta::Finish,
            ]
        );
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn dropping_deltas_early_releases_lines_and_skips_reward() {
        let released = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(released.clone());
        let open_ended: LineStream = Box::pin(
            futures::stream::iter(TURN.iter().map(|line| Ok::<_, UpstreamError>(line.to_string())))
                .chain(futures::stream::pending())
                .map(move |line| {
                    let _held = &guard;
                    line
                }),
        );

        let claimed = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = claimed.clone();
        let hook: RewardHook = Box::new(move |id| sink.lock().unwrap().push(id));

        let mut deltas = decode_stream(open_ended, false, Some(hook));
        assert_eq!(deltas.next().await, Some(Delta::Role));
        assert_eq!(deltas.next().await, Some(Delta::Reasoning("plan".to_string())));
        assert!(!released.load(Ordering::SeqCst));

        drop(deltas);
        assert!(released.load(Ordering::SeqCst));
        assert!(claimed.lock().unwrap().is_empty());
    }
}
