//! Branch-following decoder state machine.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

use super::chunk::{parse_line, ChunkPayload, StreamLinkRef};
use super::content::{is_emittable, Segment, ThinkSplitter};
use super::Delta;

/// Per-request decoder state. Fed one line at a time; returns the deltas
/// each line produces.
///
/// Until a selection event has resolved a branch, any chunk carrying `curr`
/// is emitted. Once it has, only the selected chain is followed, link by
/// link, and everything else is ignored.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    chunks: HashMap<String, ChunkPayload>,
    branches: [Option<StreamLinkRef>; 2],
    target: Option<String>,
    selection_seen: bool,
    splitter: ThinkSplitter,
    answer: String,
    reasoning: String,
    seen: HashSet<[u8; 32]>,
    pending_reward: Option<String>,
    trace: bool,
    lines: usize,
    skipped: usize,
}

impl StreamDecoder {
    /// `trace` logs every chunk at debug level.
    pub fn new(trace: bool) -> Self {
        Self {
            trace,
            ..Self::default()
        }
    }

    pub fn feed_line(&mut self, line: &str) -> Vec<Delta> {
        self.lines += 1;
        if line.trim().is_empty() {
            return Vec::new();
        }

        let Some(chunk) = parse_line(line) else {
            self.skipped += 1;
            if self.trace {
                tracing::debug!(line = self.lines, text = %preview(line), "Skipping unmatched line");
            }
            return Vec::new();
        };
        if self.trace {
            tracing::debug!(chunk = %chunk.id, payload = ?chunk.payload, "Parsed chunk");
        }

        let mut deltas = match &chunk.payload {
            ChunkPayload::RewardInfo { reward_id } => {
                self.pending_reward = reward_id.clone();
                Vec::new()
            }
            ChunkPayload::BranchSetup { branches } => {
                self.branches = branches.clone();
                Vec::new()
            }
            ChunkPayload::SelectionEvent { selected } => {
                let target = selected
                    .and_then(|i| self.branches.get(i))
                    .and_then(|branch| branch.as_ref())
                    .map(|link| link.id().to_string());
                if let Some(target) = target {
                    tracing::debug!(target = %target, "Following selected branch");
                    self.selection_seen = true;
                    self.target = Some(target);
                }
                Vec::new()
            }
            ChunkPayload::ContentLink { curr, next } => {
                if self.target.as_deref() == Some(chunk.id.as_str()) {
                    self.follow(curr.as_deref(), next.as_ref())
                } else if !self.selection_seen {
                    curr.as_deref().map(|c| self.emit(c)).unwrap_or_default()
                } else {
                    Vec::new()
                }
            }
            ChunkPayload::Opaque(_) => Vec::new(),
        };

        self.chunks.insert(chunk.id, chunk.payload);
        deltas.extend(self.catch_up());
        deltas
    }

    /// Flush anything the think splitter still holds.
    pub fn finish(&mut self) -> Vec<Delta> {
        self.splitter
            .finish()
            .map(|(segment, text)| vec![self.record(segment, text)])
            .unwrap_or_default()
    }

    pub fn take_pending_reward(&mut self) -> Option<String> {
        self.pending_reward.take()
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Advance the chain from the current target and emit its content.
    fn follow(&mut self, curr: Option<&str>, next: Option<&StreamLinkRef>) -> Vec<Delta> {
        self.target = next.map(|link| link.id().to_string());
        curr.map(|c| self.emit(c)).unwrap_or_default()
    }

    /// Walk links that arrived before the chain reached them. Followed links
    /// leave the table, so a cyclic chain cannot loop.
    fn catch_up(&mut self) -> Vec<Delta> {
        let mut deltas = Vec::new();
        loop {
            let Some(target) = self.target.as_deref() else {
                break;
            };
            let Some(ChunkPayload::ContentLink { curr, next }) = self.chunks.remove(target) else {
                break;
            };
            deltas.extend(self.follow(curr.as_deref(), next.as_ref()));
        }
        deltas
    }

    fn emit(&mut self, curr: &str) -> Vec<Delta> {
        if !is_emittable(curr) {
            return Vec::new();
        }
        let fingerprint: [u8; 32] = Sha256::digest(curr.as_bytes()).into();
        if !self.seen.insert(fingerprint) {
            return Vec::new();
        }
        self.splitter
            .push(curr)
            .into_iter()
            .map(|(segment, text)| self.record(segment, text))
            .collect()
    }

    fn record(&mut self, segment: Segment, text: String) -> Delta {
        match segment {
            Segment::Answer => {
                self.answer.push_str(&text);
                Delta::Content(text)
            }
            Segment::Reasoning => {
                self.reasoning.push_str(&text);
                Delta::Reasoning(text)
            }
        }
    }
}

fn preview(line: &str) -> String {
    line.chars().take(50).collect()
}
