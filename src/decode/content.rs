//! Content filtering and `<think>` splitting.

use std::sync::OnceLock;

use regex::Regex;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";
const STOP_MARKER: &str = "\\<streaming stopped";
const PLACEHOLDERS: [&str; 4] = ["$undefined", "undefined", "null", "NULL"];

static UUID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn is_bare_uuid(text: &str) -> bool {
    UUID_PATTERN
        .get_or_init(|| {
            Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
                .expect("valid uuid regex")
        })
        .is_match(text)
}

/// The upstream appends `\<streaming stopped ...>` notices when a turn is cut
/// short, usually behind a real or escaped (`\n`) newline.
fn is_stop_marker(text: &str) -> bool {
    let mut rest = text;
    loop {
        if let Some(stripped) = rest.strip_prefix('\n') {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("\\n") {
            rest = stripped;
        } else {
            break;
        }
    }
    rest.starts_with(STOP_MARKER)
}

/// Whether a `curr` value is real model output.
pub fn is_emittable(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed) {
        return false;
    }
    !is_bare_uuid(trimmed) && !is_stop_marker(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Answer,
    Reasoning,
}

/// Splits content into answer and reasoning segments on `<think>` /
/// `</think>`. Markers may straddle `push` calls: a suffix that could still
/// become a marker is held back until the next push or `finish`.
#[derive(Debug, Default)]
pub struct ThinkSplitter {
    thinking: bool,
    pending: String,
}

impl ThinkSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn segment(&self) -> Segment {
        if self.thinking {
            Segment::Reasoning
        } else {
            Segment::Answer
        }
    }

    fn marker(&self) -> &'static str {
        if self.thinking {
            THINK_CLOSE
        } else {
            THINK_OPEN
        }
    }

    pub fn push(&mut self, text: &str) -> Vec<(Segment, String)> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.push_str(text);

        let mut out = Vec::new();
        let mut rest = buf.as_str();
        loop {
            let marker = self.marker();
            if let Some(pos) = rest.find(marker) {
                if pos > 0 {
                    out.push((self.segment(), rest[..pos].to_string()));
                }
                self.thinking = !self.thinking;
                rest = &rest[pos + marker.len()..];
                continue;
            }

            // Markers are ASCII, so a held suffix starts on a char boundary.
            let held = (1..marker.len())
                .rev()
                .find(|&k| rest.ends_with(&marker[..k]))
                .unwrap_or(0);
            let (emit, keep) = rest.split_at(rest.len() - held);
            if !emit.is_empty() {
                out.push((self.segment(), emit.to_string()));
            }
            self.pending = keep.to_string();
            break;
        }
        out
    }

    /// Release whatever is held back.
    pub fn finish(&mut self) -> Option<(Segment, String)> {
        if self.pending.is_empty() {
            return None;
        }
        Some((self.segment(), std::mem::take(&mut self.pending)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(s: &str) -> (Segment, String) {
        (Segment::Answer, s.to_string())
    }

    fn reasoning(s: &str) -> (Segment, String) {
        (Segment::Reasoning, s.to_string())
    }

    #[test]
    fn filters_placeholders_and_noise() {
        assert!(!is_emittable(""));
        assert!(!is_emittable("   \n"));
        assert!(!is_emittable("$undefined"));
        assert!(!is_emittable(" undefined "));
        assert!(!is_emittable("null"));
        assert!(!is_emittable("NULL"));
        assert!(!is_emittable("0f8e2a8c-9a41-4c55-b2b8-3c9b0a7d1e22"));
        assert!(!is_emittable("\\n\\<streaming stopped unexpectedly>"));
        assert!(!is_emittable("\n\\<streaming stopped>"));
        assert!(!is_emittable("\\<streaming stopped>"));
    }

    #[test]
    fn keeps_ordinary_text() {
        assert!(is_emittable("a"));
        assert!(is_emittable(" Hello"));
        assert!(is_emittable("Nullable types"));
        assert!(is_emittable("id 0f8e2a8c-9a41-4c55-b2b8-3c9b0a7d1e22"));
        assert!(is_emittable("text \\<streaming stopped"));
    }

    #[test]
    fn splits_both_markers_in_one_piece() {
        let mut splitter = ThinkSplitter::new();
        assert_eq!(
            splitter.push("Hello <think>because</think> world"),
            vec![answer("Hello "), reasoning("because"), answer(" world")]
        );
        assert!(!splitter.thinking);
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn thinking_state_spans_pieces() {
        let mut splitter = ThinkSplitter::new();
        assert_eq!(splitter.push("<think>step one"), vec![reasoning("step one")]);
        assert!(splitter.thinking);
        assert_eq!(splitter.push(", step two"), vec![reasoning(", step two")]);
        assert_eq!(
            splitter.push("</think>Answer"),
            vec![answer("Answer")]
        );
    }

    #[test]
    fn markers_split_across_pieces() {
        let mut splitter = ThinkSplitter::new();
        assert_eq!(splitter.push("Hi <th"), vec![answer("Hi ")]);
        assert_eq!(splitter.push("ink>deep"), vec![reasoning("deep")]);
        assert_eq!(splitter.push(" thought</"), vec![reasoning(" thought")]);
        assert_eq!(splitter.push("think> done"), vec![answer(" done")]);
    }

    #[test]
    fn held_suffix_is_released_when_no_marker_follows() {
        let mut splitter = ThinkSplitter::new();
        assert_eq!(splitter.push("a <"), vec![answer("a ")]);
        assert_eq!(splitter.push("b"), vec![answer("<b")]);
        assert_eq!(splitter.push("x <thi"), vec![answer("x ")]);
        assert_eq!(splitter.finish(), Some(answer("<thi")));
    }

    #[test]
    fn stray_close_marker_is_plain_text() {
        let mut splitter = ThinkSplitter::new();
        assert_eq!(splitter.push("a</think>b"), vec![answer("a</think>b")]);
    }
}
