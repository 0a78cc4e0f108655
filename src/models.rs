//! Model registry snapshot.
//!
//! The registry is produced offline (one record per upstream model) and read
//! once at startup. Clients address models by `label`; the upstream wants the
//! internal `name`.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::openai::{ModelList, ModelObject};

/// A single registry entry. Flag fields (`isPro`, `isReasoning`, ...) are
/// kept as-is so the file can round-trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Internal upstream model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Client-facing model id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(flatten)]
    pub flags: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelLookupError {
    #[error("Model '{0}' not found.")]
    Unknown(String),
    #[error("Model '{0}' has no 'name' field.")]
    MissingName(String),
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelRecord>,
}

impl ModelRegistry {
    pub fn new(models: Vec<ModelRecord>) -> Self {
        Self { models }
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn find_by_label(&self, label: &str) -> Option<&ModelRecord> {
        self.models
            .iter()
            .find(|m| m.label.as_deref() == Some(label))
    }

    /// Resolve a client-facing label to the upstream's internal model name.
    pub fn resolve(&self, label: &str) -> Result<&str, ModelLookupError> {
        let record = self
            .find_by_label(label)
            .ok_or_else(|| ModelLookupError::Unknown(label.to_string()))?;
        record
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ModelLookupError::MissingName(label.to_string()))
    }

    /// OpenAI model listing derived from `label` / `publisher`.
    pub fn list(&self, created: i64) -> ModelList {
        let data = self
            .models
            .iter()
            .map(|m| ModelObject {
                id: m.label.clone().unwrap_or_else(|| "unknown".to_string()),
                object: "model".to_string(),
                created,
                owned_by: m.publisher.clone().unwrap_or_else(|| "unknown".to_string()),
            })
            .collect();
        ModelList {
            object: "list".to_string(),
            data,
        }
    }

    /// First few labels, sorted, for startup logging.
    pub fn sample_labels(&self, limit: usize) -> Vec<String> {
        let mut labels: Vec<String> = self
            .models
            .iter()
            .map(|m| {
                m.label
                    .clone()
                    .or_else(|| m.id.clone())
                    .unwrap_or_else(|| "unknown".to_string())
            })
            .collect();
        labels.sort();
        labels.truncate(limit);
        labels
    }
}

static MODEL_NAME_STRIP: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_RUN: OnceLock<Regex> = OnceLock::new();

/// Clean a registry label for use as the `model` field of responses.
///
/// Labels carry decorations (a newline followed by emoji tags); clients get
/// a single plain line.
pub fn clean_model_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let spaced: String = name
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' | '\x0c' | '\x0b' => ' ',
            other => other,
        })
        .collect();
    let strip = MODEL_NAME_STRIP.get_or_init(|| {
        Regex::new(r"[^\p{L}\p{N}_\s\-().\[\]/]+").expect("valid model name regex")
    });
    let stripped = strip.replace_all(&spaced, "");
    let ws = WHITESPACE_RUN.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"));
    ws.replace_all(&stripped, " ").trim().to_string()
}
