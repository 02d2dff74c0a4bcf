use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One action requested by the decision service. `id` is the continuation
/// identifier that must be echoed back with the action's result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRequest {
    pub id: String,
    /// Tool name the request arrived under (e.g. `computer`, `browser`).
    pub tool: String,
    #[serde(default)]
    pub input: Value,
}

impl ActionRequest {
    pub fn new(id: &str, tool: &str, input: Value) -> Self {
        Self {
            id: id.to_string(),
            tool: tool.to_string(),
            input,
        }
    }

    /// The `action` field of the tool input, if any.
    pub fn action_name(&self) -> &str {
        self.input
            .get("action")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
    }
}

/// What the decision service answered for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Task finished; no further actions requested.
    Terminal { text: String },
    /// Ordered action batch plus any accompanying text.
    Actions {
        text: Option<String>,
        requests: Vec<ActionRequest>,
        /// Provider-native content blocks (thinking signatures etc.), replayed
        /// verbatim on the next call when present.
        raw: Option<Value>,
    },
}

impl Decision {
    pub fn text(&self) -> Option<&str> {
        match self {
            Decision::Terminal { text } => Some(text.as_str()),
            Decision::Actions { text, .. } => text.as_deref(),
        }
    }
}

/// Result of one executed action, keyed by the request's continuation id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResultEntry {
    pub call_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Task {
        text: String,
    },
    AgentResponse {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        requests: Vec<ActionRequest>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<Value>,
    },
    /// All results of one turn's batch, kept together so turn boundaries stay
    /// visible to the decision service.
    ActionResults {
        results: Vec<ActionResultEntry>,
    },
}

/// Ordered conversation for one task. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new(task: &str) -> Self {
        Self {
            entries: vec![TranscriptEntry::Task {
                text: task.to_string(),
            }],
        }
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }
}

/// Screenshot prepared for the decision service.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub image_base64: String,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transcript_starts_with_task() {
        let mut t = Transcript::new("open example.com");
        assert_eq!(t.len(), 1);
        t.push(TranscriptEntry::AgentResponse {
            text: Some("done".into()),
            requests: vec![],
            raw: None,
        });
        assert_eq!(t.len(), 2);
        assert!(matches!(t.entries()[0], TranscriptEntry::Task { .. }));
    }

    #[test]
    fn test_action_name() {
        let req = ActionRequest::new("toolu_1", "computer", json!({"action": "left_click"}));
        assert_eq!(req.action_name(), "left_click");
        let req = ActionRequest::new("toolu_2", "computer", json!({}));
        assert_eq!(req.action_name(), "unknown");
    }
}
