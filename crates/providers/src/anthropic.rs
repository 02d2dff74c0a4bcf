use async_trait::async_trait;
use browserpilot_core::config::{DisplayConfig, ProviderConfig};
use browserpilot_core::{
    ActionRequest, Decision, Error, Observation, Result, Transcript, TranscriptEntry,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::{DecisionRequest, DecisionService};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const COMPUTER_USE_BETA: &str = "computer-use-2025-01-24";
const COMPUTER_TOOL_TYPE: &str = "computer_20250124";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Tool carrying pointer and keyboard actions.
pub const COMPUTER_TOOL: &str = "computer";
/// Tool carrying navigate / switch_tab / download.
pub const BROWSER_TOOL: &str = "browser";

const SYSTEM_PROMPT: &str = "You are operating a Chrome browser on the user's behalf. \
Each turn you receive a screenshot of the current tab and a short status note. \
Use the computer tool to move, click, type, press keys and scroll, and the browser tool \
to open URLs, switch tabs or download files. Coordinates refer to the screenshot you are shown. \
When the task is complete, reply with a short summary and no tool calls.";

/// Anthropic Messages API client speaking the computer-use tool.
pub struct AnthropicComputerUse {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    thinking_budget: Option<u32>,
    display_width: u32,
    display_height: u32,
}

impl AnthropicComputerUse {
    /// The tool's display size is the logical resolution: that is the
    /// coordinate space the model reasons in.
    pub fn new(provider: &ProviderConfig, display: &DisplayConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: provider.api_key.clone(),
            api_base: provider
                .api_base
                .as_deref()
                .unwrap_or(ANTHROPIC_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            model: provider.model.clone(),
            max_tokens: provider.max_tokens,
            thinking_budget: provider.thinking_budget,
            display_width: display.logical_width,
            display_height: display.logical_height,
        }
    }

    fn tools(&self) -> Vec<Value> {
        vec![
            json!({
                "type": COMPUTER_TOOL_TYPE,
                "name": COMPUTER_TOOL,
                "display_width_px": self.display_width,
                "display_height_px": self.display_height,
                "display_number": 1,
            }),
            json!({
                "name": BROWSER_TOOL,
                "description": "Browser-level operations that need no screen coordinates: \
open a URL in the current tab, switch to a tab by index, or download a file.",
                "input_schema": {
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": ["navigate", "switch_tab", "download"]
                        },
                        "url": {
                            "type": "string",
                            "description": "Target URL for navigate and download."
                        },
                        "index": {
                            "type": "integer",
                            "minimum": 0,
                            "description": "Zero-based tab index for switch_tab."
                        }
                    },
                    "required": ["action"]
                }
            }),
        ]
    }

    /// Thinking is only sent when its budget fits under `max_tokens`.
    fn thinking(&self) -> Option<Value> {
        let budget = self.thinking_budget.filter(|b| *b > 0)?;
        if budget >= self.max_tokens {
            warn!(
                budget,
                max_tokens = self.max_tokens,
                "Thinking budget must be below maxTokens; thinking disabled"
            );
            return None;
        }
        Some(json!({"type": "enabled", "budget_tokens": budget}))
    }

    /// Transcript plus the current observation as Anthropic messages.
    /// The observation goes last, in the same user turn as the latest tool
    /// results.
    fn convert_messages(transcript: &Transcript, observation: &Observation, context: &str) -> Vec<Value> {
        let mut messages: Vec<Value> = Vec::new();

        for entry in transcript.entries() {
            match entry {
                TranscriptEntry::Task { text } => {
                    messages.push(json!({"role": "user", "content": text}));
                }
                TranscriptEntry::AgentResponse {
                    text,
                    requests,
                    raw,
                } => {
                    let content = match raw {
                        Some(Value::Array(blocks)) if !blocks.is_empty() => blocks.clone(),
                        _ => {
                            let mut blocks = Vec::new();
                            if let Some(text) = text.as_deref().filter(|t| !t.is_empty()) {
                                blocks.push(json!({"type": "text", "text": text}));
                            }
                            for req in requests {
                                blocks.push(json!({
                                    "type": "tool_use",
                                    "id": req.id,
                                    "name": req.tool,
                                    "input": req.input,
                                }));
                            }
                            blocks
                        }
                    };
                    // Empty text blocks are rejected by the API.
                    if content.is_empty() {
                        continue;
                    }
                    messages.push(json!({"role": "assistant", "content": content}));
                }
                TranscriptEntry::ActionResults { results } => {
                    let blocks: Vec<Value> = results
                        .iter()
                        .map(|r| {
                            json!({
                                "type": "tool_result",
                                "tool_use_id": r.call_id,
                                "content": r.content,
                                "is_error": r.is_error,
                            })
                        })
                        .collect();
                    messages.push(json!({"role": "user", "content": blocks}));
                }
            }
        }

        messages.push(json!({
            "role": "user",
            "content": [
                {
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": observation.media_type,
                        "data": observation.image_base64,
                    }
                },
                {"type": "text", "text": context}
            ]
        }));

        Self::merge_consecutive_roles(messages)
    }

    /// Merge consecutive messages with the same role (Anthropic requirement).
    fn merge_consecutive_roles(messages: Vec<Value>) -> Vec<Value> {
        let mut result: Vec<Value> = Vec::new();

        for msg in messages {
            let role = msg.get("role").and_then(|v| v.as_str()).unwrap_or("");
            let last_role = result
                .last()
                .and_then(|v| v.get("role"))
                .and_then(|v| v.as_str())
                .unwrap_or("");

            if role != last_role || result.is_empty() {
                result.push(msg);
                continue;
            }
            if let Some(last) = result.last_mut() {
                let merged = match (last["content"].take(), msg["content"].clone()) {
                    (Value::Array(mut a), Value::Array(b)) => {
                        a.extend(b);
                        Value::Array(a)
                    }
                    (Value::Array(mut a), Value::String(s)) => {
                        a.push(json!({"type": "text", "text": s}));
                        Value::Array(a)
                    }
                    (Value::String(s), Value::Array(b)) => {
                        let mut a = vec![json!({"type": "text", "text": s})];
                        a.extend(b);
                        Value::Array(a)
                    }
                    (Value::String(s1), Value::String(s2)) => Value::String(format!("{}\n\n{}", s1, s2)),
                    (existing, _) => existing,
                };
                last["content"] = merged;
            }
        }

        result
    }

    /// Config may store "anthropic/claude-…"; the API expects the bare id.
    fn normalize_model(model: &str) -> &str {
        model.strip_prefix("anthropic/").unwrap_or(model)
    }

    fn build_request(&self, request: &DecisionRequest<'_>) -> Value {
        let messages = Self::convert_messages(request.transcript, request.observation, request.context);
        let mut body = json!({
            "model": Self::normalize_model(&self.model),
            "max_tokens": self.max_tokens,
            "system": SYSTEM_PROMPT,
            "tools": self.tools(),
            "messages": messages,
        });
        if let Some(thinking) = self.thinking() {
            body["thinking"] = thinking;
        }
        body
    }

    /// A response with tool_use blocks is an action batch; anything else is
    /// the final answer.
    fn parse_response(resp: AnthropicResponse) -> Decision {
        let mut text_parts: Vec<String> = Vec::new();
        let mut requests: Vec<ActionRequest> = Vec::new();

        for block in &resp.content {
            match block.get("type").and_then(|v| v.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                        if !text.is_empty() {
                            text_parts.push(text.to_string());
                        }
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(|v| v.as_str());
                    let name = block.get("name").and_then(|v| v.as_str());
                    if let (Some(id), Some(name)) = (id, name) {
                        let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                        requests.push(ActionRequest::new(id, name, input));
                    }
                }
                _ => {}
            }
        }

        let text = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join("\n"))
        };

        if requests.is_empty() {
            debug!(stop_reason = ?resp.stop_reason, "No tool_use blocks; treating as final answer");
            return Decision::Terminal {
                text: text.unwrap_or_default(),
            };
        }

        Decision::Actions {
            text,
            requests,
            raw: Some(Value::Array(resp.content)),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[async_trait]
impl DecisionService for AnthropicComputerUse {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision> {
        let url = format!("{}/messages", self.api_base);
        let body = self.build_request(&request);

        info!(
            url = %url,
            model = %Self::normalize_model(&self.model),
            transcript_len = request.transcript.len(),
            "Calling Anthropic API"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-beta", COMPUTER_USE_BETA)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::DecisionService {
                status: None,
                message: format!("Anthropic request failed: {}", e),
            })?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %truncate(&raw_body, 500), "Anthropic API error");
            return Err(Error::DecisionService {
                status: Some(status.as_u16()),
                message: truncate(&raw_body, 500),
            });
        }

        debug!(body_len = raw_body.len(), "Anthropic raw response");

        let resp: AnthropicResponse = serde_json::from_str(&raw_body).map_err(|e| Error::DecisionService {
            status: Some(status.as_u16()),
            message: format!(
                "Failed to parse Anthropic response: {}. Body: {}",
                e,
                truncate(&raw_body, 500)
            ),
        })?;

        let input_tokens = resp.usage.as_ref().and_then(|u| u.input_tokens);
        let output_tokens = resp.usage.as_ref().and_then(|u| u.output_tokens);
        let decision = Self::parse_response(resp);

        info!(
            actions = match &decision {
                Decision::Actions { requests, .. } => requests.len(),
                Decision::Terminal { .. } => 0,
            },
            input_tokens = ?input_tokens,
            output_tokens = ?output_tokens,
            "Anthropic response parsed"
        );

        Ok(decision)
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use browserpilot_core::ActionResultEntry;

    fn observation() -> Observation {
        Observation {
            image_base64: "aW1n".to_string(),
            media_type: "image/jpeg".to_string(),
            width: 1024,
            height: 768,
        }
    }

    fn provider(api_base: Option<String>) -> AnthropicComputerUse {
        let cfg = ProviderConfig {
            api_key: "sk-test".to_string(),
            api_base,
            ..ProviderConfig::default()
        };
        AnthropicComputerUse::new(&cfg, &DisplayConfig::default())
    }

    #[test]
    fn test_tools_use_logical_resolution() {
        let tools = provider(None).tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["type"], "computer_20250124");
        assert_eq!(tools[0]["name"], "computer");
        assert_eq!(tools[0]["display_width_px"], 1024);
        assert_eq!(tools[0]["display_height_px"], 768);
        assert_eq!(tools[0]["display_number"], 1);
        assert_eq!(tools[1]["name"], "browser");
        assert!(tools[1]["input_schema"]["properties"]["action"]["enum"].is_array());
    }

    #[test]
    fn test_results_and_observation_share_a_user_turn() {
        let mut transcript = Transcript::new("find the weather");
        transcript.push(TranscriptEntry::AgentResponse {
            text: Some("Clicking search".into()),
            requests: vec![ActionRequest::new(
                "toolu_1",
                "computer",
                json!({"action": "left_click", "coordinate": [10, 20]}),
            )],
            raw: None,
        });
        transcript.push(TranscriptEntry::ActionResults {
            results: vec![ActionResultEntry {
                call_id: "toolu_1".into(),
                content: "Clicked at (13, 21)".into(),
                is_error: false,
            }],
        });

        let msgs = AnthropicComputerUse::convert_messages(&transcript, &observation(), "turn 2");
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[1]["role"], "assistant");
        assert_eq!(msgs[1]["content"][1]["type"], "tool_use");
        assert_eq!(msgs[1]["content"][1]["id"], "toolu_1");

        let last = msgs[2]["content"].as_array().unwrap();
        assert_eq!(last[0]["type"], "tool_result");
        assert_eq!(last[0]["tool_use_id"], "toolu_1");
        assert_eq!(last[1]["type"], "image");
        assert_eq!(last[1]["source"]["media_type"], "image/jpeg");
        assert_eq!(last[2]["text"], "turn 2");
    }

    #[test]
    fn test_first_turn_merges_task_with_observation() {
        let transcript = Transcript::new("open example.com");
        let msgs = AnthropicComputerUse::convert_messages(&transcript, &observation(), "ctx");
        assert_eq!(msgs.len(), 1);
        let content = msgs[0]["content"].as_array().unwrap();
        assert_eq!(content[0]["text"], "open example.com");
        assert_eq!(content[1]["type"], "image");
    }

    #[test]
    fn test_raw_blocks_are_replayed_verbatim() {
        let raw = json!([
            {"type": "thinking", "thinking": "hmm", "signature": "sig"},
            {"type": "tool_use", "id": "toolu_9", "name": "computer", "input": {"action": "screenshot"}}
        ]);
        let mut transcript = Transcript::new("t");
        transcript.push(TranscriptEntry::AgentResponse {
            text: None,
            requests: vec![ActionRequest::new("toolu_9", "computer", json!({"action": "screenshot"}))],
            raw: Some(raw.clone()),
        });
        let msgs = AnthropicComputerUse::convert_messages(&transcript, &observation(), "ctx");
        assert_eq!(msgs[1]["content"], raw);
    }

    #[test]
    fn test_parse_tool_use_and_terminal() {
        let resp: AnthropicResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "content": [
                {"type": "thinking", "thinking": "...", "signature": "s"},
                {"type": "text", "text": "I'll click the search box."},
                {"type": "tool_use", "id": "toolu_1", "name": "computer",
                 "input": {"action": "left_click", "coordinate": [512, 384]}}
            ],
            "stop_reason": "tool_use"
        }))
        .unwrap();
        match AnthropicComputerUse::parse_response(resp) {
            Decision::Actions { text, requests, raw } => {
                assert_eq!(text.as_deref(), Some("I'll click the search box."));
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].tool, "computer");
                assert_eq!(requests[0].action_name(), "left_click");
                assert_eq!(raw.unwrap().as_array().unwrap().len(), 3);
            }
            other => panic!("expected actions, got {:?}", other),
        }

        let resp: AnthropicResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "The weather is sunny."}],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(
            AnthropicComputerUse::parse_response(resp),
            Decision::Terminal {
                text: "The weather is sunny.".into()
            }
        );
    }

    #[test]
    fn test_thinking_requires_budget_below_max_tokens() {
        let mut p = provider(None);
        assert_eq!(p.thinking().unwrap()["budget_tokens"], 1024);
        p.thinking_budget = Some(8192);
        assert!(p.thinking().is_none());
        p.thinking_budget = None;
        assert!(p.thinking().is_none());
    }

    #[test]
    fn test_normalize_model() {
        assert_eq!(
            AnthropicComputerUse::normalize_model("anthropic/claude-sonnet-4-5"),
            "claude-sonnet-4-5"
        );
        assert_eq!(AnthropicComputerUse::normalize_model("claude-haiku-4-5"), "claude-haiku-4-5");
    }

    async fn spawn_stub(status: StatusCode, body: Value) -> String {
        let app = Router::new().route(
            "/v1/messages",
            post(move |headers: HeaderMap, Json(req): Json<Value>| {
                let body = body.clone();
                async move {
                    let beta_ok = headers.get("anthropic-beta").map(|v| v == COMPUTER_USE_BETA) == Some(true);
                    let key_ok = headers.get("x-api-key").map(|v| v == "sk-test") == Some(true);
                    if !beta_ok || !key_ok || req["tools"].as_array().map(|t| t.len()) != Some(2) {
                        return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"})));
                    }
                    (status, Json(body))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}/v1", addr)
    }

    #[tokio::test]
    async fn test_decide_against_stub_server() {
        let base = spawn_stub(
            StatusCode::OK,
            json!({
                "id": "msg_1",
                "content": [{"type": "tool_use", "id": "toolu_1", "name": "browser",
                             "input": {"action": "navigate", "url": "example.com"}}],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 10, "output_tokens": 5}
            }),
        )
        .await;
        let p = provider(Some(base));
        let transcript = Transcript::new("go to example.com");
        let obs = observation();
        let decision = p
            .decide(DecisionRequest {
                transcript: &transcript,
                observation: &obs,
                context: "ctx",
            })
            .await
            .unwrap();
        match decision {
            Decision::Actions { requests, .. } => {
                assert_eq!(requests[0].tool, "browser");
                assert_eq!(requests[0].action_name(), "navigate");
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overloaded_status_is_transient() {
        let base = spawn_stub(
            StatusCode::from_u16(529).unwrap(),
            json!({"type": "error", "error": {"type": "overloaded_error"}}),
        )
        .await;
        let p = provider(Some(base));
        let transcript = Transcript::new("t");
        let obs = observation();
        let err = p
            .decide(DecisionRequest {
                transcript: &transcript,
                observation: &obs,
                context: "ctx",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DecisionService { status: Some(529), .. }));
        assert!(err.is_transient());
    }
}
