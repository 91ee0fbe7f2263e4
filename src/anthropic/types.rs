//! Request and response bodies for the Anthropic `v1/messages` endpoint.
//!
//! Only the members this crate reads are modelled. Unknown response members
//! are ignored, which matters for web search: responses carry
//! `server_tool_use` and `web_search_tool_result` blocks alongside text.

use serde::{Deserialize, Serialize};

/// Version string of the server-side web search tool.
pub const WEB_SEARCH_TOOL: &str = "web_search_20250305";

/// Body of a `POST /v1/messages` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    /// Model identifier, e.g. "claude-sonnet-4-5".
    pub model: String,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    /// Server-side tools the model may call while answering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

/// A single conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Tool declaration. Serialized with `type` as the key, per the API format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
}

impl Tool {
    /// The provider's web search tool, capped at `max_uses` searches.
    pub fn web_search(max_uses: u32) -> Self {
        Self {
            tool_type: WEB_SEARCH_TOOL.to_string(),
            name: "web_search".to_string(),
            max_uses: Some(max_uses),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    /// e.g. "end_turn", "max_tokens"; `None` while in progress.
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

impl MessagesResponse {
    /// The trailing run of `text` blocks, joined. With web search enabled the
    /// model narrates between searches and citations split the answer into
    /// several blocks; the final answer is whatever text follows the last
    /// tool block.
    pub fn final_text(&self) -> Option<String> {
        let tail: Vec<&str> = self
            .content
            .iter()
            .rev()
            .take_while(|b| b.content_type == "text")
            .map(|b| b.text.as_str())
            .collect();
        let text: String = tail.into_iter().rev().collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

/// One block of response content. Non-text blocks keep only their type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_tool_use: Option<ServerToolUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerToolUsage {
    #[serde(default)]
    pub web_search_requests: u32,
}
