//! Single-shot structured query against a web-search-capable agent.
//!
//! [`AgentClient::query`] sends one Messages API request carrying the job's
//! instruction, the schema's shape and the current document, then insists on
//! a single JSON value with the right top-level framing. It never retries and
//! never reprompts.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::anthropic::{Message, MessageSender, MessagesRequest, Tool};
use crate::job::Job;
use crate::merge::Document;
use crate::schema::{Schema, SchemaMismatch, check_shape, describe};

const SYSTEM_PROMPT: &str = "You are a meticulous research assistant with web search. \
Use search to find current, verifiable facts. Answer with JSON only: no prose, no markdown.";

#[derive(Debug, Error)]
pub enum AgentError {
    /// Provider unreachable, timed out, rejected the request or rate limited it.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(#[from] MalformedResponse),
}

#[derive(Debug, Error)]
pub enum MalformedResponse {
    #[error("response contained no text")]
    NoText,

    #[error("not valid JSON: {0}")]
    NotJson(String),

    #[error("{0}")]
    WrongShape(SchemaMismatch),
}

pub struct AgentClient<S> {
    sender: S,
    max_tokens: u32,
}

impl<S: MessageSender> AgentClient<S> {
    pub fn new(sender: S, max_tokens: u32) -> Self {
        Self { sender, max_tokens }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// Asks the agent for fresh data for `job`, returning the raw JSON value
    /// once its top-level framing matches the job's schema.
    pub async fn query(&self, job: &Job, current: Option<&Document>) -> Result<Value, AgentError> {
        let req = self.build_request(job, current);
        debug!(model = %req.model, max_searches = job.max_searches, "querying agent");

        let response = self
            .sender
            .send_message(&req)
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let searches = response
            .usage
            .server_tool_use
            .as_ref()
            .map_or(0, |u| u.web_search_requests);
        debug!(
            stop_reason = response.stop_reason.as_deref().unwrap_or("none"),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            searches,
            "agent responded"
        );
        if response.stop_reason.as_deref() == Some("max_tokens") {
            warn!("agent response hit max_tokens and may be truncated");
        }

        let text = response.final_text().ok_or(MalformedResponse::NoText)?;
        parse_answer(&text, &job.schema)
    }

    pub fn build_request(&self, job: &Job, current: Option<&Document>) -> MessagesRequest {
        MessagesRequest {
            model: job.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![Message::user(build_prompt(job, current))],
            tools: vec![Tool::web_search(job.max_searches)],
        }
    }
}

/// The user turn: instruction, expected shape, and what is already stored.
pub fn build_prompt(job: &Job, current: Option<&Document>) -> String {
    let (framing, guidance) = if job.schema.is_array() {
        (
            "a JSON array",
            "Only include entries that are not already present in the current contents.",
        )
    } else {
        (
            "a JSON object",
            "Return the complete, up-to-date object, keeping values that are still correct.",
        )
    };
    let current = match current {
        Some(doc) if !doc.is_empty() => {
            serde_json::to_string_pretty(&doc.to_value()).unwrap_or_default()
        }
        _ => "(empty: nothing stored yet)".to_string(),
    };

    format!(
        "{instruction}\n\n\
         Respond with ONLY {framing} with exactly this shape and no other text:\n\
         {shape}\n\n\
         Current contents of {path}:\n\
         {current}\n\n\
         {guidance}",
        instruction = job.instruction.trim(),
        shape = describe(&job.schema),
        path = job.file_path.display(),
    )
}

/// Parses the agent's answer. One enclosing markdown code fence is removed;
/// the content inside must be valid JSON as-is.
pub fn parse_answer(text: &str, schema: &Schema) -> Result<Value, AgentError> {
    let body = strip_code_fence(text.trim());
    let value: Value =
        serde_json::from_str(body).map_err(|e| MalformedResponse::NotJson(e.to_string()))?;
    check_shape(schema, &value).map_err(MalformedResponse::WrongShape)?;
    Ok(value)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return text;
    };
    match inner.split_once('\n') {
        Some((lang, body)) if lang.chars().all(|c| c.is_ascii_alphanumeric()) => body.trim(),
        _ => inner.trim(),
    }
}
