#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sentinel_searcher::agent::AgentClient;
use sentinel_searcher::anthropic::types::{ContentBlock, Usage};
use sentinel_searcher::anthropic::{AnthropicError, MessageSender, MessagesRequest, MessagesResponse};
use sentinel_searcher::runner::{JobRunner, Pause};

/// What the fake provider answers to the next request.
pub enum Reply {
    Text(String),
    Status(u16),
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

/// Answers requests from a fixed script, in order, and records them.
pub struct ScriptedSender {
    replies: Mutex<VecDeque<Reply>>,
    pub requests: Mutex<Vec<MessagesRequest>>,
}

impl ScriptedSender {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn prompt(&self, idx: usize) -> String {
        self.requests.lock().unwrap()[idx].messages[0].content.clone()
    }
}

impl MessageSender for ScriptedSender {
    async fn send_message(&self, req: &MessagesRequest) -> Result<MessagesResponse, AnthropicError> {
        self.requests.lock().unwrap().push(req.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left");
        match reply {
            Reply::Text(text) => Ok(MessagesResponse {
                id: "msg_test".into(),
                content: vec![ContentBlock {
                    content_type: "text".into(),
                    text,
                }],
                model: req.model.clone(),
                stop_reason: Some("end_turn".into()),
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 10,
                    server_tool_use: None,
                },
            }),
            Reply::Status(429) => Err(AnthropicError::RateLimited {
                retry_after_ms: 1000,
            }),
            Reply::Status(status) => Err(AnthropicError::ApiError {
                status,
                message: "scripted failure".into(),
            }),
        }
    }
}

/// Counts suspensions instead of sleeping.
#[derive(Default)]
pub struct CountingPause {
    count: AtomicUsize,
    pub durations: Mutex<Vec<Duration>>,
}

impl CountingPause {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Pause for &CountingPause {
    async fn pause(&self, duration: Duration) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.durations.lock().unwrap().push(duration);
    }
}

pub const DELAY: Duration = Duration::from_secs(60);

pub fn runner<'a>(
    sender: &'a ScriptedSender,
    pause: &'a CountingPause,
) -> JobRunner<&'a ScriptedSender, &'a CountingPause> {
    JobRunner::new(AgentClient::new(sender, 4096), DELAY).with_pause(pause)
}
