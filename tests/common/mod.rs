//! Shared test doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use messages_sdk::{
    AgentOptions, ByteStream, Client, ContentBlock, Error, MessageResponse, MessagesRequest,
    Result, Role, StopReason, ToolUseBlock, Transport, Usage,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Transport that replays canned responses in order and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<MessageResponse>>>,
    streams: Mutex<VecDeque<Vec<Vec<u8>>>>,
    requests: Mutex<Vec<MessagesRequest>>,
    /// Response returned once the script is exhausted
    fallback: Option<MessageResponse>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<MessageResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    /// Answer every request with the same response.
    pub fn repeating(response: MessageResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Default::default()
        }
    }

    pub fn push_error(&self, error: Error) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Queue a streamed body, delivered as the given chunks.
    pub fn push_stream(&self, chunks: Vec<Vec<u8>>) {
        self.streams.lock().unwrap().push_back(chunks);
    }

    pub fn requests(&self) -> Vec<MessagesRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &MessagesRequest) -> Result<MessageResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(Error::other("script exhausted")),
        }
    }

    async fn open_stream(&self, request: &MessagesRequest) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(request.clone());
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::other("no stream scripted"))?;
        let items: Vec<Result<Bytes>> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

pub fn options() -> AgentOptions {
    AgentOptions::builder()
        .model("test-model")
        .system_prompt("You are a test assistant.")
        .build()
        .unwrap()
}

pub fn client_with(options: AgentOptions, transport: Arc<ScriptedTransport>) -> Client {
    Client::with_transport(options, transport)
}

fn response(id: &str, content: Vec<ContentBlock>, stop_reason: StopReason) -> MessageResponse {
    MessageResponse {
        id: id.to_string(),
        model: "test-model".to_string(),
        role: Role::Assistant,
        content,
        stop_reason: Some(stop_reason),
        usage: Usage::new(10, 5),
    }
}

pub fn text_response(text: &str) -> MessageResponse {
    response("msg_text", vec![ContentBlock::text(text)], StopReason::EndTurn)
}

pub fn tool_response(calls: &[(&str, &str, Value)]) -> MessageResponse {
    let content = calls
        .iter()
        .map(|(id, name, input)| ContentBlock::ToolUse(ToolUseBlock::new(*id, *name, input.clone())))
        .collect();
    response("msg_tool", content, StopReason::ToolUse)
}

/// SSE lines for a plain text answer streamed as the given fragments.
pub fn sse_text_body(fragments: &[&str]) -> String {
    let mut body = String::from(
        "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_s\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"test-model\",\"content\":[],\"usage\":{\"input_tokens\":12,\"output_tokens\":1}}}\n\n",
    );
    body.push_str("data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n");
    body.push_str("data: {\"type\":\"ping\"}\n\n");
    for fragment in fragments {
        let delta = serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": fragment}
        });
        body.push_str(&format!("event: content_block_delta\ndata: {}\n\n", delta));
    }
    body.push_str("data: {\"type\":\"content_block_stop\",\"index\":0}\n\n");
    body.push_str("data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\",\"stop_sequence\":null},\"usage\":{\"output_tokens\":7}}\n\n");
    body.push_str("data: {\"type\":\"message_stop\"}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

/// Split `body` into chunks of `size` bytes (the last may be shorter).
pub fn chunked(body: &str, size: usize) -> Vec<Vec<u8>> {
    body.as_bytes().chunks(size).map(<[u8]>::to_vec).collect()
}
