//! Stream event decoding.
//!
//! A streaming response is a sequence of Server-Sent-Events lines:
//!
//! ```text
//! event: message_start
//! data: {"type":"message_start","message":{"id":"msg_1","model":"m","role":"assistant","usage":{"input_tokens":10,"output_tokens":1}}}
//!
//! data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}
//!
//! data: [DONE]
//! ```
//!
//! Only `data: ` lines matter. Each payload is a JSON object whose `type`
//! field selects a decoder from [`DECODERS`]. A payload that cannot be decoded
//! becomes [`StreamEvent::Error`] so one bad line never aborts the stream.
//!
//! Decoding is a pure function of the line: [`decode_line`] holds no state
//! between calls.

use crate::types::{ContentBlock, Role, StopReason, Usage, UsageDelta};
use serde::Deserialize;
use serde_json::Value;

/// Prefix of every line that carries an event payload
pub const DATA_PREFIX: &str = "data: ";

/// Payload that marks normal end-of-stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// A typed stream event, in wire arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    MessageStart {
        id: String,
        model: String,
        role: Role,
        usage: Usage,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        stop_reason: Option<StopReason>,
        usage: Option<UsageDelta>,
    },
    MessageStop {
        usage: Option<UsageDelta>,
    },
    Ping,
    /// A line that could not be decoded, or an `error` event from the service
    Error {
        message: String,
    },
}

impl StreamEvent {
    /// Text fragment carried by a text delta, if any.
    pub fn text_fragment(&self) -> Option<&str> {
        match self {
            StreamEvent::ContentBlockDelta { delta, .. } => delta.text.as_deref(),
            _ => None,
        }
    }

    /// Whether this event ends the message.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::MessageStop { .. })
    }
}

/// Incremental change to one content block
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentDelta {
    /// Delta discriminator, e.g. `text_delta` or `input_json_delta`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub partial_json: Option<String>,
}

impl ContentDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text_delta".to_string(),
            text: Some(text.into()),
            partial_json: None,
        }
    }

    pub fn input_json(partial_json: impl Into<String>) -> Self {
        Self {
            kind: "input_json_delta".to_string(),
            text: None,
            partial_json: Some(partial_json.into()),
        }
    }
}

/// Outcome of decoding a single line
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// Not an event line (blank, comment, `event:`, `retry:`, ...)
    Skip,
    /// The `[DONE]` sentinel; the reader should stop
    Done,
    Event(StreamEvent),
}

/// Decodes one event payload selected by its `type` discriminator
pub type Decoder = fn(Value) -> serde_json::Result<StreamEvent>;

/// Discriminator → decoder table
pub const DECODERS: &[(&str, Decoder)] = &[
    ("message_start", decode_message_start),
    ("content_block_start", decode_content_block_start),
    ("content_block_delta", decode_content_block_delta),
    ("content_block_stop", decode_content_block_stop),
    ("message_delta", decode_message_delta),
    ("message_stop", decode_message_stop),
    ("ping", decode_ping),
    ("error", decode_error),
];

/// Decode one line of SSE text.
pub fn decode_line(line: &str) -> SseLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return SseLine::Skip;
    };

    if payload.trim() == DONE_SENTINEL {
        return SseLine::Done;
    }

    SseLine::Event(decode_payload(payload))
}

/// Decode a JSON event payload (the part after `data: `).
pub fn decode_payload(payload: &str) -> StreamEvent {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            return StreamEvent::Error {
                message: format!("invalid event JSON: {}", e),
            };
        }
    };

    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return StreamEvent::Error {
            message: "event payload has no \"type\" field".to_string(),
        };
    };

    match DECODERS.iter().find(|(name, _)| *name == kind) {
        Some((_, decode)) => decode(value).unwrap_or_else(|e| StreamEvent::Error {
            message: format!("malformed {} event: {}", kind, e),
        }),
        None => StreamEvent::Error {
            message: format!("unknown event type: {}", kind),
        },
    }
}

#[derive(Deserialize)]
struct MessageStartWire {
    message: MessageStartBody,
}

#[derive(Deserialize)]
struct MessageStartBody {
    id: String,
    model: String,
    role: Role,
    #[serde(default)]
    usage: Usage,
}

fn decode_message_start(value: Value) -> serde_json::Result<StreamEvent> {
    let wire: MessageStartWire = serde_json::from_value(value)?;
    Ok(StreamEvent::MessageStart {
        id: wire.message.id,
        model: wire.message.model,
        role: wire.message.role,
        usage: wire.message.usage,
    })
}

#[derive(Deserialize)]
struct ContentBlockStartWire {
    index: usize,
    content_block: ContentBlock,
}

fn decode_content_block_start(value: Value) -> serde_json::Result<StreamEvent> {
    let wire: ContentBlockStartWire = serde_json::from_value(value)?;
    Ok(StreamEvent::ContentBlockStart {
        index: wire.index,
        content_block: wire.content_block,
    })
}

#[derive(Deserialize)]
struct ContentBlockDeltaWire {
    index: usize,
    delta: ContentDelta,
}

fn decode_content_block_delta(value: Value) -> serde_json::Result<StreamEvent> {
    let wire: ContentBlockDeltaWire = serde_json::from_value(value)?;
    Ok(StreamEvent::ContentBlockDelta {
        index: wire.index,
        delta: wire.delta,
    })
}

#[derive(Deserialize)]
struct IndexWire {
    index: usize,
}

fn decode_content_block_stop(value: Value) -> serde_json::Result<StreamEvent> {
    let wire: IndexWire = serde_json::from_value(value)?;
    Ok(StreamEvent::ContentBlockStop { index: wire.index })
}

#[derive(Deserialize)]
struct MessageDeltaWire {
    #[serde(default)]
    delta: MessageDeltaBody,
    #[serde(default)]
    usage: Option<UsageDelta>,
}

#[derive(Deserialize, Default)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<StopReason>,
}

fn decode_message_delta(value: Value) -> serde_json::Result<StreamEvent> {
    let wire: MessageDeltaWire = serde_json::from_value(value)?;
    Ok(StreamEvent::MessageDelta {
        stop_reason: wire.delta.stop_reason,
        usage: wire.usage,
    })
}

// Usage may be absent, top-level, or nested under `message.usage`.
fn decode_message_stop(value: Value) -> serde_json::Result<StreamEvent> {
    let usage = value
        .get("usage")
        .or_else(|| value.pointer("/message/usage"))
        .filter(|u| !u.is_null())
        .cloned()
        .map(serde_json::from_value::<UsageDelta>)
        .transpose()?;
    Ok(StreamEvent::MessageStop { usage })
}

fn decode_ping(_value: Value) -> serde_json::Result<StreamEvent> {
    Ok(StreamEvent::Ping)
}

#[derive(Deserialize)]
struct ErrorWire {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    message: String,
}

fn decode_error(value: Value) -> serde_json::Result<StreamEvent> {
    let wire: ErrorWire = serde_json::from_value(value)?;
    let message = match wire.error.kind {
        Some(kind) => format!("{}: {}", kind, wire.error.message),
        None => wire.error.message,
    };
    Ok(StreamEvent::Error { message })
}
