//! Reconstruction of a complete response from stream events.
//!
//! [`StreamAssembler`] consumes events strictly in arrival order. It serves
//! two purposes at once:
//!
//! 1. **Forwarding**: [`StreamAssembler::push`] returns the text fragment of
//!    every text delta so a caller can render it immediately.
//! 2. **Reconstruction**: one buffer is kept for the content block currently
//!    being streamed. The buffer is flushed into the content list when a
//!    block with a higher index starts or receives a delta, when its
//!    `content_block_stop` arrives, and at [`StreamAssembler::finish`].
//!
//! ```text
//! message_start            -> id, model, role, initial usage
//! content_block_start  #0  -> open text buffer #0
//! content_block_delta  #0  -> append "Hel", forward "Hel"
//! content_block_delta  #0  -> append "lo",  forward "lo"
//! content_block_start  #1  -> flush #0 as Text("Hello"), open tool buffer #1
//! content_block_delta  #1  -> append partial JSON
//! content_block_stop   #1  -> flush #1 as ToolUse(input = parsed JSON)
//! message_delta            -> stop reason, usage
//! message_stop             -> usage (overrides earlier)
//! ```
//!
//! `finish` yields `None` unless both a `message_start` and a terminal usage
//! report were seen; an incomplete stream never produces a response with
//! invented fields.

use crate::events::StreamEvent;
use crate::types::{
    AssembledResponse, ContentBlock, Role, StopReason, TextBlock, ToolUseBlock, Usage,
    UsageDelta,
};
use serde_json::Value;

/// Identity of the message, taken from `message_start`
#[derive(Debug, Clone)]
struct MessageHeader {
    id: String,
    model: String,
    role: Role,
    usage: Usage,
}

/// The content block currently being streamed
#[derive(Debug)]
struct PendingBlock {
    index: usize,
    kind: PendingKind,
}

#[derive(Debug)]
enum PendingKind {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        initial_input: Value,
        json: String,
    },
}

/// Incremental assembler for one streamed response.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    header: Option<MessageHeader>,
    content: Vec<ContentBlock>,
    pending: Option<PendingBlock>,
    /// Highest block index flushed so far
    last_flushed: Option<usize>,
    stop_reason: Option<StopReason>,
    final_usage: Option<UsageDelta>,
    errors: Vec<String>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event. Returns the text fragment to forward, if the event is a
    /// text delta.
    pub fn push(&mut self, event: StreamEvent) -> Option<String> {
        match event {
            StreamEvent::MessageStart {
                id,
                model,
                role,
                usage,
            } => {
                self.header = Some(MessageHeader {
                    id,
                    model,
                    role,
                    usage,
                });
                None
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                if !self.advance_to(index) {
                    return None;
                }
                self.open(index, content_block);
                None
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                if !self.advance_to(index) {
                    return None;
                }

                let pending = self.pending.get_or_insert_with(|| PendingBlock {
                    index,
                    kind: PendingKind::Text(String::new()),
                });

                match &mut pending.kind {
                    PendingKind::Text(buffer) => {
                        if let Some(text) = &delta.text {
                            buffer.push_str(text);
                        }
                    }
                    PendingKind::ToolUse { json, .. } => {
                        if let Some(partial) = &delta.partial_json {
                            json.push_str(partial);
                        }
                    }
                }

                delta.text
            }
            StreamEvent::ContentBlockStop { index } => {
                if self.pending.as_ref().is_some_and(|p| p.index == index) {
                    self.flush();
                }
                None
            }
            StreamEvent::MessageDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                if usage.is_some() {
                    self.final_usage = usage;
                }
                None
            }
            StreamEvent::MessageStop { usage } => {
                if usage.is_some() {
                    self.final_usage = usage;
                }
                None
            }
            StreamEvent::Ping => None,
            StreamEvent::Error { message } => {
                log::warn!("Skipping undecodable stream event: {}", message);
                self.errors.push(message);
                None
            }
        }
    }

    /// Error events seen so far, in arrival order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Flush remaining state and build the response.
    ///
    /// Returns `None` if no `message_start` was observed or no terminal usage
    /// was ever recorded.
    pub fn finish(mut self) -> Option<AssembledResponse> {
        self.flush();

        let header = self.header?;
        let usage = self.final_usage?.merge_onto(&header.usage);

        Some(AssembledResponse {
            id: header.id,
            model: header.model,
            role: header.role,
            content: self.content,
            stop_reason: self.stop_reason,
            usage,
        })
    }

    /// Move the cursor to `index`, flushing the pending block if `index` is
    /// past it. Returns `false` for an index that went backwards.
    fn advance_to(&mut self, index: usize) -> bool {
        if let Some(pending) = &self.pending {
            if index == pending.index {
                return true;
            }
            if index < pending.index {
                log::warn!(
                    "Dropping event for content block {} while block {} is open",
                    index,
                    pending.index
                );
                return false;
            }
            self.flush();
        }

        if self.last_flushed.is_some_and(|last| index <= last) {
            log::warn!(
                "Dropping event for content block {} which was already completed",
                index
            );
            return false;
        }
        true
    }

    fn open(&mut self, index: usize, block: ContentBlock) {
        let kind = match block {
            ContentBlock::Text(TextBlock { text }) => PendingKind::Text(text),
            ContentBlock::ToolUse(ToolUseBlock { id, name, input }) => PendingKind::ToolUse {
                id,
                name,
                initial_input: input,
                json: String::new(),
            },
            complete => {
                // Images and tool results arrive whole.
                self.content.push(complete);
                self.last_flushed = Some(index);
                return;
            }
        };
        self.pending = Some(PendingBlock { index, kind });
    }

    fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        self.last_flushed = Some(pending.index);

        match pending.kind {
            PendingKind::Text(text) => {
                if !text.is_empty() {
                    log::debug!("Flushed text block {} ({} bytes)", pending.index, text.len());
                    self.content.push(ContentBlock::Text(TextBlock::new(text)));
                }
            }
            PendingKind::ToolUse {
                id,
                name,
                initial_input,
                json,
            } => {
                let input = if json.trim().is_empty() {
                    initial_input
                } else {
                    match serde_json::from_str(&json) {
                        Ok(input) => input,
                        Err(e) => {
                            log::warn!("Tool input for '{}' ({}) is not valid JSON: {}", name, id, e);
                            self.errors
                                .push(format!("invalid tool input JSON for {}: {}", id, e));
                            initial_input
                        }
                    }
                };
                log::debug!("Flushed tool_use block {} ({})", pending.index, name);
                self.content
                    .push(ContentBlock::ToolUse(ToolUseBlock::new(id, name, input)));
            }
        }
    }
}

/// Rebuild a complete response from an ordered event sequence.
pub fn assemble<I>(events: I) -> Option<AssembledResponse>
where
    I: IntoIterator<Item = StreamEvent>,
{
    let mut assembler = StreamAssembler::new();
    for event in events {
        assembler.push(event);
    }
    assembler.finish()
}
