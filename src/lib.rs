//! # Messages SDK
//!
//! Async client for chat-style messages APIs that stream their responses as
//! server-sent events.
//!
//! ## Key Features
//!
//! - **Streaming**: SSE decoding that survives chunk boundaries, live text
//!   fragments, and reconstruction of the complete response
//! - **Typed content model**: text, image, tool-use and tool-result blocks
//!   that serialize to the exact wire shape
//! - **Tool loop**: an [`Agent`] that runs requested tools and feeds results
//!   back until the model answers in plain text, bounded by an iteration limit
//! - **Context pruning**: drops the oldest history to stay within a token budget
//! - **Interrupts**: cancel streams and agent turns from another task
//! - **Retry helpers**: opt-in exponential backoff with jitter
//!
//! ## Three Ways In
//!
//! ### 1. One-shot streaming with [`query()`]
//!
//! ```rust,no_run
//! use messages_sdk::{query, AgentOptions};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AgentOptions::builder()
//!         .system_prompt("You are a helpful assistant")
//!         .model("claude-sonnet-4-5")
//!         .api_key(std::env::var("MESSAGES_SDK_API_KEY")?)
//!         .build()?;
//!
//!     let mut stream = query("What's the capital of France?", &options).await?;
//!     while let Some(fragment) = stream.next().await {
//!         print!("{}", fragment?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### 2. Single requests with [`Client`]
//!
//! ```rust,no_run
//! use messages_sdk::{AgentOptions, Client, Message};
//!
//! # async fn example() -> messages_sdk::Result<()> {
//! let client = Client::new(AgentOptions::builder().model("claude-sonnet-4-5").build()?)?;
//! let response = client.send(vec![Message::user("Hello")]).await?;
//! println!("{} ({} output tokens)", response.text(), response.usage.output_tokens);
//! # Ok(())
//! # }
//! ```
//!
//! ### 3. Conversations with tools via [`Agent`]
//!
//! ```rust,no_run
//! use messages_sdk::{Agent, AgentOptions, tool};
//! use serde_json::json;
//!
//! # async fn example() -> messages_sdk::Result<()> {
//! let calculator = tool("multiply", "Multiply two numbers")
//!     .param("a", "number")
//!     .param("b", "number")
//!     .build(|args| async move {
//!         let a = args["a"].as_f64().unwrap_or(0.0);
//!         let b = args["b"].as_f64().unwrap_or(0.0);
//!         Ok(json!(a * b))
//!     });
//!
//! let agent = Agent::new(
//!     AgentOptions::builder()
//!         .model("claude-sonnet-4-5")
//!         .tool(calculator)
//!         .build()?,
//! )?;
//!
//! let answer = agent.send("What is 6 times 7?").await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **types**: content model, request/response bodies, options
//! - **events**: one SSE line → one [`StreamEvent`]
//! - **sse**: byte chunks → lines → events, with end-of-stream detection
//! - **assembler**: events → [`MessageResponse`]
//! - **transport**: the HTTP seam
//! - **client**: requests and [`ResponseStream`]
//! - **interrupt**: [`InterruptHandle`], cancellation that wakes waiting tasks
//! - **tools**: [`ToolExecutor`] and closure-backed [`Tool`]s
//! - **context** / **conversation**: token estimates, pruning, history
//! - **agent**: the tool loop
//! - **config**, **retry**, **error**: ambient helpers

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

mod agent;
mod assembler;
mod client;
mod context;
mod conversation;
mod error;
mod events;
mod interrupt;
mod sse;
mod tools;
mod transport;
mod types;

/// Environment-variable configuration helpers.
pub mod config;

/// Retry utilities with exponential backoff and jitter.
pub mod retry;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Agent and Client ---

pub use agent::{Agent, AgentState};
pub use client::{Client, ResponseStream, query};
pub use interrupt::InterruptHandle;
pub use transport::{API_VERSION, HttpTransport, Transport};

// --- Streaming ---

pub use assembler::{StreamAssembler, assemble};
pub use events::{
    ContentDelta, DATA_PREFIX, DECODERS, DONE_SENTINEL, Decoder, SseLine, StreamEvent,
    decode_line, decode_payload,
};
pub use sse::{ByteStream, EventStream, TextStream, body_stream, decode_stream};

// --- Context Management ---

pub use context::{
    HeuristicEstimator, IMAGE_BLOCK_TOKENS, PRUNE_TARGET_PERCENT, TOOL_BLOCK_TOKENS,
    TokenEstimator, estimate_tokens, is_approaching_limit, prune_count, prune_count_at_turn,
    prune_target, starts_turn,
};
pub use conversation::Conversation;

// --- Configuration ---

pub use config::{get_api_key, get_base_url, get_model};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Tool System ---

pub use tools::{Tool, ToolBuilder, ToolExecutor, ToolHandler, ToolSet, tool};

// --- Core Types ---

pub use types::{
    AgentOptions, AgentOptionsBuilder, AssembledResponse, ContentBlock, DEFAULT_BASE_URL,
    DEFAULT_MAX_TOKENS, DEFAULT_MAX_TOOL_ITERATIONS, ImageBlock, ImageSource, InputSchema,
    Message, MessageContent, MessageResponse, MessagesRequest, PropertySchema, Role, StopReason,
    TextBlock, ToolDefinition, ToolResultBlock, ToolUseBlock, Usage, UsageDelta,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The most commonly used types and functions.
///
/// Import with `use messages_sdk::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Agent, AgentOptions, AgentOptionsBuilder, Client, ContentBlock, Error, Message,
        MessageResponse, Result, StreamEvent, TextBlock, Tool, ToolExecutor, ToolUseBlock, query,
        tool,
    };
}
