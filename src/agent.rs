//! Multi-turn agent that runs tools until the model answers in plain text.
//!
//! # Loop
//!
//! ```text
//! send(text)
//!     │
//!     ├─> append user message
//!     │
//!     └─> up to max_tool_iterations times:
//!           ├─> prune whole turns to context_token_limit (if set)
//!           ├─> request with the full history          [RequestInFlight]
//!           ├─> append assistant message
//!           ├─> no tool_use blocks?  → return text       [Done]
//!           ├─> no executor?         → Error::Config     [Failed]
//!           ├─> run every tool_use concurrently          [ToolExecutionPending]
//!           └─> append one tool_result message per tool_use, in order
//!
//!       exhausted → Error::IterationLimitExceeded            [Failed]
//! ```
//!
//! A failing tool does not end the turn: its error becomes a tool result
//! whose content starts with `"Error: "` and `is_error` is set, so the model
//! can react to it.
//!
//! # Interruption
//!
//! [`Agent::interrupt`] wakes the turn wherever it waits. A request in flight
//! is abandoned and nothing is appended for it. Tool execution is abandoned
//! too, and each of its tool calls is answered with an
//! `"Error: Operation interrupted"` result, so the history stays valid for the
//! next `send`. If every tool finished before the interrupt, their real results
//! are kept.
//!
//! # History consistency
//!
//! The conversation only ever receives whole messages, and the tool results
//! of one turn are appended in a single step. If `send` fails or its future
//! is dropped, the history reflects the last completed step.
//!
//! # Concurrency
//!
//! An agent advances one conversation. Concurrent `send` calls on the same
//! agent are serialized: the second waits until the first has finished.
//! Independent agents share nothing and never block each other.

use crate::client::Client;
use crate::conversation::Conversation;
use crate::interrupt::InterruptHandle;
use crate::tools::{ToolExecutor, ToolSet};
use crate::types::{AgentOptions, ContentBlock, Message, ToolResultBlock, ToolUseBlock};
use crate::{Error, Result};
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};

/// Where the agent is in its request/tool cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    AwaitingUserInput,
    RequestInFlight,
    ToolExecutionPending,
    Done,
    Failed,
}

/// Conversational agent with an optional tool executor.
pub struct Agent {
    client: Client,
    conversation: Conversation,
    executor: Option<Arc<dyn ToolExecutor>>,
    state: Mutex<AgentState>,
    send_gate: tokio::sync::Mutex<()>,
}

impl Agent {
    /// Create an agent over HTTP.
    ///
    /// Tools registered on `options` with handlers become the executor.
    pub fn new(options: AgentOptions) -> Result<Self> {
        Ok(Self::with_client(Client::new(options)?))
    }

    pub fn with_client(client: Client) -> Self {
        let tools = client.options().tools();
        let executor: Option<Arc<dyn ToolExecutor>> = if tools.is_empty() {
            None
        } else {
            Some(Arc::new(tools.iter().cloned().collect::<ToolSet>()))
        };

        Self {
            client,
            conversation: Conversation::new(),
            executor,
            state: Mutex::new(AgentState::AwaitingUserInput),
            send_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the tool executor.
    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Start from an existing conversation.
    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Copy of the conversation so far.
    pub fn history(&self) -> Vec<Message> {
        self.conversation.snapshot()
    }

    pub fn state(&self) -> AgentState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: AgentState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Stop the running `send`; it fails with [`Error::Interrupted`].
    pub fn interrupt(&self) {
        self.client.interrupt();
    }

    /// Handle for interrupting from another task. Shared with the client.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.client.interrupt_handle()
    }

    /// Send a user text and run the tool loop to a final answer.
    pub async fn send(&self, text: impl Into<String>) -> Result<String> {
        self.send_message(Message::user(text)).await
    }

    /// Send an arbitrary user message (for example one with images).
    pub async fn send_message(&self, message: Message) -> Result<String> {
        let _turn = self.send_gate.lock().await;
        self.client.clear_interrupt();

        self.conversation.append(message);
        let result = self.run().await;

        match &result {
            Ok(_) => self.set_state(AgentState::Done),
            Err(e) => {
                log::debug!("Agent turn failed: {}", e);
                self.set_state(AgentState::Failed);
            }
        }
        result
    }

    async fn run(&self) -> Result<String> {
        let options = self.client.options();
        let max_iterations = options.max_tool_iterations();

        for iteration in 1..=max_iterations {
            self.check_interrupt()?;

            if let Some(limit) = options.context_token_limit() {
                self.conversation.prune_whole_turns(limit);
            }

            self.set_state(AgentState::RequestInFlight);
            let response = self.client.send(self.conversation.snapshot()).await?;
            self.conversation.append(response.to_message());

            let tool_uses: Vec<ToolUseBlock> = response.tool_uses().into_iter().cloned().collect();
            if tool_uses.is_empty() {
                log::debug!("Final answer after {} iteration(s)", iteration);
                return Ok(response.text());
            }

            let Some(executor) = &self.executor else {
                let names: Vec<&str> = tool_uses.iter().map(|t| t.name.as_str()).collect();
                return Err(Error::config(format!(
                    "model requested tools but no tool executor is configured: {}",
                    names.join(", ")
                )));
            };

            self.set_state(AgentState::ToolExecutionPending);
            log::debug!(
                "Iteration {}/{}: executing {} tool call(s)",
                iteration,
                max_iterations,
                tool_uses.len()
            );

            let interrupt = self.client.interrupt_handle();
            let results: Vec<ToolResultBlock> = tokio::select! {
                biased;
                results = join_all(
                    tool_uses
                        .iter()
                        .map(|tool_use| execute_one(executor.as_ref(), tool_use)),
                ) => results,
                _ = interrupt.interrupted() => {
                    log::debug!("Tool execution interrupted");
                    tool_uses
                        .iter()
                        .map(|tool_use| {
                            ToolResultBlock::error(
                                &tool_use.id,
                                Error::Interrupted.as_tool_result_text(),
                            )
                        })
                        .collect()
                }
            };

            self.conversation.append_all(
                results
                    .into_iter()
                    .map(|r| Message::user_with_blocks(vec![ContentBlock::ToolResult(r)])),
            );
            self.check_interrupt()?;
        }

        Err(Error::IterationLimitExceeded {
            iterations: max_iterations,
        })
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.client.is_interrupted() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}

async fn execute_one(executor: &dyn ToolExecutor, tool_use: &ToolUseBlock) -> ToolResultBlock {
    match executor.execute(tool_use).await {
        Ok(content) => ToolResultBlock::new(&tool_use.id, content),
        Err(e) => {
            log::warn!("Tool '{}' ({}) failed: {}", tool_use.name, tool_use.id, e);
            ToolResultBlock::error(&tool_use.id, e.as_tool_result_text())
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("client", &self.client)
            .field("conversation", &self.conversation)
            .field("has_executor", &self.executor.is_some())
            .field("state", &self.state())
            .finish()
    }
}
