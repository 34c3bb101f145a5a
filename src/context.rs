//! Token estimation and context-window pruning.
//!
//! Estimates are deliberately rough. Text costs about one token per four
//! characters; images and tool blocks cost fixed amounts because their real
//! cost depends on the model and is not known locally.
//!
//! Pruning removes the **oldest** messages first. Once a conversation exceeds
//! its limit it is cut back to [`PRUNE_TARGET_PERCENT`] of the limit, so it
//! does not hover at the edge and prune again on every turn. The most recent
//! message always survives.
//!
//! ```rust
//! use messages_sdk::{estimate_tokens, Message};
//!
//! let history = vec![Message::user("x".repeat(400))];
//! assert_eq!(estimate_tokens(&history), 100);
//! ```

use crate::types::{ContentBlock, Message, Role};

/// Estimated cost of one image block
pub const IMAGE_BLOCK_TOKENS: usize = 1000;

/// Estimated cost of one tool-use or tool-result block
pub const TOOL_BLOCK_TOKENS: usize = 100;

/// After pruning, a conversation fits in this share of the limit
pub const PRUNE_TARGET_PERCENT: usize = 80;

/// Assigns an approximate token cost to messages.
pub trait TokenEstimator: Send + Sync {
    fn message_tokens(&self, message: &Message) -> usize;

    fn estimate(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.message_tokens(m)).sum()
    }
}

/// Character-count heuristic with fixed costs for non-text blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicEstimator {
    pub image_tokens: usize,
    pub tool_block_tokens: usize,
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self {
            image_tokens: IMAGE_BLOCK_TOKENS,
            tool_block_tokens: TOOL_BLOCK_TOKENS,
        }
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn message_tokens(&self, message: &Message) -> usize {
        message
            .blocks()
            .iter()
            .map(|block| match block {
                ContentBlock::Text(text) => text.text.chars().count().div_ceil(4),
                ContentBlock::Image(_) => self.image_tokens,
                ContentBlock::ToolUse(_) | ContentBlock::ToolResult(_) => self.tool_block_tokens,
            })
            .sum()
    }
}

/// Estimate the token cost of a message list with the default heuristic.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    HeuristicEstimator::default().estimate(messages)
}

/// Whether the estimated cost exceeds `margin` (0.0-1.0) of `limit`.
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}

/// Token count a pruned conversation must fit in.
pub fn prune_target(limit: usize) -> usize {
    limit.saturating_mul(PRUNE_TARGET_PERCENT) / 100
}

/// Number of leading (oldest) messages to drop so the rest fits the budget.
///
/// Returns 0 when the conversation is within `limit`. Otherwise messages are
/// dropped oldest first until the remainder is at or under
/// [`prune_target`]`(limit)`, never dropping more than `len - 1`.
pub fn prune_count(messages: &[Message], limit: usize, estimator: &dyn TokenEstimator) -> usize {
    let costs: Vec<usize> = messages.iter().map(|m| estimator.message_tokens(m)).collect();
    let mut remaining: usize = costs.iter().sum();

    if remaining <= limit {
        return 0;
    }

    let target = prune_target(limit);
    let max_removable = messages.len().saturating_sub(1);
    let mut removed = 0;

    while remaining > target && removed < max_removable {
        remaining -= costs[removed];
        removed += 1;
    }

    removed
}

/// Whether a request history may begin with `message`: a user message that
/// answers no tool call.
pub fn starts_turn(message: &Message) -> bool {
    message.role == Role::User
        && !message
            .blocks()
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolResult(_)))
}

/// Like [`prune_count`], but only cuts where a user turn begins, so a tool
/// result never outlives the tool call it answers.
///
/// The cut moves forward to the next turn start. If there is none, it moves
/// back to the nearest earlier one instead, keeping more than the target.
pub fn prune_count_at_turn(
    messages: &[Message],
    limit: usize,
    estimator: &dyn TokenEstimator,
) -> usize {
    let cut = prune_count(messages, limit, estimator);
    if cut == 0 {
        return 0;
    }

    (cut..messages.len())
        .find(|&i| starts_turn(&messages[i]))
        .or_else(|| (0..cut).rev().find(|&i| starts_turn(&messages[i])))
        .unwrap_or(0)
}
