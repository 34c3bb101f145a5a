//! Ordered, append-only message history shared by the agent loop.

use crate::context::{
    HeuristicEstimator, TokenEstimator, prune_count, prune_count_at_turn, prune_target,
};
use crate::types::Message;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Conversation history with serialized mutation.
///
/// Every operation takes the lock once, so a batch appended with
/// [`append_all`](Conversation::append_all) is never interleaved with other
/// writes, and [`snapshot`](Conversation::snapshot) always returns a copy
/// that later appends cannot change.
pub struct Conversation {
    messages: Mutex<Vec<Message>>,
    estimator: Arc<dyn TokenEstimator>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_estimator(Arc::new(HeuristicEstimator::default()))
    }

    /// Use a custom token estimator for [`prune_to_budget`](Self::prune_to_budget).
    pub fn with_estimator(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            estimator,
        }
    }

    /// Start from an existing history.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let conversation = Self::new();
        conversation.append_all(messages);
        conversation
    }

    // A panic while holding the lock cannot leave a half-written message,
    // so the data is still consistent.
    fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, message: Message) {
        self.lock().push(message);
    }

    /// Append several messages as one step.
    pub fn append_all(&self, messages: impl IntoIterator<Item = Message>) {
        self.lock().extend(messages);
    }

    /// Copy of the current history.
    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().clone()
    }

    /// Drop the oldest messages if the estimated cost exceeds `token_limit`.
    /// Returns how many were removed.
    pub fn prune_to_budget(&self, token_limit: usize) -> usize {
        self.prune_with(token_limit, prune_count)
    }

    /// Like [`prune_to_budget`](Self::prune_to_budget), but the kept history
    /// always starts at a user turn, never at a tool result or an assistant
    /// message.
    pub fn prune_whole_turns(&self, token_limit: usize) -> usize {
        self.prune_with(token_limit, prune_count_at_turn)
    }

    fn prune_with(
        &self,
        token_limit: usize,
        count: fn(&[Message], usize, &dyn TokenEstimator) -> usize,
    ) -> usize {
        let mut messages = self.lock();
        let removed = count(&messages, token_limit, self.estimator.as_ref());
        if removed > 0 {
            messages.drain(..removed);
            log::debug!(
                "Pruned {} oldest messages to fit {} tokens ({} left)",
                removed,
                token_limit,
                messages.len()
            );
        }

        let remaining = self.estimator.estimate(&messages);
        if remaining > token_limit || (removed > 0 && remaining > prune_target(token_limit)) {
            log::warn!(
                "Pruning could not reach the target for {} tokens: {} message(s) still cost ~{}",
                token_limit,
                messages.len(),
                remaining
            );
        }
        removed
    }

    pub fn estimated_tokens(&self) -> usize {
        self.estimator.estimate(&self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("messages", &self.len())
            .finish()
    }
}
