//! Builds the transcript sent upstream for each submission.
use crate::openai::{Message, Role};

use super::models::{Exchange, GenerationRequest};

/// Keep the `max_previous` most recent exchanges in chronological order.
pub fn context_window(history: Vec<Exchange>, max_previous: usize) -> Vec<Exchange> {
    let mut window: Vec<Exchange> = history.into_iter().rev().take(max_previous).collect();
    window.reverse();
    window
}

/// Build the ordered messages for a completion: the system prompt,
/// then the last `max_previous` exchanges oldest first, then the new
/// input.
pub fn build(
    system_prompt: &str,
    history: &[Exchange],
    max_previous: usize,
    new_input: &str,
) -> Vec<Message> {
    let start = history.len().saturating_sub(max_previous);
    let window = &history[start..];

    let mut messages = Vec::with_capacity(window.len() * 2 + 2);
    messages.push(Message::new(Role::System, system_prompt));

    for exchange in window {
        messages.push(Message::new(Role::User, &exchange.user_message));
        // An exchange still awaiting its response only contributes the
        // user's side
        if let Some(response) = &exchange.assistant_response {
            messages.push(Message::new(Role::Assistant, response));
        }
    }

    messages.push(Message::new(Role::User, new_input));
    messages
}

impl GenerationRequest {
    /// Messages for this request. The window was already truncated when
    /// the request was built.
    pub fn messages(&self, system_prompt: &str) -> Vec<Message> {
        build(
            system_prompt,
            &self.context_window,
            self.context_window.len(),
            &self.input,
        )
    }
}
