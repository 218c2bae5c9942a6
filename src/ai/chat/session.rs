//! A single client connection's chat session.
//!
//! A session relays at most one generation at a time. Submitting while
//! a response is still streaming is silently dropped (the UI disables
//! input while busy so this only happens with a misbehaving or racing
//! client). Each generation runs on its own task and can be stopped at
//! any point: while waiting on the provider, while forwarding to the
//! client or while pacing between fragments.
//!
//! State transitions:
//!
//! ```text
//! Idle -> Generating -> Completed | Failed | Cancelled -> Idle
//! ```
//!
//! Completed and Failed each send exactly one terminal event to the
//! client. Cancelled sends nothing since the client asked for it or is
//! already gone.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Error;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::openai::Message;

use super::models::{ChatRequest, GenerationRequest};
use super::provider::BoxedCompletionProvider;
use super::transport::ClientTransport;

/// The only error text a client ever sees. Details stay in the logs.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred while generating the response.";

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub system_prompt: Arc<str>,
    pub max_previous_conversations: usize,
    /// Minimum time between fragments forwarded to the client
    pub response_delay: Duration,
}

/// How a generation ended.
#[derive(Debug)]
pub enum Outcome {
    /// The provider finished. Holds the full response text.
    Completed(String),
    Failed(Error),
    Cancelled,
    /// The client could no longer be reached
    Disconnected(Error),
}

pub enum Submission {
    Started(JoinHandle<Outcome>),
    /// A generation was already in flight so the request was ignored
    Dropped,
}

/// Handle to the generation currently in flight.
struct StreamCursor {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SessionGuard {
    active: Option<StreamCursor>,
    generations: u64,
}

impl SessionGuard {
    fn owned_by(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|cursor| cursor.generation == generation)
    }
}

enum Delivery {
    Sent,
    /// The generation was stopped or superseded, nothing was sent
    Stale,
    /// The client could not be reached
    Failed(Error),
}

pub struct ChatSession {
    connection_id: Uuid,
    provider: BoxedCompletionProvider,
    transport: Arc<dyn ClientTransport>,
    settings: SessionSettings,
    guard: Mutex<SessionGuard>,
    span: Span,
}

impl ChatSession {
    pub fn new(
        connection_id: Uuid,
        provider: BoxedCompletionProvider,
        transport: Arc<dyn ClientTransport>,
        settings: SessionSettings,
    ) -> Self {
        let span = tracing::info_span!("chat_session", %connection_id);
        Self {
            connection_id,
            provider,
            transport,
            settings,
            guard: Mutex::new(SessionGuard::default()),
            span,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn is_generating(&self) -> bool {
        self.guard
            .lock()
            .expect("Unable to lock session guard")
            .active
            .is_some()
    }

    /// Start generating a response unless one is already in flight.
    pub fn submit(self: &Arc<Self>, request: ChatRequest) -> Submission {
        let _enter = self.span.enter();
        let cancel = CancellationToken::new();

        let generation = {
            let mut guard = self.guard.lock().expect("Unable to lock session guard");
            if guard.active.is_some() {
                tracing::debug!("Dropping submission, a response is already being generated");
                return Submission::Dropped;
            }
            guard.generations += 1;
            let generation = guard.generations;
            guard.active = Some(StreamCursor {
                generation,
                cancel: cancel.clone(),
            });
            generation
        };

        let request = GenerationRequest::new(request, self.settings.max_previous_conversations);
        let session = Arc::clone(self);
        let handle = tokio::spawn(
            async move {
                // Released even if the provider panics mid stream
                let _release = ReleaseOnDrop {
                    session: Arc::clone(&session),
                    generation,
                };
                session.generate(generation, request, cancel).await
            }
            .instrument(tracing::debug_span!("generation", generation)),
        );

        Submission::Started(handle)
    }

    /// Cancel the generation in flight, if any. The guard is released
    /// immediately so the next submission is accepted right away. Once
    /// this returns the stopped generation delivers nothing further.
    pub fn stop(&self) {
        let _enter = self.span.enter();
        let cursor = self
            .guard
            .lock()
            .expect("Unable to lock session guard")
            .active
            .take();

        if let Some(cursor) = cursor {
            tracing::debug!("Stopping generation {}", cursor.generation);
            cursor.cancel.cancel();
        }
    }

    // A cancelled generation finishes after `stop` already cleared the
    // guard, possibly after a newer generation took it
    fn release(&self, generation: u64) {
        let mut guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.owned_by(generation) {
            guard.active = None;
        }
    }

    /// Push an event to the client only if `generation` still owns the
    /// session. The guard is held across the push so a concurrent `stop`
    /// either happens entirely before it or entirely after it.
    fn deliver<F>(&self, generation: u64, terminal: bool, push: F) -> Delivery
    where
        F: FnOnce(&dyn ClientTransport) -> Result<(), Error>,
    {
        let mut guard = self.guard.lock().expect("Unable to lock session guard");
        if !guard.owned_by(generation) {
            return Delivery::Stale;
        }
        let result = push(self.transport.as_ref());
        // Free the session in the same step as the terminal event so a
        // client reacting to it is never dropped
        if terminal {
            guard.active = None;
        }
        match result {
            Ok(()) => Delivery::Sent,
            Err(e) => Delivery::Failed(e),
        }
    }

    async fn generate(
        &self,
        generation: u64,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Outcome {
        tracing::debug!(
            "Generating response with {} previous conversations",
            request.context_window.len()
        );
        let messages = request.messages(&self.settings.system_prompt);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Outcome::Cancelled,
            outcome = self.relay(generation, messages) => outcome,
        };

        let terminal = match &outcome {
            Outcome::Completed(_) => Some(self.deliver(generation, true, |t| t.notify_done())),
            Outcome::Failed(_) => Some(self.deliver(generation, true, |t| {
                t.notify_error(GENERIC_ERROR_MESSAGE)
            })),
            Outcome::Cancelled | Outcome::Disconnected(_) => None,
        };

        let outcome = match terminal {
            // A stop that lands between the last fragment and the
            // terminal event suppresses the terminal event
            Some(Delivery::Stale) => Outcome::Cancelled,
            Some(Delivery::Failed(e)) => {
                tracing::warn!("Failed to notify client of the result: {}", e);
                outcome
            }
            Some(Delivery::Sent) | None => outcome,
        };

        match &outcome {
            Outcome::Completed(text) => tracing::debug!("Response complete ({} bytes)", text.len()),
            Outcome::Failed(e) => {
                tracing::error!("Something went wrong generating a response: {:#}", e)
            }
            Outcome::Cancelled => tracing::debug!("Generation cancelled"),
            Outcome::Disconnected(e) => {
                tracing::debug!("Client went away during generation: {}", e)
            }
        }

        outcome
    }

    /// Forward fragments in the order they are produced. Consecutive
    /// fragments are spaced at least `response_delay` apart, no delay
    /// is added after the last one.
    async fn relay(&self, generation: u64, messages: Vec<Message>) -> Outcome {
        let delay = self.settings.response_delay;
        let mut fragments = self.provider.stream_completion(messages);
        let mut text = String::new();
        let mut last_sent: Option<Instant> = None;

        while let Some(fragment) = fragments.next().await {
            let fragment = match fragment {
                Ok(fragment) => fragment,
                Err(e) => return Outcome::Failed(e),
            };

            if let Some(last_sent) = last_sent
                && !delay.is_zero()
            {
                sleep_until(last_sent + delay).await;
            }

            match self.deliver(generation, false, |t| t.send(&fragment)) {
                Delivery::Sent => {}
                Delivery::Stale => return Outcome::Cancelled,
                Delivery::Failed(e) => return Outcome::Disconnected(e),
            }
            last_sent = Some(Instant::now());
            text.push_str(&fragment);
        }

        Outcome::Completed(text)
    }
}

struct ReleaseOnDrop {
    session: Arc<ChatSession>,
    generation: u64,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.session.release(self.generation);
    }
}
