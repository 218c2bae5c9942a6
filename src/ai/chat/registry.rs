//! Live chat sessions keyed by connection.
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use super::provider::BoxedCompletionProvider;
use super::session::{ChatSession, SessionSettings};
use super::transport::ClientTransport;

/// Tracks one `ChatSession` per open connection. Entries are created
/// on connect and removed (and stopped) on disconnect.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, Arc<ChatSession>>>,
    provider: BoxedCompletionProvider,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(provider: BoxedCompletionProvider, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            provider,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn provider(&self) -> BoxedCompletionProvider {
        Arc::clone(&self.provider)
    }

    /// Register a new connection and return its session.
    pub fn connect(&self, transport: Arc<dyn ClientTransport>) -> Arc<ChatSession> {
        let connection_id = Uuid::new_v4();
        let session = Arc::new(ChatSession::new(
            connection_id,
            Arc::clone(&self.provider),
            transport,
            self.settings.clone(),
        ));
        self.sessions.insert(connection_id, Arc::clone(&session));
        session
    }

    /// Remove a connection, cancelling anything it had in flight.
    /// Unknown ids are ignored.
    pub fn disconnect(&self, connection_id: &Uuid) {
        if let Some((_, session)) = self.sessions.remove(connection_id) {
            session.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
