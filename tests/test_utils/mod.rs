//! Test utilities for integration tests
#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use axum::{Router, body::Body};
use futures::{StreamExt, stream};

use chat_relay::ai::chat::{
    BoxedCompletionProvider, CompletionProvider, EchoProvider, FragmentStream, SessionRegistry,
    SessionSettings,
};
use chat_relay::api::{AppState, app, app_state};
use chat_relay::core::{AppConfig, ProviderKind};
use chat_relay::openai::Message;

pub fn test_config() -> AppConfig {
    AppConfig {
        provider: ProviderKind::Echo,
        openai_model: String::from("gpt-4o-mini"),
        openai_api_hostname: String::from("https://api.openai.com"),
        openai_api_key: String::from("test-api-key"),
        max_previous_conversations: 2,
        response_delay: Duration::ZERO,
        system_messages_path: String::from("./does-not-exist"),
        system_preamble: None,
        web_ui_path: String::from("./does-not-exist"),
    }
}

/// Creates a test application backed by the echo provider with a
/// system prompt loaded from a temporary directory.
pub async fn test_app() -> Router {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    fs::write(dir.path().join("rules.txt"), "Answer concisely.")
        .expect("Failed to write system message");

    let config = AppConfig {
        system_messages_path: dir.path().display().to_string(),
        ..test_config()
    };
    let state = app_state(config).expect("Failed to build app state");
    app(Arc::new(state))
}

/// Creates shared state that streams from `provider`.
pub fn test_state(provider: BoxedCompletionProvider) -> Arc<AppState> {
    let config = test_config();
    let settings = SessionSettings {
        system_prompt: Arc::from("You are a helpful assistant."),
        max_previous_conversations: config.max_previous_conversations,
        response_delay: config.response_delay,
    };
    Arc::new(AppState::new(config, SessionRegistry::new(provider, settings)))
}

pub fn echo_state() -> Arc<AppState> {
    test_state(Arc::new(EchoProvider))
}

/// Serve `router` on an ephemeral local port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not utf-8")
}

/// Yields a fixed set of fragments, then either fails or hangs until
/// dropped. Counts how many generations were started.
pub struct ScriptedProvider {
    fragments: Vec<&'static str>,
    error: Option<&'static str>,
    hang: bool,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn hanging(fragments: Vec<&'static str>) -> Self {
        Self {
            fragments,
            error: None,
            hang: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(fragments: Vec<&'static str>, error: &'static str) -> Self {
        Self {
            fragments,
            error: Some(error),
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CompletionProvider for ScriptedProvider {
    fn stream_completion(&self, _messages: Vec<Message>) -> FragmentStream {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut items: Vec<anyhow::Result<String>> =
            self.fragments.iter().map(|f| Ok(f.to_string())).collect();
        if let Some(error) = self.error {
            items.push(Err(anyhow!(error)));
        }

        let items = stream::iter(items);
        if self.hang {
            Box::pin(items.chain(stream::pending()))
        } else {
            Box::pin(items)
        }
    }
}
