use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware;
use axum::{Router, extract::Request, response::Response};
use http::{HeaderValue, header};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::routes;
use crate::ai::chat::{SessionRegistry, SessionSettings, provider_from_config};
use crate::ai::prompt::{load_system_messages, render_system_prompt};
use crate::api::state::AppState;
use crate::core::AppConfig;

async fn set_static_cache_control(request: Request, next: middleware::Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

pub fn app(shared_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::permissive();
    let web_ui_path = shared_state.config.web_ui_path.clone();

    Router::new()
        // API routes
        .nest("/api", routes::router())
        // Static server of the built chat UI
        .fallback_service(
            ServiceBuilder::new()
                .layer(middleware::from_fn(set_static_cache_control))
                .service(
                    ServeDir::new(web_ui_path)
                        .precompressed_br()
                        .precompressed_gzip(),
                ),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::clone(&shared_state))
}

/// Build the shared state from config. This reads the system prompt
/// from disk once so every session shares the same prompt.
pub fn app_state(config: AppConfig) -> Result<AppState> {
    let fragments = load_system_messages(Path::new(&config.system_messages_path));
    tracing::debug!(
        "Loaded {} system message(s) from {}",
        fragments.len(),
        config.system_messages_path
    );
    let system_prompt = render_system_prompt(config.system_preamble.as_deref(), &fragments)?;

    let settings = SessionSettings {
        system_prompt: Arc::from(system_prompt),
        max_previous_conversations: config.max_previous_conversations,
        response_delay: config.response_delay,
    };
    let registry = SessionRegistry::new(provider_from_config(&config), settings);

    Ok(AppState::new(config, registry))
}

// Run the server
pub async fn serve(host: String, port: String, config: AppConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // axum logs rejections from built-in extractors with the `axum::rejection`
                // target, at `TRACE` level. `axum::rejection=trace` enables showing those events
                format! {
                    "{}=debug,tower_http=debug,axum::rejection=trace",
                    env!("CARGO_CRATE_NAME")
                }
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Using {:?} provider, {} previous conversation(s), {}ms response delay",
        config.provider,
        config.max_previous_conversations,
        config.response_delay.as_millis()
    );

    let shared_state = Arc::new(app_state(config)?);
    let app = app(Arc::clone(&shared_state));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;

    tracing::debug!("Server started. Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
