//! Dialogue engine - simulated multi-participant group chats
//!
//! A Rust backend that schedules automatic replies from a cast of
//! recipients, one generation at a time per conversation.

mod api;
mod config;
mod events;
mod generation;
mod llm;
mod scheduler;
mod state_machine;
mod store;
mod tracker;
mod turn_selector;

use api::{create_router, AppState};
use config::Config;
use events::BroadcastSink;
use generation::{GenerationClient, Generator};
use llm::LlmService;
use scheduler::ConversationScheduler;
use std::net::SocketAddr;
use std::sync::Arc;
use store::ConversationStore;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turn_selector::TurnSelector;

/// Buffered engine events per stream subscriber
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dialogue_engine=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    let llm = llm::build_service(&config.llm)?;
    tracing::info!(
        model = %llm.model_id(),
        gateway = ?config.llm.gateway,
        max_auto_turns = config.engine.max_auto_turns,
        continue_probability = config.engine.continue_probability,
        "Generation backend initialized"
    );

    let generator: Arc<dyn Generator> =
        Arc::new(GenerationClient::new(llm, &config.llm, &config.engine));
    let events = BroadcastSink::new(EVENT_CHANNEL_CAPACITY);
    let scheduler = ConversationScheduler::new(
        ConversationStore::new(),
        generator.clone(),
        TurnSelector::new(&config.engine),
        Arc::new(events.clone()),
    )
    .with_sound(Arc::new(events.clone()));

    let state = AppState::new(Arc::new(scheduler), events, generator);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(CompressionLayer::new().gzip(true))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Dialogue engine listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
