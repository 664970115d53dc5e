use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, chatbot, conversations, documents, health};
use crate::state::AppState;

/// The application router.
///
/// CORS is wide open: the chat endpoint is called by an embeddable widget
/// served from arbitrary customer origins.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/api/stats", get(health::stats))
        .route("/api/chat", post(chat::chat))
        .route(
            "/api/documents",
            get(documents::list_documents).post(documents::create_document),
        )
        .route("/api/documents/:document_id", delete(documents::delete_document))
        .route(
            "/api/chatbot",
            get(chatbot::get_chatbot).put(chatbot::update_chatbot),
        )
        .route("/api/conversations", get(conversations::list_conversations))
        .route(
            "/api/conversations/:conversation_id/messages",
            get(conversations::get_messages),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}
