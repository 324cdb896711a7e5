//! Axum server setup and router construction.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use axum::response::Html;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::AppState;
use crate::{api, ws};

/// The built-in chat page.
const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Build the full axum router.
///
/// The router serves:
/// - the chat page at `/` (or `static_dir` as the fallback when given)
/// - WebSocket at `/ws`
/// - REST API at `/api/*`
pub fn build_router(app: AppState, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/page", get(api::get_page))
        .route("/api/sessions", post(api::create_session))
        .route(
            "/api/sessions/{id}",
            get(api::get_session).delete(api::delete_session),
        )
        .route("/api/sessions/{id}/chat", post(api::post_chat));

    router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.route("/", get(index)),
    };

    router.layer(cors).with_state(app)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Start the axum server and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind(bind_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    info!("Chat UI listening on http://{addr}");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}
