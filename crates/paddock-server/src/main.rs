use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use paddock_api::auth::{self, AppState, AppStateInner};
use paddock_api::middleware::require_auth;
use paddock_api::{connections, conversations, messages};
use paddock_gateway::connection;
use paddock_gateway::dispatcher::Dispatcher;

mod maintenance;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paddock=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("PADDOCK_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("PADDOCK_DB_PATH").unwrap_or_else(|_| "paddock.db".into());
    let host = std::env::var("PADDOCK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PADDOCK_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let recount_interval_secs: u64 = std::env::var("PADDOCK_RECOUNT_INTERVAL_SECS")
        .unwrap_or_else(|_| "900".into())
        .parse()?;

    // Init database
    let db = paddock_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
    });

    // Periodic reconciliation of the denormalized profile counters
    tokio::spawn(maintenance::run_recount_loop(
        app_state.clone(),
        recount_interval_secs,
    ));

    let state = ServerState {
        dispatcher: dispatcher.clone(),
        jwt_secret: jwt_secret.clone(),
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/connections/request", post(connections::request_connection))
        .route("/connections/accept", post(connections::accept_connection))
        .route("/connections/reject", post(connections::reject_connection))
        .route("/connections/follow", post(connections::toggle_follow))
        .route("/connections/block", post(connections::block_user))
        .route("/connections/unblock", post(connections::unblock_user))
        .route("/connections/pending", get(connections::pending_requests))
        .route("/connections/mine", get(connections::my_connections))
        .route("/messages", post(messages::send_message))
        .route("/messages/history/{other_id}", get(messages::get_history))
        .route("/messages/read", post(messages::mark_read))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/conversations", get(conversations::list_conversations))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Paddock server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}
