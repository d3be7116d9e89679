use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::models::AskRequest;
use crate::query::QueryInterface;
use crate::socket::{EventFrame, Session};

#[derive(Clone)]
struct AppState {
    queries: QueryInterface,
}

pub fn router(queries: QueryInterface) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/ws", get(socket_upgrade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { queries })
}

pub async fn run_server(settings: Settings, queries: QueryInterface) -> Result<()> {
    let app = router(queries);

    let addr: SocketAddr = settings.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// Deprecated: kept for clients that predate the messaging channel.
async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Response, ApiError> {
    let answer = state
        .queries
        .get_answer(&request.query, false, false)
        .await?;
    Ok(([("deprecation", "true")], Json(answer)).into_response())
}

async fn socket_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state.queries))
}

async fn serve_socket(mut socket: WebSocket, queries: QueryInterface) {
    let mut session = Session::new(queries);
    let status = session.connect();

    if send_frame(&mut socket, &status).await.is_ok() {
        while let Some(message) = socket.recv().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(sid = %session.id(), "websocket error: {err}");
                    break;
                }
            };

            if let Some(reply) = session.handle_frame(&text).await {
                if send_frame(&mut socket, &reply).await.is_err() {
                    break;
                }
            }
        }
    }

    session.disconnect();
}

async fn send_frame(socket: &mut WebSocket, frame: &EventFrame) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    socket.send(Message::Text(text)).await?;
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        tracing::error!("request failed: {value:#}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
