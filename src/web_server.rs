use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use chrono::Local;
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment, Value};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::{broadcast, Mutex};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::conversation::{ChatMessage, Conversation, ConversationState, PendingQuestion};
use crate::dataset::DATASET_VERSION;
use crate::error::SubmitError;
use crate::gateway::Gateway;
use crate::markup;
use crate::records::StationRecord;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

// Messages broadcast to every connected WebSocket client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub message_type: String,
    pub payload: serde_json::Value,
}

impl BroadcastMessage {
    fn chat(message: &ChatMessage) -> Self {
        Self {
            message_type: "message".to_string(),
            payload: serde_json::json!({
                "role": message.role,
                "content": message.content,
                "html": markup::to_html(&message.content),
                "time": local_time(message),
                "timestamp": message.timestamp,
            }),
        }
    }

    fn status(status: &StatusResponse) -> Self {
        Self {
            message_type: "status".to_string(),
            payload: serde_json::json!(status),
        }
    }

    fn error(message: &str) -> Self {
        Self {
            message_type: "error".to_string(),
            payload: serde_json::json!({ "message": message }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub state: ConversationState,
    pub stations: usize,
    pub messages: usize,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub content: String,
}

#[derive(Serialize)]
struct MessageView {
    role: String,
    content: String,
    time: String,
}

fn local_time(message: &ChatMessage) -> String {
    message
        .timestamp
        .with_timezone(&Local)
        .format("%H:%M")
        .to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let body = ErrorBody {
            error,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::EmptyMessage => ApiError::BadRequest(err.to_string()),
            SubmitError::Busy => ApiError::Conflict(err.to_string()),
            SubmitError::Loading => ApiError::ServiceUnavailable(err.to_string()),
        }
    }
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    conversation: Arc<Mutex<Conversation>>,
    gateway: Gateway,
    // Channel for broadcasting messages to all connected WebSocket clients
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl AppState {
    /// `templates_dir` switches from the embedded template to an auto-reloading directory.
    pub fn new(
        conversation: Arc<Mutex<Conversation>>,
        gateway: Gateway,
        templates_dir: Option<PathBuf>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);
        Self {
            templates: Arc::new(create_minijinja_env(templates_dir)),
            conversation,
            gateway,
            broadcast_tx,
        }
    }

    pub fn conversation(&self) -> &Arc<Mutex<Conversation>> {
        &self.conversation
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.broadcast_tx.subscribe()
    }

    fn broadcast(&self, message: BroadcastMessage) {
        // No receivers just means no browser is connected.
        let _ = self.broadcast_tx.send(message);
    }

    async fn status(&self) -> StatusResponse {
        let conversation = self.conversation.lock().await;
        StatusResponse {
            state: conversation.state(),
            stations: conversation.station_count(),
            messages: conversation.history().len(),
        }
    }

    /// Hands the parsed dataset to the conversation and pushes the greeting to clients.
    pub async fn finish_loading(&self, records: Arc<[StationRecord]>) {
        let greeting = {
            let mut conversation = self.conversation.lock().await;
            conversation.finish_loading(records);
            conversation.history().last().cloned()
        };
        if let Some(message) = greeting {
            self.broadcast(BroadcastMessage::chat(&message));
        }
        self.broadcast_status().await;
    }

    pub async fn broadcast_status(&self) {
        let status = self.status().await;
        self.broadcast(BroadcastMessage::status(&status));
    }

    /// Accepts a question and answers it on a detached task, so the gateway
    /// call finishes even if the requesting client goes away.
    async fn submit_question(&self, text: String) -> Result<ChatMessage, ApiError> {
        let state = self.clone();
        let task = tokio::spawn(async move {
            let pending = state.accept_question(&text).await?;
            Ok::<_, SubmitError>(state.complete_question(pending).await)
        });
        task.await
            .map_err(|e| {
                error!("Question task failed: {:?}", e);
                ApiError::Internal("question task failed".to_string())
            })?
            .map_err(ApiError::from)
    }

    /// Records the user turn and tells every client the assistant is busy.
    async fn accept_question(&self, text: &str) -> Result<PendingQuestion, SubmitError> {
        let (pending, user_message) = {
            let mut conversation = self.conversation.lock().await;
            let pending = conversation.begin_question(text)?;
            (pending, conversation.history().last().cloned())
        };
        if let Some(message) = user_message {
            self.broadcast(BroadcastMessage::chat(&message));
        }
        self.broadcast_status().await;
        Ok(pending)
    }

    async fn complete_question(&self, pending: PendingQuestion) -> ChatMessage {
        let outcome = self.gateway.ask(&pending.records, &pending.question).await;
        let reply = self.conversation.lock().await.finish_question(&outcome);
        self.broadcast(BroadcastMessage::chat(&reply));
        self.broadcast_status().await;
        reply
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: Option<PathBuf>) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.add_filter("markup", |content: String| {
            Value::from_safe_string(markup::to_html(&content))
        });
        match &templates_dir {
            Some(dir) => {
                env.set_loader(path_loader(dir));
                // Watch the templates directory for changes
                notifier.watch_path(dir.as_path(), true);
            }
            None => env.add_template("index.html", INDEX_TEMPLATE)?,
        }
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Response {
    let (status, messages) = {
        let conversation = state.conversation.lock().await;
        let messages: Vec<MessageView> = conversation
            .history()
            .iter()
            .map(|m| MessageView {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
                time: local_time(m),
            })
            .collect();
        let status = StatusResponse {
            state: conversation.state(),
            stations: conversation.station_count(),
            messages: messages.len(),
        };
        (status, messages)
    };

    // Acquire env, get template, and render within the same block
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => "BOMBAbot",
                    stations => status.stations,
                    loading => status.state == ConversationState::LoadingDataset,
                    analyzing => status.state == ConversationState::AwaitingResponse,
                    messages => messages,
                    dataset_version => DATASET_VERSION,
                };
                tmpl.render(context)
            })
        })
        .map(|html| Html(html).into_response())
        .unwrap_or_else(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
                .into_response()
        })
}

// Form post fallback for browsers without JavaScript
async fn index_form_handler(
    State(state): State<AppState>,
    Form(request): Form<SubmitRequest>,
) -> Result<Redirect, ApiError> {
    state.submit_question(request.content).await?;
    Ok(Redirect::to("/"))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.status().await)
}

async fn list_messages_handler(State(state): State<AppState>) -> Json<Vec<ChatMessage>> {
    Json(state.conversation.lock().await.history().to_vec())
}

async fn post_message_handler(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<ChatMessage>, ApiError> {
    let reply = state.submit_question(request.content).await?;
    Ok(Json(reply))
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// Handle individual WebSocket connections
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let mut broadcast_rx = state.subscribe();
    let (mut sender, mut receiver) = socket.split();

    // Send the current status so the client can sync its indicators
    let status = BroadcastMessage::status(&state.status().await);
    if let Ok(json_msg) = serde_json::to_string(&status) {
        if sender.send(Message::Text(json_msg)).await.is_err() {
            warn!("Failed to send status to new WebSocket client");
            return;
        }
    }

    loop {
        tokio::select! {
            // Message received from the broadcast channel
            result = broadcast_rx.recv() => {
                let msg = match result {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagged behind broadcasts");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                match serde_json::to_string(&msg) {
                    Ok(json_msg) => {
                        if sender.send(Message::Text(json_msg)).await.is_err() {
                            warn!("WebSocket client disconnected or send error. Closing connection.");
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize broadcast message: {}", e),
                }
            }

            // Message received from the client
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let request = match serde_json::from_str::<SubmitRequest>(&text) {
                            Ok(request) => request,
                            Err(e) => {
                                warn!("Ignoring malformed client message: {}", e);
                                continue;
                            }
                        };
                        // Answers arrive through the broadcast channel; only
                        // rejections are reported back directly.
                        match state.accept_question(&request.content).await {
                            Ok(pending) => {
                                let state = state.clone();
                                tokio::spawn(async move {
                                    state.complete_question(pending).await;
                                });
                            }
                            Err(e) => {
                                let reply = BroadcastMessage::error(&e.to_string());
                                if let Ok(json_msg) = serde_json::to_string(&reply) {
                                    if sender.send(Message::Text(json_msg)).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Received unexpected binary message from client");
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Axum answers pings automatically
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested WebSocket close");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                    // Client disconnected without sending a Close message
                    None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                }
            }
        }
    }
    info!("WebSocket connection closed");
}

/// Router with every dashboard route; `static_dir` is served under `/static`.
pub fn build_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    // Serve static files from the given directory
    let static_files_service = ServeDir::new(static_dir.as_ref()).not_found_service(
        tower::service_fn(|_: axum::extract::Request| async {
            Ok::<_, std::convert::Infallible>(
                (StatusCode::NOT_FOUND, "Not Found").into_response(),
            )
        }),
    );

    Router::new()
        .route("/", get(index_handler).post(index_form_handler))
        .route("/api/status", get(status_handler))
        .route(
            "/api/messages",
            get(list_messages_handler).post(post_message_handler),
        )
        .route("/ws", get(ws_handler))
        // Route for static files must be nested under a path like /static
        // or it will conflict with other routes.
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server<F>(
    port: u16,
    state: AppState,
    static_dir: PathBuf,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state, static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    // Bind using tokio::net::TcpListener
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .context("Web server failed")?;

    Ok(())
}
