//! Embedded HTTP command listener.
//!
//! Accepts remote processing triggers on `POST /process`, answers the caller
//! as soon as validation and the device/file check pass, and hands the slow
//! work (capture, OCR, relay) to the handler as independent background work.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use docagent_core::{ActivitySink, AgentError, ClientAction, CommandHandler, RemoteCommand};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct ListenerState {
    handler: Arc<dyn CommandHandler>,
    activity: ActivitySink,
}

struct ActiveListener {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Network listener for remote processing triggers. `start`/`stop` are
/// idempotent and the listener can be restarted after a stop.
pub struct CommandListener {
    port: AtomicU16,
    handler: Arc<dyn CommandHandler>,
    activity: ActivitySink,
    active: Mutex<Option<ActiveListener>>,
}

impl CommandListener {
    pub fn new(port: u16, handler: Arc<dyn CommandHandler>, activity: ActivitySink) -> Self {
        Self {
            port: AtomicU16::new(port),
            handler,
            activity,
            active: Mutex::new(None),
        }
    }

    /// Bind and start serving. Binds all interfaces; when that is denied for
    /// lack of privilege, falls back to loopback-only on the same port with a
    /// reduced-capability warning. No-op when already running.
    pub async fn start(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            debug!("command listener already running");
            return Ok(());
        }

        let port = self.port.load(Ordering::SeqCst);
        let listener = match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => listener,
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!(
                    port,
                    error = %err,
                    "bind on all interfaces denied; falling back to loopback only"
                );
                TcpListener::bind(("127.0.0.1", port))
                    .await
                    .with_context(|| format!("loopback bind on port {port} failed"))?
            }
            Err(err) => {
                return Err(err).with_context(|| format!("bind on port {port} failed"));
            }
        };
        let addr = listener.local_addr()?;

        let state = ListenerState {
            handler: Arc::clone(&self.handler),
            activity: self.activity.clone(),
        };
        let app = router(state);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.changed().await;
            };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %err, "command listener terminated abnormally");
            }
        });

        info!(%addr, "command listener started");
        *active = Some(ActiveListener {
            addr,
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Cancel the accept loop and close the socket. No-op when stopped.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        let Some(listener) = active.take() else {
            debug!("command listener already stopped");
            return;
        };

        let _ = listener.shutdown.send(true);
        let mut task = listener.task;
        if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
            warn!("command listener did not shut down in time; aborting");
            task.abort();
        }
        info!(addr = %listener.addr, "command listener stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Bound address of the running listener, if any.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.active.lock().await.as_ref().map(|a| a.addr)
    }

    /// Change the port. Only permitted while stopped.
    pub async fn set_port(&self, port: u16) -> Result<(), AgentError> {
        if self.is_running().await {
            return Err(AgentError::ListenerRunning);
        }
        self.port.store(port, Ordering::SeqCst);
        Ok(())
    }
}

fn router(state: ListenerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/process", post(handle_process))
        .fallback(unknown_route)
        .layer(cors)
        .with_state(state)
}

async fn unknown_route() -> (StatusCode, Json<Value>) {
    reply(StatusCode::NOT_FOUND, "Invalid endpoint or method")
}

async fn handle_process(
    State(state): State<ListenerState>,
    body: String,
) -> (StatusCode, Json<Value>) {
    let command: RemoteCommand = match serde_json::from_str(&body) {
        Ok(command) => command,
        Err(err) => {
            debug!(error = %err, "rejecting unparseable command body");
            return reply(StatusCode::BAD_REQUEST, "Invalid JSON format");
        }
    };

    if let Err(err) = command.validate() {
        let message = match err {
            AgentError::InvalidCommand(message) => message,
            other => other.to_string(),
        };
        return reply(StatusCode::BAD_REQUEST, message);
    }

    if let Err(err) = state.handler.prepare(&command).await {
        return match err {
            AgentError::DeviceUnavailable(_) => {
                warn!(
                    transaction_id = %command.transaction_id,
                    error = %err,
                    "rejecting command: capture not possible"
                );
                reply(StatusCode::NOT_FOUND, err.to_string())
            }
            other => {
                error!(
                    transaction_id = %command.transaction_id,
                    error = %other,
                    "command preparation failed"
                );
                reply(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };
    }

    state.activity.record(ClientAction::CommandReceived);
    info!(
        transaction_id = %command.transaction_id,
        file = %command.file_name,
        "command accepted; processing in background"
    );

    // Answer before the slow part: the caller must not wait on OCR turnaround.
    let handler = Arc::clone(&state.handler);
    let background = command.clone();
    tokio::spawn(async move {
        let outcome = handler.process(background).await;
        if !outcome.success {
            warn!(
                transaction_id = %outcome.transaction_id,
                message = %outcome.message,
                "background processing failed"
            );
        }
    });

    (
        StatusCode::OK,
        Json(json!({
            "transaction_id": command.transaction_id,
            "message": "Document processing initiated",
        })),
    )
}

fn reply(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "message": message.into() })))
}
