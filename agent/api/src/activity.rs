//! Best-effort activity reporting to the admin backend's client log.
//!
//! Events enter through the bounded [`ActivitySink`] queue and a single
//! drain task posts them in order. Callers never wait on delivery; a dead
//! backend costs nothing but dropped events.

use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use docagent_core::{ActivitySink, ClientAction};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Owner of the drain task. Kept by the binary so shutdown can flush the
/// queue deterministically.
pub struct ActivityRelay {
    handle: JoinHandle<()>,
    close: watch::Sender<bool>,
}

impl ActivityRelay {
    /// Spawn the drain loop and return the sink that feeds it.
    pub fn spawn(
        http: reqwest::Client,
        admin_base_url: &str,
        machine_id: impl Into<String>,
        capacity: usize,
    ) -> (ActivitySink, ActivityRelay) {
        let (sink, rx) = ActivitySink::channel(capacity);
        let (close, close_rx) = watch::channel(false);
        let url = format!("{}/client-log/", admin_base_url.trim_end_matches('/'));
        let machine_id = machine_id.into();
        let handle = tokio::spawn(drain_loop(http, url, machine_id, rx, close_rx));
        (sink, ActivityRelay { handle, close })
    }

    /// Close the queue and post what is already buffered. Components may
    /// still hold sink clones at shutdown; closing the receiving half means
    /// the flush never waits on them, only on in-flight deliveries, with a
    /// bounded wait as the backstop.
    pub async fn drain(mut self) {
        let _ = self.close.send(true);
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut self.handle)
            .await
            .is_err()
        {
            warn!("activity relay still busy at shutdown; aborting drain task");
            self.handle.abort();
        }
    }
}

async fn drain_loop(
    http: reqwest::Client,
    url: String,
    machine_id: String,
    mut rx: mpsc::Receiver<ClientAction>,
    mut close_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(action) => post_action(&http, &url, &machine_id, action).await,
                None => break,
            },
            _ = close_rx.changed() => {
                // Stop accepting, then flush the backlog.
                rx.close();
                while let Some(action) = rx.recv().await {
                    post_action(&http, &url, &machine_id, action).await;
                }
                break;
            }
        }
    }
    debug!("activity relay drained");
}

async fn post_action(http: &reqwest::Client, url: &str, machine_id: &str, action: ClientAction) {
    let body = json!({
        "machine_id": machine_id,
        "action": action.as_str(),
    });
    match http.post(url).json(&body).send().await {
        Ok(response) if !response.status().is_success() => {
            warn!(
                action = action.as_str(),
                status = %response.status(),
                "client log rejected"
            );
        }
        Err(err) => {
            warn!(action = action.as_str(), error = %err, "client log delivery failed");
        }
        Ok(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::sync::Mutex;

    async fn spawn_log_server() -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
        let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let app = Router::new()
            .route(
                "/client-log/",
                post(
                    |State(seen): State<Arc<Mutex<Vec<serde_json::Value>>>>,
                     Json(body): Json<serde_json::Value>| async move {
                        seen.lock().await.push(body);
                        "ok"
                    },
                ),
            )
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn relay_delivers_actions_in_order() {
        let (base, seen) = spawn_log_server().await;
        let (sink, relay) = ActivityRelay::spawn(reqwest::Client::new(), &base, "m-1", 16);

        sink.record(ClientAction::InstanceStarted);
        sink.record(ClientAction::ConfigFetched);
        drop(sink);
        relay.drain().await;

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["machine_id"], "m-1");
        assert_eq!(seen[0]["action"], "instance_started");
        assert_eq!(seen[1]["action"], "config_fetched");
    }

    #[tokio::test]
    async fn drain_flushes_while_sinks_are_still_held() {
        let (base, seen) = spawn_log_server().await;
        let (sink, relay) = ActivityRelay::spawn(reqwest::Client::new(), &base, "m-1", 16);

        sink.record(ClientAction::CommandReceived);
        sink.record(ClientAction::InstanceStopped);

        // The sink stays alive, as component handles do at shutdown; the
        // flush must neither wait on it nor discard the backlog.
        let begun = std::time::Instant::now();
        relay.drain().await;
        assert!(
            begun.elapsed() < Duration::from_secs(2),
            "drain must not sit out its full timeout"
        );

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1]["action"], "instance_stopped");
        drop(sink);
    }

    #[tokio::test]
    async fn unreachable_backend_never_blocks_the_caller() {
        // Nothing listens on this port; records must still return instantly.
        let (sink, relay) =
            ActivityRelay::spawn(reqwest::Client::new(), "http://127.0.0.1:9", "m-1", 4);
        for _ in 0..32 {
            sink.record(ClientAction::CommandReceived);
        }
        drop(sink);
        relay.drain().await;
    }
}
