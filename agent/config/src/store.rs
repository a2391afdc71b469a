//! Remote configuration store: one shared [`OperationalConfig`] mutated in
//! place by fetches from the admin backend, a change notification channel,
//! and a self-rescheduling background poller.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use docagent_api::AdminClient;
use docagent_core::{ActivitySink, ClientAction, OperationalConfig};

use crate::device;

pub struct ConfigStore {
    admin: AdminClient,
    device_path: PathBuf,
    min_poll_interval: Duration,
    config: RwLock<OperationalConfig>,
    updates: watch::Sender<OperationalConfig>,
    initialized: watch::Sender<bool>,
    activity: ActivitySink,
    poller: Mutex<Option<Poller>>,
}

struct Poller {
    stop: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

impl ConfigStore {
    pub fn new(
        admin: AdminClient,
        initial: OperationalConfig,
        device_path: PathBuf,
        min_poll_interval: Duration,
        activity: ActivitySink,
    ) -> Self {
        let (updates, _) = watch::channel(initial.clone());
        let (initialized, _) = watch::channel(false);
        Self {
            admin,
            device_path,
            min_poll_interval,
            config: RwLock::new(initial),
            updates,
            initialized,
            activity,
            poller: Mutex::new(None),
        }
    }

    /// Snapshot of the current configuration.
    pub async fn current(&self) -> OperationalConfig {
        self.config.read().await.clone()
    }

    /// Change notifications. Receivers observe the post-merge snapshot after
    /// every successful fetch.
    pub fn subscribe(&self) -> watch::Receiver<OperationalConfig> {
        self.updates.subscribe()
    }

    /// One fetch, then complete the one-time initial-load signal. The signal
    /// fires on failure too so startup is never blocked by a backend outage,
    /// and later fetches cannot re-trigger it.
    pub async fn initialize(&self) {
        self.fetch_config().await;
        self.initialized.send_replace(true);
    }

    /// Resolves once the initial configuration fetch has been attempted.
    pub async fn initial_load(&self) {
        let mut rx = self.initialized.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Fetch and merge the instance configuration. Network or parse failures
    /// are logged and swallowed; the previous configuration is retained.
    pub async fn fetch_config(&self) {
        self.activity.record(ClientAction::ConfigFetched);

        let patch = match self.admin.fetch_instance_config().await {
            Ok(patch) => patch,
            Err(err) => {
                warn!(error = %err, "configuration fetch failed; keeping previous config");
                return;
            }
        };

        let device_hint = patch
            .available_devices
            .as_ref()
            .and_then(|devices| devices.iter().find_map(|d| d.decode()));

        let snapshot = {
            let mut config = self.config.write().await;
            config.apply(patch);
            config.clone()
        };

        if let Some(selection) = device_hint {
            if let Err(err) = device::save_selection(&self.device_path, &selection).await {
                warn!(error = %err, "failed to persist device hint");
            }
        }

        info!(
            title = %snapshot.title,
            mode = %snapshot.operational_mode,
            polling_hours = snapshot.polling_frequency,
            "configuration updated"
        );
        self.updates.send_replace(snapshot);
    }

    /// Start the background poll. Each cycle re-reads the interval so a
    /// frequency change delivered by a fetch takes effect on the next
    /// reschedule. No-op when already polling.
    pub async fn start_polling(self: &Arc<Self>) {
        let mut guard = self.poller.lock().await;
        if guard.is_some() {
            debug!("config polling already running");
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                let interval = store
                    .current()
                    .await
                    .poll_interval(store.min_poll_interval);
                debug!(interval_secs = interval.as_secs(), "config poll scheduled");
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        store.fetch_config().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            info!("config polling stopped");
                            break;
                        }
                    }
                }
            }
        });

        *guard = Some(Poller {
            stop: stop_tx,
            _task: task,
        });
    }

    /// Cancel the pending poll timer. Safe to call repeatedly.
    pub async fn stop_polling(&self) {
        let mut guard = self.poller.lock().await;
        if let Some(poller) = guard.take() {
            let _ = poller.stop.send(true);
        }
    }
}
