//! Operational mode control.
//!
//! The agent runs in one of two modes. Standalone hands control to the
//! interactive surface; headless tears that surface down and brings up the
//! unattended services: the command listener, the keep-alive poll and the
//! device inventory report. Mode changes arrive through configuration
//! updates and are applied here, in one place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use docagent_api::{AdminClient, ReportedDevice};
use docagent_config::ConfigStore;
use docagent_core::{
    ActivitySink, ClientAction, CommandHandler, DeviceKind, OperationalMode, UiSurface,
};
use docagent_devices::DeviceProvider;
use docagent_listener::CommandListener;

/// Cadence of the headless keep-alive poll for queued commands.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

struct Keepalive {
    stop: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

/// Applies the configured operational mode to the running services. Owns the
/// keep-alive task; the listener and config store are shared.
pub struct ModeController {
    store: Arc<ConfigStore>,
    listener: Arc<CommandListener>,
    admin: AdminClient,
    handler: Arc<dyn CommandHandler>,
    provider: Arc<dyn DeviceProvider>,
    activity: ActivitySink,
    ui: Arc<dyn UiSurface>,
    keepalive: Mutex<Option<Keepalive>>,
    current: Mutex<Option<OperationalMode>>,
    stopped: AtomicBool,
}

impl ModeController {
    pub fn new(
        store: Arc<ConfigStore>,
        listener: Arc<CommandListener>,
        admin: AdminClient,
        handler: Arc<dyn CommandHandler>,
        provider: Arc<dyn DeviceProvider>,
        activity: ActivitySink,
        ui: Arc<dyn UiSurface>,
    ) -> Self {
        Self {
            store,
            listener,
            admin,
            handler,
            provider,
            activity,
            ui,
            keepalive: Mutex::new(None),
            current: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Apply the current mode, then follow configuration updates until the
    /// store goes away. `force_headless` pins the mode for the whole run.
    pub async fn run(&self, force_headless: bool) {
        let mut updates = self.store.subscribe();

        let configured = self.store.current().await.operational_mode;
        self.apply(effective(configured, force_headless)).await;

        while updates.changed().await.is_ok() {
            let configured = updates.borrow_and_update().operational_mode;
            self.apply(effective(configured, force_headless)).await;
        }
    }

    async fn apply(&self, mode: OperationalMode) {
        let mut current = self.current.lock().await;
        if *current == Some(mode) {
            debug!(mode = %mode, "operational mode unchanged");
            return;
        }
        info!(mode = %mode, "switching operational mode");

        match mode {
            OperationalMode::Headless => {
                self.ui.close();
                self.start_keepalive().await;
                self.report_devices().await;
                if let Err(err) = self.listener.start().await {
                    error!(error = %err, "command listener failed to start");
                }
            }
            OperationalMode::Standalone => {
                self.stop_keepalive().await;
                self.listener.stop().await;
                self.ui.activate();
            }
        }
        *current = Some(mode);
    }

    /// Poll for queued commands right away, then on a fixed cadence until
    /// stopped. Commands are processed one at a time, in delivery order.
    async fn start_keepalive(&self) {
        let mut guard = self.keepalive.lock().await;
        if guard.is_some() {
            return;
        }

        let (stop, mut stop_rx) = watch::channel(false);
        let admin = self.admin.clone();
        let handler = Arc::clone(&self.handler);
        let activity = self.activity.clone();
        let task = tokio::spawn(async move {
            loop {
                poll_once(&admin, &handler, &activity).await;
                tokio::select! {
                    _ = tokio::time::sleep(KEEPALIVE_INTERVAL) => {}
                    _ = stop_rx.changed() => break,
                }
            }
            debug!("keep-alive poll stopped");
        });

        *guard = Some(Keepalive { stop, _task: task });
    }

    async fn stop_keepalive(&self) {
        let mut guard = self.keepalive.lock().await;
        if let Some(keepalive) = guard.take() {
            let _ = keepalive.stop.send(true);
        }
    }

    /// Enumerate capture devices and deliver the inventory to the admin
    /// backend. Enumeration or delivery failures are logged, not fatal.
    async fn report_devices(&self) {
        let mut devices = Vec::new();
        match self.provider.list_camera_devices().await {
            Ok(cameras) => devices.extend(
                cameras
                    .into_iter()
                    .map(|d| ReportedDevice::new(d.id, &d.name, DeviceKind::Camera)),
            ),
            Err(err) => warn!(error = %err, "camera enumeration failed"),
        }
        match self.provider.list_scanner_devices().await {
            Ok(scanners) => devices.extend(
                scanners
                    .into_iter()
                    .map(|d| ReportedDevice::new(d.id, &d.name, DeviceKind::Scanner)),
            ),
            Err(err) => warn!(error = %err, "scanner enumeration failed"),
        }

        match self.admin.report_devices(&devices).await {
            Ok(()) => {
                self.activity.record(ClientAction::DevicesDelivered);
                info!(count = devices.len(), "device inventory delivered");
            }
            Err(err) => warn!(error = %err, "device inventory delivery failed"),
        }
    }

    /// Stop everything this controller owns or drives. Safe to call more
    /// than once.
    pub async fn shutdown(&self) {
        self.stop_keepalive().await;
        self.listener.stop().await;
        self.store.stop_polling().await;
        self.log_stopped_once();
    }

    /// Record the instance-stopped event exactly once, however many paths
    /// (signal handler, panic hook, orderly shutdown) reach it.
    pub fn log_stopped_once(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.activity.record(ClientAction::InstanceStopped);
            info!("instance stopped");
        }
    }
}

fn effective(configured: OperationalMode, force_headless: bool) -> OperationalMode {
    if force_headless {
        OperationalMode::Headless
    } else {
        configured
    }
}

async fn poll_once(
    admin: &AdminClient,
    handler: &Arc<dyn CommandHandler>,
    activity: &ActivitySink,
) {
    let commands = match admin.poll_commands().await {
        Ok(commands) => commands,
        Err(err) => {
            debug!(error = %err, "keep-alive poll failed");
            return;
        }
    };

    for command in commands {
        if let Err(err) = command.validate() {
            warn!(error = %err, "dropping malformed polled command");
            continue;
        }
        activity.record(ClientAction::CommandReceived);
        info!(
            transaction_id = %command.transaction_id,
            "processing polled command"
        );
        let outcome = handler.process(command).await;
        if !outcome.success {
            warn!(
                transaction_id = %outcome.transaction_id,
                message = %outcome.message,
                "polled command failed"
            );
        }
    }
}

/// Surface of a process with no interactive shell: both operations are
/// no-ops beyond a log line.
pub struct DetachedSurface;

impl UiSurface for DetachedSurface {
    fn activate(&self) {
        debug!("no interactive surface to activate");
    }

    fn close(&self) {
        debug!("no interactive surface to close");
    }
}
