mod mode;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use docagent_api::{ActivityRelay, AdminClient, OcrClient};
use docagent_config::device::device_file_path;
use docagent_config::settings::config_dir;
use docagent_config::{AppSettings, ConfigStore};
use docagent_core::{ClientAction, CommandHandler, OperationalConfig, UiSurface};
use docagent_devices::{
    DeviceDescriptor, DeviceProvider, NoDevicesProvider, StillImageProvider,
};
use docagent_listener::CommandListener;
use docagent_pipeline::Pipeline;

use mode::{DetachedSurface, ModeController};

#[derive(Parser, Debug)]
#[command(name = "docagent")]
#[command(about = "Document capture and OCR agent")]
#[command(version)]
#[command(disable_help_flag = true)]
struct Cli {
    /// Run unattended regardless of the configured operational mode.
    #[arg(short = 'h', long)]
    headless: bool,

    /// Command listener port override.
    #[arg(long)]
    port: Option<u16>,

    /// Settings file path override.
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Print help.
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = AppSettings::load(cli.settings.as_deref())?;

    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .json()
        .init();

    let port = cli.port.unwrap_or(settings.port);
    info!(
        machine_id = %settings.machine_id,
        port,
        headless = cli.headless,
        admin = %settings.admin_base_url,
        "starting docagent"
    );

    let http = reqwest::Client::new();
    let (activity, relay) = ActivityRelay::spawn(
        http.clone(),
        &settings.admin_base_url,
        &settings.machine_id,
        64,
    );
    activity.record(ClientAction::InstanceStarted);

    let admin = AdminClient::new(http.clone(), &settings.admin_base_url, &settings.machine_id);
    let ocr = OcrClient::new(
        http,
        &settings.processing_base_url,
        &settings.ocr_language,
        &settings.ocr_engine,
    );
    let provider = build_provider(&settings);
    let device_file = device_file_path(&config_dir());

    let store = Arc::new(ConfigStore::new(
        admin.clone(),
        OperationalConfig::new(
            settings.machine_id.clone(),
            settings.operational_mode,
            settings.polling_frequency,
        ),
        device_file.clone(),
        Duration::from_secs(settings.min_poll_interval_secs.max(60)),
        activity.clone(),
    ));

    let pipeline: Arc<dyn CommandHandler> = Arc::new(Pipeline::new(
        Arc::clone(&provider),
        ocr,
        admin.clone(),
        activity.clone(),
        settings.watch_folder(),
        device_file,
        current_user(),
        false,
    ));
    let listener = Arc::new(CommandListener::new(
        port,
        Arc::clone(&pipeline),
        activity.clone(),
    ));

    let controller = Arc::new(ModeController::new(
        Arc::clone(&store),
        listener,
        admin,
        pipeline,
        provider,
        activity,
        Arc::new(DetachedSurface) as Arc<dyn UiSurface>,
    ));

    // A panic anywhere must still leave an instance-stopped record behind.
    {
        let controller = Arc::clone(&controller);
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            controller.log_stopped_once();
            default_hook(info);
        }));
    }

    // Headless starts must not block on a reachable backend; interactive
    // starts wait for the first fetch attempt so the mode is settled.
    {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.initialize().await });
    }
    if !cli.headless {
        store.initial_load().await;
    }
    store.start_polling().await;

    let runner = Arc::clone(&controller);
    tokio::select! {
        _ = runner.run(cli.headless) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received; shutting down");
        }
    }

    controller.shutdown().await;
    relay.drain().await;
    Ok(())
}

fn build_provider(settings: &AppSettings) -> Arc<dyn DeviceProvider> {
    match &settings.capture_fixture {
        Some(image) => {
            info!(image = %image.display(), "serving captures from a still image fixture");
            Arc::new(
                StillImageProvider::new(image.clone())
                    .with_camera(DeviceDescriptor::new("still-0", "Still Image")),
            )
        }
        None => Arc::new(NoDevicesProvider),
    }
}

/// Account name uploads are attributed to.
fn current_user() -> String {
    std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "docagent".to_string())
}
