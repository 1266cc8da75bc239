mod ui;

use std::{env, path::PathBuf, sync::Arc};

use anyhow::Result;
use ccd_client::{CameraApi, HttpCamera, MockCamera};
use ccd_ops::{init_tracing, PollStats};
use ccd_sync::{
    bus::{DashboardBus, EventSink},
    render_once, DashboardSync, UserAction,
};
use ccd_types::{config::DashboardConfig, geometry::DisplaySize};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::{
    sync::mpsc,
    time::{interval, Duration},
};
use tracing::{info, warn};

use crate::ui::{UiMessage, UiSettings};

const DEFAULT_CONFIG: &str = "configs/dev.toml";

#[derive(Parser)]
#[command(name = "ccd-dash", about = "Terminal dashboard for a web-controlled CCD camera")]
struct Cli {
    /// Config file; falls back to $CCD_DASH_CONFIG, then configs/dev.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides camera.base_url.
    #[arg(long)]
    base_url: Option<String>,

    /// Overrides poll.interval_ms.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Use the built-in simulated camera instead of HTTP.
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one status snapshot and print the rendered view.
    Once {
        /// Preview width used for overlay geometry.
        #[arg(long, default_value_t = 800.0)]
        width: f64,
        #[arg(long, default_value_t = 600.0)]
        height: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli);

    match cli.command {
        Some(Command::Once { width, height }) => {
            let preview = DisplaySize::new(width, height);
            let view = if cli.mock {
                render_once(&MockCamera::new(), preview).await?
            } else {
                render_once(&HttpCamera::new(&config.camera)?, preview).await?
            };
            for line in view.to_lines() {
                println!("{line}");
            }
            Ok(())
        }
        None => {
            init_tracing(&config.ops)?;
            if cli.mock {
                run_dashboard(Arc::new(MockCamera::new()), config).await
            } else {
                let camera = HttpCamera::new(&config.camera)?;
                run_dashboard(Arc::new(camera), config).await
            }
        }
    }
}

async fn run_dashboard<A>(api: Arc<A>, config: DashboardConfig) -> Result<()>
where
    A: CameraApi + 'static,
{
    let summary = format!("{} every {} ms", api.base_url(), config.poll.interval_ms);
    info!("Starting dashboard for {}", summary);

    let client = api.clone();
    let stats = PollStats::new();
    let bus = DashboardBus::new(256);
    let mut events = bus.subscribe();
    let (actions_tx, actions_rx) = mpsc::channel(64);

    let sync = DashboardSync::new(
        api,
        bus,
        stats.clone(),
        config.poll.clone(),
        config.ui.clone(),
        DisplaySize::new(80.0, 24.0),
    );
    let sync_task = tokio::spawn(sync.run(actions_rx));

    let (ui_tx, ui_rx) = std::sync::mpsc::channel();
    let forward = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(1));
        loop {
            let message = tokio::select! {
                event = events.next() => match event {
                    Some(event) => UiMessage::Event(event),
                    None => UiMessage::Shutdown,
                },
                _ = ticker.tick() => UiMessage::Stats(stats.snapshot().await, client.metrics()),
            };
            let closing = matches!(message, UiMessage::Shutdown);
            if ui_tx.send(message).is_err() || closing {
                break;
            }
        }
    });

    let settings = UiSettings {
        summary,
        exposure_time_s: config.ui.exposure_time_s,
        cooler_setpoint_c: config.ui.cooler_setpoint_c,
    };
    let ui_actions = actions_tx.clone();
    let ui_result =
        tokio::task::spawn_blocking(move || ui::run(ui_rx, ui_actions, settings)).await?;

    // The UI may have exited on an error without asking the loop to stop.
    let _ = actions_tx.send(UserAction::Shutdown).await;
    if let Err(err) = sync_task.await? {
        warn!("sync loop ended with error: {err}");
    }
    forward.abort();
    ui_result
}

fn load_config(cli: &Cli) -> DashboardConfig {
    let from_env = env::var("CCD_DASH_CONFIG").ok().map(PathBuf::from);
    let path = cli
        .config
        .clone()
        .or(from_env)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = match DashboardConfig::from_file(&path) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            DashboardConfig::default()
        }
    };
    if let Some(base_url) = &cli.base_url {
        config.camera.base_url = base_url.clone();
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.poll.interval_ms = interval_ms;
    }
    if let Err(err) = config.validate() {
        eprintln!(
            "Invalid config in '{}': {err}. Falling back to internal defaults.",
            path.display()
        );
        return DashboardConfig::default();
    }
    config
}
