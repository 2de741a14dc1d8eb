mod backend;
mod broadcaster;
mod components;
mod controls;
mod core;
mod dispatch;
mod favorites;
mod menu;
mod mpd;
mod now_playing;
mod playback;
mod playstate;
mod radio;
mod socket;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use opuscule_proto::config::Config;
use opuscule_proto::protocol::{Distribution, Notice, NoticeKind};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::components::fmradio::FmRadio;
use crate::components::library::Library;
use crate::components::soundscapes::Soundscapes;
use crate::components::streaming::Streaming;
use crate::components::system::System;
use crate::components::Component;
use crate::controls::Volume;
use crate::playback::Mixer;

/// A tracing layer that posts WARN and ERROR events as FAULT notices, so
/// clients see them in the next snapshot.
struct NoticeLayer {
    sender: mpsc::UnboundedSender<Notice>,
}

impl NoticeLayer {
    fn new(sender: mpsc::UnboundedSender<Notice>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for NoticeLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut text = String::new();
        let now = chrono::Local::now();
        text.push_str(&format!("{} ", now.format("%H:%M:%S")));
        let mut visitor = MessageVisitor(&mut text);
        event.record(&mut visitor);

        // no receiver once the core has exited
        let _ = self.sender.send(Notice {
            kind: NoticeKind::Fault,
            dist: Distribution::All,
            text,
        });
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

/// Port from `OPUSCULE_PORT` if it is set and valid.
fn port_override() -> Option<u16> {
    let value = std::env::var("OPUSCULE_PORT").ok()?;
    match value.parse() {
        Ok(port) => Some(port),
        Err(_) => {
            warn!("Ignoring invalid OPUSCULE_PORT {:?}", value);
            None
        }
    }
}

fn write_pid_file(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("{}\n", std::process::id()))?;
    Ok(())
}

struct PidFile(PathBuf);

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Notices channel first so logging can feed it
    let (notice_tx, notice_rx) = mpsc::unbounded_channel::<Notice>();

    let data_dir = opuscule_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(NoticeLayer::new(notice_tx))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,opuscule_daemon=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    write_pid_file(&config.daemon.pid_file)?;
    let _pid_file = PidFile(config.daemon.pid_file.clone());

    // Event channel: all external inputs funnel into DaemonCore
    let (event_tx, event_rx) = mpsc::unbounded_channel::<core::DaemonEvent>();

    let mpd = if config.mpd.enabled {
        let client = Arc::new(mpd::MpdClient::new(&config.mpd.host, config.mpd.port));
        match client.prepare().await {
            Ok(()) => Some(client),
            Err(e) => {
                warn!("MPD unavailable at {}: {:#}", client.address(), e);
                None
            }
        }
    } else {
        info!("MPD disabled in config");
        None
    };

    let radio = radio::RadioState::new(
        config.daemon.history_len,
        Volume::new(config.volume.initial, config.volume.step),
    );
    let mut dispatcher = dispatch::Dispatcher::new(radio, config.daemon.favorites_dir.clone())?;

    let mut candidates: Vec<Arc<dyn Component>> = Vec::new();
    if let Some(mpd) = &mpd {
        candidates.push(Arc::new(Library::new(mpd.clone())));
        candidates.push(Arc::new(Streaming::new(mpd.clone(), config.streaming.stations.clone())));
    }
    candidates.push(Arc::new(Soundscapes::new(config.soundscapes.clone())));
    candidates.push(Arc::new(FmRadio::new(config.fmradio.clone())));
    candidates.push(Arc::new(System));

    for component in candidates {
        if component.requirements_met().await {
            dispatcher.register(component);
        } else {
            warn!("Requirements for {} not met, leaving it out", component.tag());
        }
    }

    let mixer = mpd.clone().map(|client| client as Arc<dyn Mixer>);
    let (worker, backend_queue) = backend::BackendWorker::new(mixer, event_tx.clone());
    tokio::spawn(worker.run());

    let (broadcaster, broadcast_tx) = broadcaster::Broadcaster::new();
    tokio::spawn(broadcaster.run());

    let port = port_override().unwrap_or(config.daemon.port);
    let listener = socket::bind(&config.daemon.bind_address, port).await?;
    let _socket_handle = socket::start_server(listener, event_tx.clone(), broadcast_tx.clone());

    if let Some(mpd) = &mpd {
        tokio::spawn(mpd::run_monitor(mpd.address().to_string(), event_tx.clone()));
    }

    let daemon_core = core::DaemonCore::new(
        dispatcher,
        backend_queue,
        broadcast_tx,
        notice_rx,
        event_tx,
    );

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    info!("Daemon exiting");
    Ok(())
}
