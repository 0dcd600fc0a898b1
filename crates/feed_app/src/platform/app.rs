use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use feed_core::{update, AppState, Msg};
use feed_engine::{EngineSettings, FanOut, LogNotifier, LogSurface, SharedFanOut};
use feed_logging::{feed_debug, feed_info, LogDestination};
use log::LevelFilter;
use url::Url;

use super::config::{ConfigStore, RefreshTimer};
use super::effects::EffectRunner;

const LOG_PATH: &str = "./itemfeed.log";
const CONFIG_POLL: Duration = Duration::from_secs(2);

pub fn run_app(config_path: PathBuf) -> anyhow::Result<()> {
    feed_logging::initialize(LogDestination::Both, LevelFilter::Info, Path::new(LOG_PATH));

    let mut config = ConfigStore::new(config_path);
    let settings = config.load();
    feed_info!("Using config {:?}", config.path());
    let endpoint = Url::parse(&settings.endpoint)
        .with_context(|| format!("invalid endpoint {:?}", settings.endpoint))?;

    let mut fan_out = FanOut::new();
    fan_out.add_surface(Box::new(LogSurface::new(
        "headless",
        settings.autoload.queue.clone(),
    )));
    fan_out.add_notifier(Box::new(LogNotifier));

    let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
    let mut runner = EffectRunner::new(
        EngineSettings::new(endpoint),
        &settings,
        SharedFanOut::new(fan_out),
        msg_tx.clone(),
    )?;

    let alarm_interval = Arc::new(AtomicU64::new(settings.reconnect_interval_secs));
    spawn_reconnect_alarm(msg_tx, alarm_interval.clone());

    let mut state = AppState::new(settings);
    let mut refresh = RefreshTimer::new(CONFIG_POLL, Instant::now());
    loop {
        match msg_rx.recv_timeout(refresh.remaining(Instant::now())) {
            Ok(msg) => state = dispatch(state, msg, &runner),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if !refresh.fire(Instant::now()) {
            continue;
        }
        if let Some(settings) = config.refresh() {
            alarm_interval.store(settings.reconnect_interval_secs, Ordering::Relaxed);
            runner.apply_settings(&settings);
            state = dispatch(state, Msg::SettingsChanged(settings), &runner);
        }
    }

    runner.shutdown();
    Ok(())
}

fn dispatch(state: AppState, msg: Msg, runner: &EffectRunner) -> AppState {
    let (mut state, effects) = update(state, msg);
    runner.run(effects);
    if state.consume_dirty() {
        let view = state.view();
        feed_debug!(
            "Catalog holds {} listings ({:?}, resyncing: {})",
            view.item_count,
            view.connection,
            view.resyncing
        );
    }
    state
}

/// First alarm fires immediately so startup connects without waiting a full interval.
fn spawn_reconnect_alarm(msg_tx: mpsc::Sender<Msg>, interval_secs: Arc<AtomicU64>) {
    thread::spawn(move || {
        while msg_tx.send(Msg::ReconnectAlarm).is_ok() {
            let secs = interval_secs.load(Ordering::Relaxed).max(1);
            thread::sleep(Duration::from_secs(secs));
        }
    });
}
