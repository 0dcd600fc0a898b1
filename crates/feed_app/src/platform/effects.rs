use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use feed_core::{Effect, Identity, Msg, Settings};
use feed_engine::{
    EngineEvent, EngineHandle, EngineReloadLink, EngineSettings, OutboundRequest, ReloadScheduler,
    SharedFanOut, SystemClock,
};
use feed_logging::{feed_debug, feed_info};
use tokio::runtime::Runtime;

const ENGINE_POLL: Duration = Duration::from_millis(250);

/// Executes core effects against the engine, the fan-out and the reload scheduler.
pub struct EffectRunner {
    engine: EngineHandle,
    fan_out: SharedFanOut,
    scheduler: ReloadScheduler,
    msg_tx: mpsc::Sender<Msg>,
    resync_timeout: Duration,
    watchdog_generation: Arc<AtomicU64>,
    runtime: Runtime,
}

impl EffectRunner {
    pub fn new(
        engine_settings: EngineSettings,
        settings: &Settings,
        fan_out: SharedFanOut,
        msg_tx: mpsc::Sender<Msg>,
    ) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("feed-timers")
            .enable_time()
            .build()?;
        let engine = EngineHandle::new(engine_settings)?;
        let link = EngineReloadLink::new(
            engine.clone(),
            Identity {
                identity: settings.identity.clone(),
                region_code: settings.region_code.clone(),
            },
        );
        let scheduler = ReloadScheduler::new(
            settings.autoload.clone(),
            Arc::new(link),
            Arc::new(fan_out.clone()),
            Arc::new(SystemClock),
            runtime.handle().clone(),
        );
        scheduler.start();

        let runner = Self {
            engine,
            fan_out,
            scheduler,
            msg_tx,
            resync_timeout: Duration::from_secs(settings.resync_timeout_secs),
            watchdog_generation: Arc::new(AtomicU64::new(0)),
            runtime,
        };
        runner.spawn_event_loop();
        Ok(runner)
    }

    pub fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Connect(identity) => self.engine.connect(identity),
                Effect::Disconnect => self.engine.disconnect(),
                Effect::RequestBulkSnapshot { identity, limit } => {
                    feed_debug!("Requesting bulk snapshot of {} listings", limit);
                    self.engine
                        .send(OutboundRequest::BulkSnapshot { identity, limit });
                }
                Effect::ArmResyncWatchdog => self.arm_watchdog(),
                Effect::Broadcast(event) => self.fan_out.broadcast(&event),
                Effect::Notify(notification) => self.fan_out.notify(&notification),
                Effect::SuspendReload(reason) => self.scheduler.suspend(reason),
            }
        }
    }

    /// Applies the parts of new settings that live outside the core.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.resync_timeout = Duration::from_secs(settings.resync_timeout_secs);
        self.scheduler.update_settings(settings.autoload.clone());
    }

    pub fn shutdown(&self) {
        self.scheduler.stop();
        self.engine.shutdown();
    }

    /// Only the most recently armed watchdog may end a resync.
    fn arm_watchdog(&self) {
        let generation = self.watchdog_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.watchdog_generation.clone();
        let msg_tx = self.msg_tx.clone();
        let timeout = self.resync_timeout;
        self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if current.load(Ordering::SeqCst) == generation {
                feed_info!("Resync watchdog expired after {:?}", timeout);
                let _ = msg_tx.send(Msg::ResyncTimedOut);
            }
        });
    }

    fn spawn_event_loop(&self) {
        let engine = self.engine.clone();
        let msg_tx = self.msg_tx.clone();
        thread::spawn(move || loop {
            let Some(event) = engine.recv_timeout(ENGINE_POLL) else {
                continue;
            };
            if msg_tx.send(map_event(event)).is_err() {
                break;
            }
        });
    }
}

fn map_event(event: EngineEvent) -> Msg {
    match event {
        EngineEvent::Connected => Msg::Connected,
        EngineEvent::Disconnected { reason } => Msg::Disconnected { reason },
        EngineEvent::ConnectRejected { reason } => Msg::ConnectRejected { reason },
        EngineEvent::Feed(inbound) => Msg::Feed(inbound),
    }
}
