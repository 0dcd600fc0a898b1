//! Windowed, jittered reload-eligibility timer.
//!
//! Every timer firing and every pause goes through the same mutex, and each
//! armed timer carries the generation it was armed under. A firing whose
//! generation is no longer current does nothing, so a pause can never be
//! undone by a timer that was already in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{Local, NaiveTime};
use feed_core::{
    jitter_bounds, AutoloadSettings, PauseReason, ReloadWindow, OUTSIDE_WINDOW_RETRY,
};
use feed_logging::{feed_debug, feed_info, feed_warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// The scheduler's view of the connection.
pub trait ReloadLink: Send + Sync {
    fn is_connected(&self) -> bool;
    /// Fire-and-forget; any answer arrives later as a feed event.
    fn request_reload_eligibility(&self);
}

/// Answers which display surface, if any, may be reloaded right now.
pub trait SurfaceOracle: Send + Sync {
    fn eligible_surface(&self) -> Option<String>;
}

pub trait Clock: Send + Sync {
    fn local_time(&self) -> NaiveTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_time(&self) -> NaiveTime {
        Local::now().time()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Disabled, outside the window, or nothing eligible.
    Idle,
    /// Counting down to the next eligibility check.
    Armed,
    /// Hard pause after an automation challenge.
    Paused,
}

/// What the most recent firing decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Disabled,
    OutsideWindow,
    NotConnected,
    NoEligibleSurface,
    Requested(String),
}

struct Inner {
    settings: AutoloadSettings,
    state: SchedulerState,
    generation: u64,
    timer: Option<CancellationToken>,
    rng: StdRng,
    last_outcome: Option<FireOutcome>,
    link: Arc<dyn ReloadLink>,
    oracle: Arc<dyn SurfaceOracle>,
    clock: Arc<dyn Clock>,
}

impl Inner {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.generation += 1;
    }

    fn jittered_delay(&mut self) -> Duration {
        let (low, high) = jitter_bounds(self.settings.jitter);
        Duration::from_secs(self.rng.gen_range(low.as_secs()..=high.as_secs()))
    }

    fn window(&self) -> ReloadWindow {
        ReloadWindow::from_settings(&self.settings.window).unwrap_or_else(|err| {
            feed_warn!("Reload window rejected ({}), using the default", err);
            ReloadWindow::default()
        })
    }
}

#[derive(Clone)]
pub struct ReloadScheduler {
    inner: Arc<Mutex<Inner>>,
    runtime: Handle,
}

impl ReloadScheduler {
    pub fn new(
        settings: AutoloadSettings,
        link: Arc<dyn ReloadLink>,
        oracle: Arc<dyn SurfaceOracle>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Self {
        Self::with_rng(settings, link, oracle, clock, runtime, StdRng::from_entropy())
    }

    pub fn with_rng(
        settings: AutoloadSettings,
        link: Arc<dyn ReloadLink>,
        oracle: Arc<dyn SurfaceOracle>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
        rng: StdRng,
    ) -> Self {
        let inner = Inner {
            settings,
            state: SchedulerState::Idle,
            generation: 0,
            timer: None,
            rng,
            last_outcome: None,
            link,
            oracle,
            clock,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            runtime,
        }
    }

    /// Arms the first check one jittered delay from now. No-op while paused or already armed.
    pub fn start(&self) {
        let mut inner = self.lock();
        if !inner.settings.enabled {
            feed_debug!("Reload scheduler not started: autoload disabled");
            return;
        }
        if inner.state == SchedulerState::Paused || inner.timer.is_some() {
            return;
        }
        let delay = inner.jittered_delay();
        feed_info!("Reload scheduler started, first check in {:?}", delay);
        self.arm(&mut inner, delay, SchedulerState::Armed);
    }

    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.cancel_timer();
        inner.state = SchedulerState::Idle;
        feed_info!("Reload scheduler stopped");
    }

    /// New window and jitter values apply from the next firing.
    pub fn update_settings(&self, settings: AutoloadSettings) {
        let enabled = settings.enabled;
        {
            let mut inner = self.lock();
            inner.settings = settings;
            if !enabled && inner.state != SchedulerState::Paused {
                inner.cancel_timer();
                inner.state = SchedulerState::Idle;
                return;
            }
        }
        if enabled {
            self.start();
        }
    }

    /// Cancels any pending timer and installs the cooldown in one step.
    pub fn suspend(&self, reason: PauseReason) {
        let mut inner = self.lock();
        let cooldown = reason.cooldown();
        feed_warn!("Reload checks paused for {:?} ({:?})", cooldown, reason);
        self.arm(&mut inner, cooldown, SchedulerState::Paused);
    }

    pub fn state(&self) -> SchedulerState {
        self.lock().state
    }

    pub fn last_outcome(&self) -> Option<FireOutcome> {
        self.lock().last_outcome.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(&self, inner: &mut Inner, delay: Duration, state: SchedulerState) {
        inner.cancel_timer();
        let generation = inner.generation;
        let token = CancellationToken::new();
        inner.timer = Some(token.clone());
        inner.state = state;

        let scheduler = self.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => scheduler.fire(generation),
            }
        });
    }

    fn fire(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            feed_debug!("Ignoring stale reload timer (generation {})", generation);
            return;
        }
        inner.timer = None;

        if !inner.settings.enabled {
            inner.state = SchedulerState::Idle;
            inner.last_outcome = Some(FireOutcome::Disabled);
            return;
        }

        let now = inner.clock.local_time();
        if !inner.window().contains(now) {
            feed_debug!("{} is outside the reload window", now.format("%H:%M"));
            inner.last_outcome = Some(FireOutcome::OutsideWindow);
            self.arm(&mut inner, OUTSIDE_WINDOW_RETRY, SchedulerState::Idle);
            return;
        }

        let (outcome, state) = if !inner.link.is_connected() {
            (FireOutcome::NotConnected, SchedulerState::Armed)
        } else {
            match inner.oracle.eligible_surface() {
                Some(queue) => {
                    feed_info!("Requesting reload eligibility for {}", queue);
                    inner.link.request_reload_eligibility();
                    (FireOutcome::Requested(queue), SchedulerState::Armed)
                }
                None => (FireOutcome::NoEligibleSurface, SchedulerState::Idle),
            }
        };
        inner.last_outcome = Some(outcome);
        let delay = inner.jittered_delay();
        feed_debug!("Next reload check in {:?}", delay);
        self.arm(&mut inner, delay, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_core::{AutoloadWindow, JitterRange};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeLink {
        connected: AtomicBool,
        requests: AtomicUsize,
    }

    impl ReloadLink for FakeLink {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn request_reload_eligibility(&self) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FixedOracle(Option<String>);

    impl SurfaceOracle for FixedOracle {
        fn eligible_surface(&self) -> Option<String> {
            self.0.clone()
        }
    }

    struct FixedClock(NaiveTime);

    impl Clock for FixedClock {
        fn local_time(&self) -> NaiveTime {
            self.0
        }
    }

    fn settings() -> AutoloadSettings {
        AutoloadSettings {
            enabled: true,
            window: AutoloadWindow {
                hour_start: "23:00".to_string(),
                hour_end: "03:00".to_string(),
            },
            jitter: JitterRange { min: 5, max: 10 },
            queue: None,
        }
    }

    fn scheduler(link: Arc<FakeLink>, at: (u32, u32)) -> ReloadScheduler {
        let clock = FixedClock(NaiveTime::from_hms_opt(at.0, at.1, 0).unwrap());
        ReloadScheduler::with_rng(
            settings(),
            link,
            Arc::new(FixedOracle(Some("potluck".to_string()))),
            Arc::new(clock),
            Handle::current(),
            StdRng::seed_from_u64(7),
        )
    }

    fn connected_link() -> Arc<FakeLink> {
        let link = Arc::new(FakeLink::default());
        link.connected.store(true, Ordering::SeqCst);
        link
    }

    async fn settle(by: Duration) {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(by).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn requests_eligibility_inside_window() {
        let link = connected_link();
        let scheduler = scheduler(link.clone(), (1, 0));

        scheduler.start();
        assert_eq!(scheduler.state(), SchedulerState::Armed);
        settle(Duration::from_secs(10 * 60 + 1)).await;

        assert_eq!(link.requests.load(Ordering::SeqCst), 1);
        assert_eq!(
            scheduler.last_outcome(),
            Some(FireOutcome::Requested("potluck".to_string()))
        );
        assert_eq!(scheduler.state(), SchedulerState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn outside_window_retries_after_fifteen_minutes() {
        let link = connected_link();
        let scheduler = scheduler(link.clone(), (12, 0));

        scheduler.start();
        settle(Duration::from_secs(10 * 60 + 1)).await;

        assert_eq!(link.requests.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.last_outcome(), Some(FireOutcome::OutsideWindow));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_link_skips_the_request() {
        let link = Arc::new(FakeLink::default());
        let scheduler = scheduler(link.clone(), (1, 0));

        scheduler.start();
        settle(Duration::from_secs(10 * 60 + 1)).await;

        assert_eq!(link.requests.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.last_outcome(), Some(FireOutcome::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_cancels_the_pending_check() {
        let link = connected_link();
        let scheduler = scheduler(link.clone(), (1, 0));

        scheduler.start();
        scheduler.suspend(PauseReason::Challenge);
        settle(Duration::from_secs(30 * 60)).await;

        assert_eq!(link.requests.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state(), SchedulerState::Paused);

        // Start while paused must not shorten the cooldown.
        scheduler.start();
        settle(Duration::from_secs(29 * 60)).await;
        assert_eq!(link.requests.load(Ordering::SeqCst), 0);

        settle(Duration::from_secs(2 * 60)).await;
        assert_eq!(link.requests.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), SchedulerState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn decoy_pause_lasts_a_day() {
        let link = connected_link();
        let scheduler = scheduler(link.clone(), (1, 0));

        scheduler.suspend(PauseReason::Decoy);
        settle(Duration::from_secs(23 * 60 * 60)).await;
        assert_eq!(scheduler.state(), SchedulerState::Paused);
        assert_eq!(link.requests.load(Ordering::SeqCst), 0);

        settle(Duration::from_secs(60 * 60 + 1)).await;
        assert_eq!(link.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_stops_the_timer() {
        let link = connected_link();
        let scheduler = scheduler(link.clone(), (1, 0));

        scheduler.start();
        scheduler.update_settings(AutoloadSettings {
            enabled: false,
            ..settings()
        });
        settle(Duration::from_secs(60 * 60)).await;

        assert_eq!(link.requests.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.last_outcome(), None);
    }
}
