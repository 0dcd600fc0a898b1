use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use feed_core::{Notification, SurfaceEvent};
use feed_logging::{feed_debug, feed_info, feed_warn};

use crate::SurfaceOracle;

/// A display consumer of catalog and connection events.
pub trait Surface: Send {
    fn name(&self) -> &str;
    fn deliver(&mut self, event: &SurfaceEvent);

    /// Queue this surface is showing, if it may be reloaded by the scheduler.
    fn reload_target(&self) -> Option<String> {
        None
    }
}

pub trait Notifier: Send {
    fn notify(&mut self, notification: &Notification);
}

#[derive(Default)]
pub struct FanOut {
    surfaces: Vec<Box<dyn Surface>>,
    notifiers: Vec<Box<dyn Notifier>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_surface(&mut self, surface: Box<dyn Surface>) {
        feed_debug!("Surface {} attached", surface.name());
        self.surfaces.push(surface);
    }

    pub fn add_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn broadcast(&mut self, event: &SurfaceEvent) {
        for surface in &mut self.surfaces {
            surface.deliver(event);
        }
    }

    pub fn notify(&mut self, notification: &Notification) {
        for notifier in &mut self.notifiers {
            notifier.notify(notification);
        }
    }

    /// First surface claiming a reload target wins.
    pub fn eligible_surface(&self) -> Option<String> {
        self.surfaces
            .iter()
            .find_map(|surface| surface.reload_target())
    }
}

/// `FanOut` shared between the dispatch loop and the reload scheduler.
#[derive(Clone, Default)]
pub struct SharedFanOut(Arc<Mutex<FanOut>>);

impl SharedFanOut {
    pub fn new(fan_out: FanOut) -> Self {
        Self(Arc::new(Mutex::new(fan_out)))
    }

    pub fn lock(&self) -> MutexGuard<'_, FanOut> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn broadcast(&self, event: &SurfaceEvent) {
        self.lock().broadcast(event);
    }

    pub fn notify(&self, notification: &Notification) {
        self.lock().notify(notification);
    }
}

impl SurfaceOracle for SharedFanOut {
    fn eligible_surface(&self) -> Option<String> {
        self.lock().eligible_surface()
    }
}

/// Forwards every event into a channel.
pub struct ChannelSurface {
    name: String,
    tx: mpsc::Sender<SurfaceEvent>,
    reload_target: Option<String>,
}

impl ChannelSurface {
    pub fn new(name: impl Into<String>, tx: mpsc::Sender<SurfaceEvent>) -> Self {
        Self {
            name: name.into(),
            tx,
            reload_target: None,
        }
    }

    pub fn with_reload_target(mut self, queue: impl Into<String>) -> Self {
        self.reload_target = Some(queue.into());
        self
    }
}

impl Surface for ChannelSurface {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, event: &SurfaceEvent) {
        if self.tx.send(event.clone()).is_err() {
            feed_debug!("Surface {} receiver dropped", self.name);
        }
    }

    fn reload_target(&self) -> Option<String> {
        self.reload_target.clone()
    }
}

/// Writes a one-line summary of each event to the log.
pub struct LogSurface {
    name: String,
    reload_target: Option<String>,
}

impl LogSurface {
    pub fn new(name: impl Into<String>, reload_target: Option<String>) -> Self {
        Self {
            name: name.into(),
            reload_target,
        }
    }
}

impl Surface for LogSurface {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, event: &SurfaceEvent) {
        match event {
            SurfaceEvent::ConnectionOpen => feed_info!("[{}] connection open", self.name),
            SurfaceEvent::ConnectionClosed { reason } => {
                feed_info!("[{}] connection closed: {}", self.name, reason)
            }
            SurfaceEvent::ConnectionError { message } => {
                feed_warn!("[{}] connection error: {}", self.name, message)
            }
            SurfaceEvent::ItemAdded {
                record,
                position,
                created,
                duplicate_image,
            } => feed_info!(
                "[{}] {} {} at #{}{}",
                self.name,
                if *created { "added" } else { "updated" },
                record.id,
                position,
                if *duplicate_image { " (duplicate image)" } else { "" }
            ),
            SurfaceEvent::SnapshotLoaded { records } => {
                feed_info!("[{}] snapshot loaded, {} listings", self.name, records.len())
            }
            SurfaceEvent::ValueChanged { id, min, max, .. } => {
                feed_debug!("[{}] {} value {:?}..{:?}", self.name, id, min, max)
            }
            SurfaceEvent::TierChanged { id, tier, .. } => {
                feed_debug!("[{}] {} tier {:?}", self.name, id, tier)
            }
            SurfaceEvent::VariantsChanged { id, variants } => {
                feed_debug!("[{}] {} has {} variants", self.name, id, variants.len())
            }
            SurfaceEvent::ItemUnavailable { id, reason } => feed_info!(
                "[{}] {} unavailable{}",
                self.name,
                id,
                reason
                    .as_deref()
                    .map(|reason| format!(": {reason}"))
                    .unwrap_or_default()
            ),
            SurfaceEvent::ItemEvicted { id } => feed_debug!("[{}] {} evicted", self.name, id),
            SurfaceEvent::Reordered { ids } => {
                feed_debug!("[{}] reordered {} listings", self.name, ids.len())
            }
            SurfaceEvent::ReloadSurface { queue_class, page } => feed_info!(
                "[{}] reload requested for {:?} page {:?}",
                self.name,
                queue_class,
                page
            ),
        }
    }

    fn reload_target(&self) -> Option<String> {
        self.reload_target.clone()
    }
}

#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, notification: &Notification) {
        feed_info!(
            "New listing {}: {} ({:?}..{:?})",
            notification.id,
            notification.title.as_deref().unwrap_or("untitled"),
            notification.estimated_value_min,
            notification.estimated_value_max
        );
    }
}
