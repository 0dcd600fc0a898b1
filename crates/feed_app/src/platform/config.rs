use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use feed_core::Settings;
use feed_logging::{feed_error, feed_info, feed_warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// RON settings file, re-read when its modification time changes.
pub struct ConfigStore {
    path: PathBuf,
    modified: Option<SystemTime>,
    current: Settings,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            modified: None,
            current: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Initial load. Falls back to defaults when the file is missing or malformed.
    pub fn load(&mut self) -> Settings {
        self.modified = modified_time(&self.path);
        match read_settings(&self.path) {
            Ok(settings) => {
                feed_info!("Loaded settings from {:?}", self.path);
                self.current = settings;
            }
            Err(ConfigError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                feed_warn!("No config at {:?}, using defaults", self.path);
            }
            Err(err) => {
                feed_error!("Config {:?} not usable, using defaults: {}", self.path, err);
            }
        }
        self.current.clone()
    }

    /// Returns new settings when the file changed and parsed to something different.
    /// A malformed edit keeps the previous settings.
    pub fn refresh(&mut self) -> Option<Settings> {
        let modified = modified_time(&self.path);
        if modified.is_none() || modified == self.modified {
            return None;
        }
        self.modified = modified;

        match read_settings(&self.path) {
            Ok(settings) if settings != self.current => {
                feed_info!("Settings reloaded from {:?}", self.path);
                self.current = settings.clone();
                Some(settings)
            }
            Ok(_) => None,
            Err(err) => {
                feed_error!("Keeping previous settings: {}", err);
                None
            }
        }
    }
}

/// Fixed cadence for config polling that a steady stream of messages cannot postpone.
pub struct RefreshTimer {
    every: Duration,
    next: Instant,
}

impl RefreshTimer {
    pub fn new(every: Duration, now: Instant) -> Self {
        Self {
            every,
            next: now + every,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    /// True once per period. The next deadline counts from `now`.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.every;
        true
    }
}

fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(ron::from_str(&content)?)
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_core::SortType;
    use pretty_assertions::assert_eq;
    use std::fs::File;

    fn write(path: &Path, content: &str, offset_secs: u64) {
        fs::write(path, content).unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(offset_secs))
            .unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::new(dir.path().join("absent.ron"));

        assert_eq!(store.load(), Settings::default());
        assert_eq!(store.refresh(), None);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("itemfeed.ron");
        write(
            &path,
            r#"(
                identity: "client-1",
                region_code: Some("com"),
                sort_type: date_desc,
                autoload: (enabled: true, window: (hour_start: "23:00", hour_end: "03:00")),
            )"#,
            0,
        );
        let mut store = ConfigStore::new(&path);

        let settings = store.load();

        assert_eq!(settings.identity, "client-1");
        assert_eq!(settings.region_code.as_deref(), Some("com"));
        assert_eq!(settings.sort_type, SortType::DateDesc);
        assert!(settings.autoload.enabled);
        assert_eq!(settings.autoload.window.hour_end, "03:00");
        assert_eq!(settings.autoload.jitter.min, 5);
        assert_eq!(settings.snapshot_limit, 100);
    }

    #[test]
    fn refresh_reports_only_real_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("itemfeed.ron");
        write(&path, "(sort_type: price_desc)", 0);
        let mut store = ConfigStore::new(&path);
        store.load();

        assert_eq!(store.refresh(), None);

        write(&path, "(sort_type: price_asc)", 10);
        let refreshed = store.refresh().expect("changed settings");
        assert_eq!(refreshed.sort_type, SortType::PriceAsc);

        write(&path, "(sort_type: price_asc)", 20);
        assert_eq!(store.refresh(), None);
    }

    #[test]
    fn malformed_edit_keeps_previous_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("itemfeed.ron");
        write(&path, "(hide_duplicate_thumbnail: true)", 0);
        let mut store = ConfigStore::new(&path);
        assert!(store.load().hide_duplicate_thumbnail);

        write(&path, "(hide_duplicate_thumbnail: ", 10);
        assert_eq!(store.refresh(), None);

        write(&path, "(hide_duplicate_thumbnail: true, snapshot_limit: 50)", 20);
        assert_eq!(store.refresh().map(|s| s.snapshot_limit), Some(50));
    }

    #[test]
    fn refresh_timer_fires_while_messages_keep_arriving() {
        let start = Instant::now();
        let mut timer = RefreshTimer::new(Duration::from_secs(2), start);

        // Messages every 500 ms never let a receive time out.
        let mut fired = Vec::new();
        for step in 1..=10u64 {
            let now = start + Duration::from_millis(500 * step);
            if timer.fire(now) {
                fired.push(step);
            }
        }

        assert_eq!(fired, vec![4, 8]);
    }

    #[test]
    fn refresh_timer_remaining_counts_down_to_zero() {
        let start = Instant::now();
        let mut timer = RefreshTimer::new(Duration::from_secs(2), start);

        assert_eq!(timer.remaining(start), Duration::from_secs(2));
        assert_eq!(
            timer.remaining(start + Duration::from_millis(1500)),
            Duration::from_millis(500)
        );
        assert_eq!(timer.remaining(start + Duration::from_secs(3)), Duration::ZERO);

        assert!(timer.fire(start + Duration::from_secs(3)));
        assert_eq!(
            timer.remaining(start + Duration::from_secs(3)),
            Duration::from_secs(2)
        );
    }
}
