mod app;
mod config;
mod effects;

pub use app::run_app;

/// Used when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "./itemfeed.ron";
