pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::store::{JsonStateStore, MemoryStateStore};
pub use adapters::webdriver::{WebDriverLauncher, WebDriverSession};
pub use adapters::webhook::WebhookNotifier;
pub use app::commands::WatchCommands;
pub use config::cli::LocalStorage;
pub use config::toml_config::WatchConfig;
pub use core::monitor::Monitor;
pub use core::threshold::ThresholdEngine;
pub use utils::error::{MonitorError, Result};

#[cfg(feature = "cli")]
pub use config::CliConfig;
