pub mod dispatch;
pub mod fetch;
pub mod monitor;
pub mod reader;
pub mod retry;
pub mod session;
pub mod threshold;

pub use crate::domain::model::{Amount, ScrapeResult, TenantDoc, TenantId, WatchedProject};
pub use crate::domain::ports::{BrowserSession, Notifier, SessionLauncher, StateStore, Storage};
pub use crate::utils::error::Result;
