// Concrete implementations of the domain ports: tenant document stores,
// the WebDriver browser session and the webhook notifier.

pub mod store;
pub mod webdriver;
pub mod webhook;
