#![allow(dead_code)]

use async_trait::async_trait;
use funding_watch::adapters::store::MemoryStateStore;
use funding_watch::core::fetch::ProjectFetcher;
use funding_watch::core::reader::{PageReader, ReaderSettings, DEFAULT_FUNDING_SELECTOR, DEFAULT_IMAGE_SELECTOR, DEFAULT_TITLE_SELECTOR};
use funding_watch::core::session::SessionManager;
use funding_watch::domain::alert::{Alert, AlertKind};
use funding_watch::domain::model::{Destination, FieldPath, TenantId, WatchedProject};
use funding_watch::domain::ports::{BrowserSession, DriverResult, ElementHandle, Notifier, SessionLauncher, StateStore};
use funding_watch::utils::error::{DriverError, MonitorError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: Option<String>,
    pub funding: Option<String>,
    pub image: Option<String>,
}

impl FakePage {
    pub fn new(title: &str, funding: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            funding: Some(funding.to_string()),
            image: None,
        }
    }

    pub fn with_image(mut self, src: &str) -> Self {
        self.image = Some(src.to_string());
        self
    }
}

/// Pages served to every browser launched from the same site.
#[derive(Clone, Default)]
pub struct FakeSite {
    pages: Arc<Mutex<HashMap<String, FakePage>>>,
    broken: Arc<Mutex<HashSet<String>>>,
    visits: Arc<AtomicUsize>,
    launches: Arc<AtomicUsize>,
}

impl FakeSite {
    pub fn set_page(&self, url: &str, page: FakePage) {
        self.pages.lock().unwrap().insert(url.to_string(), page);
    }

    pub fn set_funding(&self, url: &str, funding: &str) {
        if let Some(page) = self.pages.lock().unwrap().get_mut(url) {
            page.funding = Some(funding.to_string());
        }
    }

    /// Navigation to `url` fails the way a crashed renderer does.
    pub fn break_url(&self, url: &str) {
        self.broken.lock().unwrap().insert(url.to_string());
    }

    pub fn visits(&self) -> usize {
        self.visits.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn launcher(&self) -> FakeLauncher {
        FakeLauncher { site: self.clone() }
    }
}

pub struct FakeBrowser {
    site: FakeSite,
    current: Mutex<Option<FakePage>>,
}

impl FakeBrowser {
    fn field(&self, element: &ElementHandle) -> Option<String> {
        let current = self.current.lock().unwrap();
        let page = current.as_ref()?;
        match element.0.as_str() {
            "title" => page.title.clone(),
            "funding" => page.funding.clone(),
            "image" => page.image.clone(),
            _ => None,
        }
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.site.visits.fetch_add(1, Ordering::SeqCst);
        if self.site.broken.lock().unwrap().contains(url) {
            return Err(DriverError::Protocol {
                error: "unknown error".to_string(),
                message: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }
        let page = self.site.pages.lock().unwrap().get(url).cloned();
        *self.current.lock().unwrap() = page;
        Ok(())
    }

    async fn find_visible(&self, selector: &str) -> DriverResult<Option<ElementHandle>> {
        let name = match selector {
            DEFAULT_TITLE_SELECTOR => "title",
            DEFAULT_FUNDING_SELECTOR => "funding",
            DEFAULT_IMAGE_SELECTOR => "image",
            _ => return Ok(None),
        };
        let handle = ElementHandle(name.to_string());
        Ok(self.field(&handle).map(|_| handle))
    }

    async fn text(&self, element: &ElementHandle) -> DriverResult<String> {
        self.field(element).ok_or_else(|| DriverError::Protocol {
            error: "stale element reference".to_string(),
            message: element.0.clone(),
        })
    }

    async fn child_attribute(&self, element: &ElementHandle, _tag: &str, _attribute: &str) -> DriverResult<Option<String>> {
        Ok(self.field(element))
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok("https://tumblbug.com/".to_string())
    }

    async fn page_source(&self) -> DriverResult<String> {
        Ok("<html></html>".to_string())
    }

    async fn screenshot_png(&self) -> DriverResult<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn quit(&self) -> DriverResult<()> {
        Ok(())
    }
}

pub struct FakeLauncher {
    site: FakeSite,
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    type Session = FakeBrowser;

    async fn launch(&self) -> Result<FakeBrowser> {
        self.site.launches.fetch_add(1, Ordering::SeqCst);
        Ok(FakeBrowser {
            site: self.site.clone(),
            current: Mutex::new(None),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Destination, Alert)>>,
    panic_on: Mutex<Option<String>>,
}

impl RecordingNotifier {
    /// Panic instead of delivering alerts whose title contains `needle`.
    pub fn panic_on_title(&self, needle: &str) {
        *self.panic_on.lock().unwrap() = Some(needle.to_string());
    }

    pub fn sent(&self) -> Vec<(Destination, Alert)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<AlertKind> {
        self.sent().into_iter().map(|(_, alert)| alert.kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, destination: &Destination, alert: &Alert) -> Result<()> {
        let panic_on = self.panic_on.lock().unwrap().clone();
        if let Some(needle) = panic_on {
            if alert.title.contains(&needle) {
                panic!("notifier blew up on {}", alert.title);
            }
        }
        if destination.as_str().contains("broken") {
            return Err(MonitorError::Dispatch {
                destination: destination.to_string(),
                message: "HTTP 404".to_string(),
            });
        }
        self.sent.lock().unwrap().push((destination.clone(), alert.clone()));
        Ok(())
    }
}

/// Short element waits so missing elements time out quickly.
pub fn fast_reader() -> PageReader {
    PageReader::new(ReaderSettings {
        element_timeout: Duration::from_millis(30),
        poll_interval: Duration::from_millis(5),
        ..Default::default()
    })
}

pub fn fetcher(site: &FakeSite) -> Arc<ProjectFetcher<FakeLauncher>> {
    let sessions = Arc::new(SessionManager::new(site.launcher()));
    Arc::new(ProjectFetcher::new(sessions, fast_reader()))
}

pub async fn watch(store: &MemoryStateStore, tenant: &TenantId, project_id: &str, project: WatchedProject) {
    store
        .upsert_field(tenant, &FieldPath::project(project_id), serde_json::to_value(&project).unwrap())
        .await
        .unwrap();
}

pub async fn register_destination(store: &MemoryStateStore, tenant: &TenantId, destination: &str) {
    let mut destinations = store
        .get(tenant)
        .await
        .unwrap()
        .map(|doc| doc.destinations)
        .unwrap_or_default();
    destinations.push(Destination::new(destination));
    store
        .upsert_field(tenant, &FieldPath::destinations(), serde_json::to_value(&destinations).unwrap())
        .await
        .unwrap();
}
