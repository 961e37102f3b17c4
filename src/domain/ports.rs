use crate::domain::alert::Alert;
use crate::domain::model::{Destination, FieldPath, TenantDoc, TenantId};
use crate::utils::error::{DriverError, Result};
use async_trait::async_trait;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// File names (not paths) directly inside `dir`. A missing directory is empty.
    fn list_files(&self, dir: &str) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
}

/// Narrow contract over the per-tenant documents.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, tenant: &TenantId) -> Result<Option<TenantDoc>>;

    /// Point update at `path`, creating the tenant document and any intermediate objects.
    async fn upsert_field(&self, tenant: &TenantId, path: &FieldPath, value: serde_json::Value) -> Result<()>;

    async fn unset_field(&self, tenant: &TenantId, path: &FieldPath) -> Result<()>;

    /// Every tenant document. Order is unspecified.
    async fn tenants(&self) -> Result<Vec<TenantDoc>>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &Destination, alert: &Alert) -> Result<()>;
}

/// Opaque reference to an element inside the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle(pub String);

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// The first element matching `selector` if it exists and is displayed.
    async fn find_visible(&self, selector: &str) -> DriverResult<Option<ElementHandle>>;

    async fn text(&self, element: &ElementHandle) -> DriverResult<String>;

    /// Attribute of the first descendant of `element` with the given tag name.
    async fn child_attribute(
        &self,
        element: &ElementHandle,
        tag: &str,
        attribute: &str,
    ) -> DriverResult<Option<String>>;

    async fn current_url(&self) -> DriverResult<String>;

    async fn page_source(&self) -> DriverResult<String>;

    async fn screenshot_png(&self) -> DriverResult<Vec<u8>>;

    async fn quit(&self) -> DriverResult<()>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: BrowserSession + 'static;

    async fn launch(&self) -> Result<Self::Session>;
}
