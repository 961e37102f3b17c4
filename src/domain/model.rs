use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use url::Url;

/// Funding amounts are whole currency units.
pub type Amount = u64;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A delivery target registered by a tenant. The shipped notifier treats it as a webhook URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(pub String);

impl Destination {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedProject {
    pub url: String,
    pub title: String,
    /// Funding at or after the last milestone crossing. `None` until the first successful read.
    #[serde(default)]
    pub initial_funding: Option<Amount>,
    #[serde(default)]
    pub thresholds: BTreeSet<Amount>,
}

impl WatchedProject {
    pub fn new(url: impl Into<String>, title: impl Into<String>, initial_funding: Option<Amount>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            initial_funding,
            thresholds: BTreeSet::new(),
        }
    }
}

/// Per-tenant aggregate as persisted by the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDoc {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub watch_list: BTreeMap<String, WatchedProject>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
}

impl TenantDoc {
    pub fn empty(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            watch_list: BTreeMap::new(),
            destinations: Vec::new(),
        }
    }

    pub fn project_by_title(&self, title: &str) -> Option<(&String, &WatchedProject)> {
        self.watch_list.iter().find(|(_, project)| project.title == title)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeResult {
    pub title: Option<String>,
    pub funding_amount: Option<Amount>,
    pub image_url: Option<String>,
}

/// Key path into a tenant document, addressed segment by segment so that
/// project ids containing dots stay a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn destinations() -> Self {
        Self::new(["destinations"])
    }

    pub fn project(project_id: &str) -> Self {
        Self::new(["watch_list", project_id])
    }

    pub fn initial_funding(project_id: &str) -> Self {
        Self::new(["watch_list", project_id, "initial_funding"])
    }

    pub fn thresholds(project_id: &str) -> Self {
        Self::new(["watch_list", project_id, "thresholds"])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Project ids are the first path segment of the project URL.
pub fn extract_project_id(project_url: &str) -> Option<String> {
    let parsed = Url::parse(project_url).ok()?;
    parsed
        .path_segments()?
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}
