use crate::core::dispatch::{DispatchReport, Dispatcher};
use crate::core::fetch::ProjectFetcher;
use crate::core::threshold::{Evaluation, ThresholdEngine};
use crate::domain::alert::Alert;
use crate::domain::model::{extract_project_id, Amount, Destination, FieldPath, TenantDoc, TenantId, WatchedProject};
use crate::domain::ports::{Notifier, SessionLauncher, StateStore};
use crate::utils::error::{MonitorError, Result};
use crate::utils::validation;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Autocomplete never offers more than this many titles.
pub const MAX_TITLE_SUGGESTIONS: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub project_id: String,
    pub title: String,
    pub url: String,
    pub funding: Amount,
    pub image_url: Option<String>,
}

/// One row of a live listing. `error` is set when the page could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStatus {
    pub project_id: String,
    pub title: String,
    pub url: String,
    pub current_funding: Option<Amount>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingSimulation {
    pub evaluation: Evaluation,
    pub deliveries: Vec<DispatchReport>,
}

/// Tenant-facing operations on the watch list, thresholds and destinations.
pub struct WatchCommands<L: SessionLauncher, S: StateStore, N: Notifier> {
    fetcher: Arc<ProjectFetcher<L>>,
    store: Arc<S>,
    dispatcher: Dispatcher<N, S>,
    engine: ThresholdEngine,
    allowed_url_prefix: String,
}

impl<L: SessionLauncher, S: StateStore, N: Notifier> WatchCommands<L, S, N> {
    pub fn new(
        fetcher: Arc<ProjectFetcher<L>>,
        store: Arc<S>,
        notifier: Arc<N>,
        engine: ThresholdEngine,
        allowed_url_prefix: impl Into<String>,
    ) -> Self {
        let dispatcher = Dispatcher::new(notifier, Arc::clone(&store));
        Self {
            fetcher,
            store,
            dispatcher,
            engine,
            allowed_url_prefix: allowed_url_prefix.into(),
        }
    }

    /// Creates an empty document for `tenant`. Returns `false` if one already existed.
    pub async fn ensure_tenant(&self, tenant: &TenantId) -> Result<bool> {
        if self.store.get(tenant).await?.is_some() {
            return Ok(false);
        }
        self.store
            .upsert_field(tenant, &FieldPath::destinations(), serde_json::json!([]))
            .await?;
        tracing::info!("Tenant {} initialized", tenant);
        Ok(true)
    }

    pub async fn add_project(&self, tenant: &TenantId, url: &str) -> Result<ProjectSummary> {
        let url = url.trim();
        validation::validate_project_url(url, &self.allowed_url_prefix)?;
        let project_id = extract_project_id(url)
            .ok_or_else(|| MonitorError::rejected("Could not find a project id in the link."))?;

        if let Some(doc) = self.store.get(tenant).await? {
            if doc.watch_list.contains_key(&project_id) {
                return Err(MonitorError::rejected(format!(
                    "Project `{}` is already being watched.",
                    project_id
                )));
            }
        }

        let scraped = self.fetcher.fetch(url).await?;
        let (Some(title), Some(funding)) = (scraped.title, scraped.funding_amount) else {
            return Err(MonitorError::rejected(
                "Could not read the project title or funding amount.",
            ));
        };

        let project = WatchedProject::new(url, title.clone(), Some(funding));
        self.store
            .upsert_field(tenant, &FieldPath::project(&project_id), serde_json::to_value(&project)?)
            .await?;
        tracing::info!("➕ Tenant {} now watches {} ({})", tenant, title, url);

        Ok(ProjectSummary {
            project_id,
            title,
            url: url.to_string(),
            funding,
            image_url: scraped.image_url,
        })
    }

    pub async fn stop_project(&self, tenant: &TenantId, title: &str) -> Result<WatchedProject> {
        let (project_id, project) = self.find_project(tenant, title).await?;
        self.store
            .unset_field(tenant, &FieldPath::project(&project_id))
            .await?;
        tracing::info!("➖ Tenant {} stopped watching {}", tenant, project.title);
        Ok(project)
    }

    /// Reads every watched page live. A failed read becomes an error row.
    pub async fn list_projects(&self, tenant: &TenantId) -> Result<Vec<ProjectStatus>> {
        let Some(doc) = self.store.get(tenant).await? else {
            return Ok(Vec::new());
        };

        let mut statuses = Vec::with_capacity(doc.watch_list.len());
        for (project_id, project) in doc.watch_list {
            let status = match self.fetcher.fetch(&project.url).await {
                Ok(scraped) => ProjectStatus {
                    project_id,
                    title: scraped.title.unwrap_or(project.title),
                    url: project.url,
                    current_funding: scraped.funding_amount,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!("Listing could not read {}: {}", project.url, e);
                    ProjectStatus {
                        project_id,
                        title: project.title,
                        url: project.url,
                        current_funding: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            statuses.push(status);
        }
        Ok(statuses)
    }

    pub async fn add_threshold(&self, tenant: &TenantId, title: &str, amount: Amount) -> Result<BTreeSet<Amount>> {
        let (project_id, project) = self.find_project(tenant, title).await?;
        let mut thresholds = project.thresholds;
        if !thresholds.insert(amount) {
            return Err(MonitorError::rejected(format!(
                "A threshold of {} is already set for {}.",
                crate::domain::alert::format_price(amount),
                project.title
            )));
        }

        self.store
            .upsert_field(tenant, &FieldPath::thresholds(&project_id), serde_json::to_value(&thresholds)?)
            .await?;
        Ok(thresholds)
    }

    pub async fn clear_thresholds(&self, tenant: &TenantId, title: &str) -> Result<()> {
        let (project_id, _) = self.find_project(tenant, title).await?;
        self.store
            .upsert_field(tenant, &FieldPath::thresholds(&project_id), serde_json::json!([]))
            .await
    }

    pub async fn list_thresholds(&self, tenant: &TenantId, title: &str) -> Result<BTreeSet<Amount>> {
        let (_, project) = self.find_project(tenant, title).await?;
        Ok(project.thresholds)
    }

    pub async fn add_destination(&self, tenant: &TenantId, destination: &str) -> Result<()> {
        let destination = destination.trim();
        validation::validate_url("destination", destination)
            .map_err(|_| MonitorError::rejected(format!("`{}` is not a valid webhook URL.", destination)))?;

        let mut destinations = self.document(tenant).await?.destinations;
        if destinations.iter().any(|d| d.as_str() == destination) {
            return Err(MonitorError::rejected("This destination is already registered."));
        }
        destinations.push(Destination::new(destination));

        self.store
            .upsert_field(tenant, &FieldPath::destinations(), serde_json::to_value(&destinations)?)
            .await
    }

    pub async fn remove_destination(&self, tenant: &TenantId, destination: &str) -> Result<()> {
        let destination = destination.trim();
        let mut destinations = self.document(tenant).await?.destinations;
        let before = destinations.len();
        destinations.retain(|d| d.as_str() != destination);
        if destinations.len() == before {
            return Err(MonitorError::rejected("This destination is not registered."));
        }

        self.store
            .upsert_field(tenant, &FieldPath::destinations(), serde_json::to_value(&destinations)?)
            .await
    }

    /// Runs the engine against a made-up amount and sends the resulting alerts.
    /// Consumed thresholds are persisted; the stored baseline is left alone.
    pub async fn test_funding(&self, tenant: &TenantId, title: &str, amount: Amount) -> Result<FundingSimulation> {
        let (project_id, project) = self.find_project(tenant, title).await?;
        let baseline = project.initial_funding.unwrap_or(0);
        if amount < baseline {
            return Err(MonitorError::rejected(format!(
                "The test amount must be at least the current baseline of {}.",
                crate::domain::alert::format_price(baseline)
            )));
        }

        let evaluation = self.engine.evaluate(baseline, amount, &project.thresholds);
        let mut deliveries = Vec::new();

        if let Some(milestone) = evaluation.milestone() {
            let alert = Alert::milestone(&project.title, &project.url, milestone, amount);
            deliveries.push(self.dispatcher.dispatch(tenant, &alert).await);
        }
        for threshold in evaluation.crossed_thresholds() {
            let alert = Alert::threshold(&project.title, &project.url, threshold, amount);
            deliveries.push(self.dispatcher.dispatch(tenant, &alert).await);
        }

        if evaluation.remaining_thresholds != project.thresholds {
            self.store
                .upsert_field(
                    tenant,
                    &FieldPath::thresholds(&project_id),
                    serde_json::to_value(&evaluation.remaining_thresholds)?,
                )
                .await?;
        }

        Ok(FundingSimulation { evaluation, deliveries })
    }

    /// Titles containing `needle`, case-insensitively, in watch-list order.
    pub async fn matching_titles(&self, tenant: &TenantId, needle: &str) -> Result<Vec<String>> {
        let Some(doc) = self.store.get(tenant).await? else {
            return Ok(Vec::new());
        };
        let needle = needle.to_lowercase();
        Ok(doc
            .watch_list
            .into_values()
            .map(|project| project.title)
            .filter(|title| title.to_lowercase().contains(&needle))
            .take(MAX_TITLE_SUGGESTIONS)
            .collect())
    }

    async fn document(&self, tenant: &TenantId) -> Result<TenantDoc> {
        Ok(self
            .store
            .get(tenant)
            .await?
            .unwrap_or_else(|| TenantDoc::empty(tenant.clone())))
    }

    async fn find_project(&self, tenant: &TenantId, title: &str) -> Result<(String, WatchedProject)> {
        let doc = self
            .store
            .get(tenant)
            .await?
            .ok_or_else(|| MonitorError::not_found("No projects are being watched."))?;
        doc.project_by_title(title)
            .map(|(id, project)| (id.clone(), project.clone()))
            .ok_or_else(|| MonitorError::not_found(format!("No watched project titled `{}`.", title)))
    }
}
