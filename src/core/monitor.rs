use crate::core::dispatch::Dispatcher;
use crate::core::fetch::ProjectFetcher;
use crate::core::threshold::ThresholdEngine;
use crate::domain::alert::Alert;
use crate::domain::model::{Amount, FieldPath, TenantId, WatchedProject};
use crate::domain::ports::{Notifier, SessionLauncher, StateStore};
use crate::utils::error::Result;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Ticking,
    Sleeping,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tenants: usize,
    pub projects: usize,
    pub alerts: usize,
    pub skipped: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectOutcome {
    /// The page did not yield both a title and a funding amount.
    Incomplete,
    Started { funding: Amount },
    Checked { alerts: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub engine: ThresholdEngine,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            engine: ThresholdEngine::default(),
        }
    }
}

/// Periodic sweep over every tenant's watch list.
pub struct Monitor<L: SessionLauncher, S: StateStore, N: Notifier> {
    fetcher: Arc<ProjectFetcher<L>>,
    store: Arc<S>,
    dispatcher: Dispatcher<N, S>,
    settings: MonitorSettings,
    state: watch::Sender<MonitorState>,
}

impl<L: SessionLauncher, S: StateStore, N: Notifier> Monitor<L, S, N> {
    pub fn new(fetcher: Arc<ProjectFetcher<L>>, store: Arc<S>, notifier: Arc<N>, settings: MonitorSettings) -> Self {
        let dispatcher = Dispatcher::new(notifier, Arc::clone(&store));
        let (state, _) = watch::channel(MonitorState::Idle);
        Self {
            fetcher,
            store,
            dispatcher,
            settings,
            state,
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Ticks, sleeps and ticks again until `shutdown` resolves. A tick or sleep
    /// in progress at shutdown is abandoned and the browser session closed.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            "🚀 Monitor started, checking every {:?}",
            self.settings.interval
        );

        loop {
            self.state.send_replace(MonitorState::Ticking);
            tokio::select! {
                report = self.tick() => {
                    tracing::info!(
                        "✅ Tick finished: {} tenant(s), {} project(s), {} alert(s), {} skipped, {} failed",
                        report.tenants,
                        report.projects,
                        report.alerts,
                        report.skipped,
                        report.failures
                    );
                }
                _ = &mut shutdown => break,
            }

            self.state.send_replace(MonitorState::Sleeping);
            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = &mut shutdown => break,
            }
        }

        tracing::info!("Monitor stopping");
        self.fetcher.sessions().shutdown().await;
        self.state.send_replace(MonitorState::Idle);
    }

    /// One sweep over all tenants and projects. Failures stay inside their project.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let tenants = match self.store.tenants().await {
            Ok(tenants) => tenants,
            Err(e) => {
                tracing::error!("Could not list tenants, skipping tick: {}", e);
                report.failures += 1;
                return report;
            }
        };

        for tenant in tenants {
            report.tenants += 1;
            for (project_id, project) in &tenant.watch_list {
                report.projects += 1;
                let processed = AssertUnwindSafe(self.process_project(&tenant.tenant_id, project_id, project))
                    .catch_unwind()
                    .await;

                match processed {
                    Ok(Ok(ProjectOutcome::Incomplete)) => report.skipped += 1,
                    Ok(Ok(ProjectOutcome::Started { .. })) => report.alerts += 1,
                    Ok(Ok(ProjectOutcome::Checked { alerts })) => report.alerts += alerts,
                    Ok(Err(e)) => {
                        report.failures += 1;
                        tracing::error!("Price check failed: {} - {}", project.url, e);
                    }
                    Err(_) => {
                        report.failures += 1;
                        tracing::error!("Price check panicked: {}", project.url);
                    }
                }
            }
        }

        report
    }

    pub async fn process_project(
        &self,
        tenant: &TenantId,
        project_id: &str,
        project: &WatchedProject,
    ) -> Result<ProjectOutcome> {
        let scraped = self.fetcher.fetch(&project.url).await?;

        let (Some(current), Some(scraped_title)) = (scraped.funding_amount, scraped.title.as_deref()) else {
            tracing::warn!("Incomplete project page, skipping this cycle: {}", project.url);
            return Ok(ProjectOutcome::Incomplete);
        };

        // 第一次成功讀取：記錄初始金額並通知開始監控
        let Some(previous) = project.initial_funding else {
            self.store
                .upsert_field(tenant, &FieldPath::initial_funding(project_id), serde_json::json!(current))
                .await?;
            tracing::info!("Monitoring started for {} at {}", project.url, current);
            self.dispatcher
                .dispatch(tenant, &Alert::monitoring_started(&project.url, current))
                .await;
            return Ok(ProjectOutcome::Started { funding: current });
        };

        let title = if project.title.is_empty() {
            scraped_title
        } else {
            project.title.as_str()
        };
        let evaluation = self.settings.engine.evaluate(previous, current, &project.thresholds);

        if let Some(milestone) = evaluation.milestone() {
            tracing::info!("🎉 {} crossed milestone {}", project.url, milestone);
            let alert = Alert::milestone(title, &project.url, milestone, current)
                .with_thumbnail(scraped.image_url.clone());
            self.dispatcher.dispatch(tenant, &alert).await;
        }
        // 先通知再寫入，寫入失敗時下一輪會重發通知
        if evaluation.new_initial_funding != previous {
            self.store
                .upsert_field(
                    tenant,
                    &FieldPath::initial_funding(project_id),
                    serde_json::json!(evaluation.new_initial_funding),
                )
                .await?;
        }

        for threshold in evaluation.crossed_thresholds() {
            tracing::info!("🎯 {} crossed threshold {}", project.url, threshold);
            let alert = Alert::threshold(title, &project.url, threshold, current);
            self.dispatcher.dispatch(tenant, &alert).await;
        }
        if evaluation.remaining_thresholds != project.thresholds {
            self.store
                .upsert_field(
                    tenant,
                    &FieldPath::thresholds(project_id),
                    serde_json::to_value(&evaluation.remaining_thresholds)?,
                )
                .await?;
        }

        Ok(ProjectOutcome::Checked {
            alerts: evaluation.events.len(),
        })
    }
}
