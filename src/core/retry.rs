use crate::domain::model::{FieldPath, TenantDoc, TenantId};
use crate::domain::ports::StateStore;
use crate::utils::error::{MonitorError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Runs `op` up to `attempts` times, sleeping `delay` between tries.
    /// Validation failures are returned immediately since repeating them cannot help.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> std::result::Result<T, (u32, MonitorError)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e @ MonitorError::ValidationError { .. }) => return Err((attempt, e)),
                Err(e) if attempt >= attempts => return Err((attempt, e)),
                Err(e) => {
                    tracing::warn!("{} failed (attempt {}/{}): {}", label, attempt, attempts, e);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Decorates a store so writes are retried; an exhausted write becomes one `MonitorError::Store`.
pub struct RetryingStore<S: StateStore> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: StateStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn store_error(tenant: &TenantId, path: &FieldPath, attempts: u32, cause: MonitorError) -> MonitorError {
    MonitorError::Store {
        tenant: tenant.to_string(),
        path: path.to_string(),
        attempts,
        message: cause.to_string(),
    }
}

#[async_trait]
impl<S: StateStore> StateStore for RetryingStore<S> {
    async fn get(&self, tenant: &TenantId) -> Result<Option<TenantDoc>> {
        self.inner.get(tenant).await
    }

    async fn upsert_field(&self, tenant: &TenantId, path: &FieldPath, value: serde_json::Value) -> Result<()> {
        let label = format!("Store update {} for tenant {}", path, tenant);
        self.policy
            .run(&label, || self.inner.upsert_field(tenant, path, value.clone()))
            .await
            .map_err(|(attempts, e)| store_error(tenant, path, attempts, e))
    }

    async fn unset_field(&self, tenant: &TenantId, path: &FieldPath) -> Result<()> {
        let label = format!("Store removal {} for tenant {}", path, tenant);
        self.policy
            .run(&label, || self.inner.unset_field(tenant, path))
            .await
            .map_err(|(attempts, e)| store_error(tenant, path, attempts, e))
    }

    async fn tenants(&self) -> Result<Vec<TenantDoc>> {
        self.inner.tenants().await
    }
}
