use crate::domain::alert::Alert;
use crate::domain::model::{Destination, TenantId};
use crate::domain::ports::{Notifier, StateStore};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: Vec<Destination>,
}

/// Fans an alert out to every destination of a tenant. Delivery is best effort:
/// failures are logged per destination and never returned to the caller.
pub struct Dispatcher<N: Notifier, S: StateStore> {
    notifier: Arc<N>,
    store: Arc<S>,
}

impl<N: Notifier, S: StateStore> Dispatcher<N, S> {
    pub fn new(notifier: Arc<N>, store: Arc<S>) -> Self {
        Self { notifier, store }
    }

    pub async fn dispatch(&self, tenant: &TenantId, alert: &Alert) -> DispatchReport {
        let destinations = match self.store.get(tenant).await {
            Ok(Some(doc)) => doc.destinations,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!("Could not load destinations for tenant {}: {}", tenant, e);
                return DispatchReport::default();
            }
        };

        if destinations.is_empty() {
            tracing::debug!("Tenant {} has no destinations, dropping alert: {}", tenant, alert.title);
            return DispatchReport::default();
        }

        let mut report = DispatchReport::default();
        for destination in destinations {
            match self.notifier.send(&destination, alert).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::error!("Message delivery failed: {} - {}", destination, e);
                    report.failed.push(destination);
                }
            }
        }

        tracing::debug!(
            "Alert `{}` for tenant {}: {} delivered, {} failed",
            alert.title,
            tenant,
            report.delivered,
            report.failed.len()
        );
        report
    }
}
