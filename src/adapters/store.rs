use crate::domain::model::{FieldPath, TenantDoc, TenantId};
use crate::domain::ports::{StateStore, Storage};
use crate::utils::error::{MonitorError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::{Mutex, RwLock};

const TENANT_DIR: &str = "tenants";

/// Sets `value` at `path` inside `doc`, creating missing objects along the way.
pub fn apply_upsert(doc: &mut Value, path: &FieldPath, value: Value) -> Result<()> {
    let (last, parents) = path
        .segments()
        .split_last()
        .ok_or_else(|| invalid_path(path, "empty path"))?;

    let mut cursor = doc;
    for segment in parents {
        cursor = cursor
            .as_object_mut()
            .ok_or_else(|| invalid_path(path, "traverses a non-object value"))?
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if cursor.is_null() {
            *cursor = Value::Object(Map::new());
        }
    }

    cursor
        .as_object_mut()
        .ok_or_else(|| invalid_path(path, "parent is not an object"))?
        .insert(last.clone(), value);
    Ok(())
}

/// Removes the value at `path`. Missing keys are not an error.
pub fn apply_unset(doc: &mut Value, path: &FieldPath) -> Result<()> {
    let (last, parents) = path
        .segments()
        .split_last()
        .ok_or_else(|| invalid_path(path, "empty path"))?;

    let mut cursor = doc;
    for segment in parents {
        match cursor.get_mut(segment.as_str()) {
            Some(next) => cursor = next,
            None => return Ok(()),
        }
    }
    if let Some(object) = cursor.as_object_mut() {
        object.remove(last);
    }
    Ok(())
}

fn invalid_path(path: &FieldPath, reason: &str) -> MonitorError {
    MonitorError::ValidationError {
        message: format!("cannot update `{}`: {}", path, reason),
    }
}

/// Applies `edit` to the document of `tenant` and checks the result still
/// deserializes as a tenant document.
fn edit_document<F>(tenant: &TenantId, current: Option<&TenantDoc>, edit: F) -> Result<TenantDoc>
where
    F: FnOnce(&mut Value) -> Result<()>,
{
    let base = match current {
        Some(doc) => doc.clone(),
        None => TenantDoc::empty(tenant.clone()),
    };
    let mut value = serde_json::to_value(base)?;
    edit(&mut value)?;
    let updated: TenantDoc = serde_json::from_value(value).map_err(|e| MonitorError::ValidationError {
        message: format!("update would corrupt tenant {}: {}", tenant, e),
    })?;
    if &updated.tenant_id != tenant {
        return Err(MonitorError::ValidationError {
            message: format!("update may not change tenant id of {}", tenant),
        });
    }
    Ok(updated)
}

#[derive(Default)]
pub struct MemoryStateStore {
    docs: RwLock<BTreeMap<TenantId, TenantDoc>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, doc: TenantDoc) {
        self.docs.write().await.insert(doc.tenant_id.clone(), doc);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, tenant: &TenantId) -> Result<Option<TenantDoc>> {
        Ok(self.docs.read().await.get(tenant).cloned())
    }

    async fn upsert_field(&self, tenant: &TenantId, path: &FieldPath, value: Value) -> Result<()> {
        let mut docs = self.docs.write().await;
        let updated = edit_document(tenant, docs.get(tenant), |doc| apply_upsert(doc, path, value))?;
        docs.insert(tenant.clone(), updated);
        Ok(())
    }

    async fn unset_field(&self, tenant: &TenantId, path: &FieldPath) -> Result<()> {
        let mut docs = self.docs.write().await;
        if let Some(current) = docs.get(tenant) {
            let updated = edit_document(tenant, Some(current), |doc| apply_unset(doc, path))?;
            docs.insert(tenant.clone(), updated);
        }
        Ok(())
    }

    async fn tenants(&self) -> Result<Vec<TenantDoc>> {
        Ok(self.docs.read().await.values().cloned().collect())
    }
}

/// One pretty-printed JSON file per tenant under `tenants/`.
pub struct JsonStateStore<St: Storage> {
    storage: St,
    write_lock: Mutex<()>,
}

impl<St: Storage> JsonStateStore<St> {
    pub fn new(storage: St) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    fn document_path(tenant: &TenantId) -> String {
        format!("{}/{}.json", TENANT_DIR, encode_file_stem(tenant.as_str()))
    }

    async fn load(&self, tenant: &TenantId) -> Result<Option<TenantDoc>> {
        match self.storage.read_file(&Self::document_path(tenant)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(MonitorError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn save(&self, doc: &TenantDoc) -> Result<()> {
        let json = serde_json::to_vec_pretty(doc)?;
        self.storage
            .write_file(&Self::document_path(&doc.tenant_id), &json)
            .await
    }
}

#[async_trait]
impl<St: Storage> StateStore for JsonStateStore<St> {
    async fn get(&self, tenant: &TenantId) -> Result<Option<TenantDoc>> {
        self.load(tenant).await
    }

    async fn upsert_field(&self, tenant: &TenantId, path: &FieldPath, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.load(tenant).await?;
        let updated = edit_document(tenant, current.as_ref(), |doc| apply_upsert(doc, path, value))?;
        self.save(&updated).await
    }

    async fn unset_field(&self, tenant: &TenantId, path: &FieldPath) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let Some(current) = self.load(tenant).await? else {
            return Ok(());
        };
        let updated = edit_document(tenant, Some(&current), |doc| apply_unset(doc, path))?;
        self.save(&updated).await
    }

    async fn tenants(&self) -> Result<Vec<TenantDoc>> {
        let mut docs = Vec::new();
        for name in self.storage.list_files(TENANT_DIR).await? {
            if !name.ends_with(".json") {
                continue;
            }
            let path = format!("{}/{}", TENANT_DIR, name);
            let bytes = self.storage.read_file(&path).await?;
            match serde_json::from_slice::<TenantDoc>(&bytes) {
                Ok(doc) => docs.push(doc),
                Err(e) => tracing::error!("Skipping unreadable tenant document {}: {}", path, e),
            }
        }
        Ok(docs)
    }
}

/// Keeps `[A-Za-z0-9_-]` and percent-encodes every other byte.
fn encode_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
