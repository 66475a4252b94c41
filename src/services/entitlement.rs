//! Organization entitlements — which course-builder modules an organization
//! may use.
//!
//! Rows live in `organization_entitlements` and are managed elsewhere; this
//! service only reads them. Lookups are cached per organization for a fixed
//! TTL so route handlers can check entitlements without a query per request.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub type Entitlements = BTreeMap<String, bool>;

#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::error::ErrorCode for EntitlementError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "E_DATABASE",
        }
    }
}

/// Load the entitlement map for one organization. Unknown organizations
/// yield an empty map.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_entitlements(pool: &PgPool, organization_id: Uuid) -> Result<Entitlements, EntitlementError> {
    let rows = sqlx::query(
        "SELECT module_key, enabled FROM organization_entitlements WHERE organization_id = $1 ORDER BY module_key",
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;

    let mut map = Entitlements::new();
    for row in rows {
        map.insert(row.try_get("module_key")?, row.try_get("enabled")?);
    }
    Ok(map)
}

// =============================================================================
// CACHE
// =============================================================================

/// Per-organization TTL cache. Cheap to clone; clones share entries.
#[derive(Clone)]
pub struct EntitlementCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<Uuid, (Instant, Entitlements)>>>,
}

impl EntitlementCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Cached map if present and younger than the TTL.
    pub async fn get(&self, organization_id: Uuid) -> Option<Entitlements> {
        let entries = self.entries.read().await;
        entries
            .get(&organization_id)
            .filter(|(loaded_at, _)| loaded_at.elapsed() < self.ttl)
            .map(|(_, map)| map.clone())
    }

    pub async fn insert(&self, organization_id: Uuid, map: Entitlements) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, (loaded_at, _)| loaded_at.elapsed() < self.ttl);
        entries.insert(organization_id, (Instant::now(), map));
    }

    /// Cached lookup, falling back to the database on a miss or expiry.
    ///
    /// # Errors
    ///
    /// Returns a database error if the fallback query fails.
    pub async fn load(&self, pool: &PgPool, organization_id: Uuid) -> Result<Entitlements, EntitlementError> {
        if let Some(map) = self.get(organization_id).await {
            debug!(%organization_id, "entitlements: cache hit");
            return Ok(map);
        }
        let map = list_entitlements(pool, organization_id).await?;
        debug!(%organization_id, modules = map.len(), "entitlements: loaded");
        self.insert(organization_id, map.clone()).await;
        Ok(map)
    }
}

#[cfg(test)]
#[path = "entitlement_test.rs"]
mod tests;
