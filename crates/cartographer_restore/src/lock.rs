//! Per-tenant mutual exclusion.
//!
//! Capture, restore and eviction for one tenant never overlap. Different
//! tenants proceed independently. A tenant's entry is dropped from the
//! registry once nobody holds or waits for its lock.

use cartographer_core::TenantId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry = Arc<Mutex<HashMap<TenantId, Arc<AsyncMutex<()>>>>>;

/// Registry of per-tenant locks.
#[derive(Debug, Default, Clone)]
pub struct TenantLocks {
    locks: Registry,
}

impl TenantLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock of `tenant`.
    #[tracing::instrument(skip(self), fields(tenant = %tenant))]
    pub async fn lock(&self, tenant: &TenantId) -> TenantGuard {
        let lock = self.entry(tenant);
        let guard = lock.lock_owned().await;
        tracing::trace!("Tenant lock acquired");
        self.guard(tenant, guard)
    }

    /// Take the lock of `tenant` only if it is free.
    pub fn try_lock(&self, tenant: &TenantId) -> Option<TenantGuard> {
        let guard = self.entry(tenant).try_lock_owned().ok()?;
        Some(self.guard(tenant, guard))
    }

    /// Number of tenants whose lock is held or awaited.
    pub fn tracked(&self) -> usize {
        self.registry().len()
    }

    fn entry(&self, tenant: &TenantId) -> Arc<AsyncMutex<()>> {
        self.registry().entry(tenant.clone()).or_default().clone()
    }

    fn guard(&self, tenant: &TenantId, guard: OwnedMutexGuard<()>) -> TenantGuard {
        TenantGuard {
            tenant: tenant.clone(),
            guard: Some(guard),
            registry: Arc::clone(&self.locks),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<TenantId, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drop the entry of `tenant` when the registry holds the last reference.
fn release(registry: &Registry, tenant: &TenantId) {
    let mut locks = registry.lock().unwrap_or_else(|e| e.into_inner());
    if locks
        .get(tenant)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        locks.remove(tenant);
    }
}

/// Proof that the holder owns a tenant's lock. Released on drop.
#[derive(Debug)]
pub struct TenantGuard {
    tenant: TenantId,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry,
}

impl TenantGuard {
    /// Tenant this guard locks.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        // Unlock first so the guard's own reference no longer counts.
        drop(self.guard.take());
        release(&self.registry, &self.tenant);
    }
}
