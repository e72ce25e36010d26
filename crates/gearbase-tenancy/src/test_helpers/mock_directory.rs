//! In-memory tenant directory

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gearbase_core::models::{ConnectionDescriptor, NewTenant, Tenant, TenantStatus};
use gearbase_core::{normalize_tenant_key, AppError, TenancyError};
use gearbase_db::TenantDirectory;

#[derive(Clone, Default)]
pub struct MockDirectory {
    tenants: Arc<Mutex<HashMap<String, Tenant>>>,
    lookups: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
    reject_inserts: Arc<AtomicBool>,
    insert_delay: Arc<Mutex<Duration>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        let directory = Self::new();
        for tenant in tenants {
            directory.add_tenant(tenant);
        }
        directory
    }

    pub fn add_tenant(&self, tenant: Tenant) {
        self.tenants
            .lock()
            .unwrap()
            .insert(tenant.key.clone(), tenant);
    }

    pub fn get(&self, key: &str) -> Option<Tenant> {
        self.tenants.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.tenants.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_status(&self, key: &str, status: TenantStatus) {
        if let Some(tenant) = self.tenants.lock().unwrap().get_mut(key) {
            tenant.status = status;
            tenant.version += 1;
        }
    }

    pub fn set_descriptor(&self, key: &str, descriptor: ConnectionDescriptor) {
        if let Some(tenant) = self.tenants.lock().unwrap().get_mut(key) {
            tenant.connection_descriptor = descriptor;
            tenant.version += 1;
        }
    }

    /// Number of `find_tenant_by_key` calls served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Make every call fail as if the control-plane store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn reject_inserts(&self, reject: bool) {
        self.reject_inserts.store(reject, Ordering::SeqCst);
    }

    /// Commit inserts immediately but answer the caller only after `delay`.
    pub fn set_insert_delay(&self, delay: Duration) {
        *self.insert_delay.lock().unwrap() = delay;
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Internal("control-plane store is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory for MockDirectory {
    async fn find_tenant_by_key(&self, key: &str) -> Result<Option<Tenant>, AppError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.get(&normalize_tenant_key(key)))
    }

    async fn insert_tenant(&self, tenant: NewTenant) -> Result<Tenant, AppError> {
        self.check_available()?;
        if self.reject_inserts.load(Ordering::SeqCst) {
            return Err(AppError::Internal("insert rejected".to_string()));
        }

        let key = normalize_tenant_key(&tenant.key);
        let row = self.commit_insert(key, tenant)?;

        let delay = *self.insert_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(row)
    }
}

impl MockDirectory {
    fn commit_insert(&self, key: String, tenant: NewTenant) -> Result<Tenant, AppError> {
        let mut tenants = self.tenants.lock().unwrap();
        if tenants.contains_key(&key) || tenants.values().any(|t| t.id == tenant.id) {
            return Err(TenancyError::DuplicateKey(key).into());
        }

        let now = Utc::now();
        let row = Tenant {
            id: tenant.id,
            key: key.clone(),
            name: tenant.name,
            contact_email: tenant.contact_email,
            contact_phone: tenant.contact_phone,
            notes: tenant.notes,
            connection_descriptor: tenant.connection_descriptor,
            status: TenantStatus::Active,
            plan_id: tenant.plan_id,
            subscription_status: None,
            current_period_start: None,
            current_period_end: None,
            trial_start: None,
            trial_end: None,
            canceled_at: None,
            cancel_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        tenants.insert(key, row.clone());
        Ok(row)
    }
}
