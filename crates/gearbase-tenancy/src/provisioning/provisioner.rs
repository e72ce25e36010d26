//! Tenant provisioning
//!
//! Creates a tenant's isolated store, applies the tenant schema to it and registers
//! it in the directory. The three steps are not atomic: a failure after the store was
//! created reports `ProvisioningIncomplete` naming the step and the store, and the
//! configured [`CleanupPolicy`] decides whether that store is dropped or left for an
//! operator. Nothing is retried automatically.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gearbase_core::models::{ConnectionDescriptor, NewTenant, Tenant};
use gearbase_core::{
    store_name_for, validate_tenant_key, AppError, CleanupPolicy, ProvisioningStep,
    TenancyConfig, TenancyError,
};
use gearbase_db::TenantDirectory;
use tokio::task::JoinHandle;
use uuid::Uuid;
use validator::Validate;

use super::schema::SchemaApplier;
use super::store_admin::StoreAdmin;

/// Input for provisioning a new tenant.
#[derive(Debug, Clone, Validate)]
pub struct ProvisionRequest {
    pub key: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
    pub plan_id: Option<Uuid>,
}

impl ProvisionRequest {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        contact_email: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            contact_email: contact_email.into(),
            contact_phone: None,
            notes: None,
            plan_id: None,
        }
    }

    pub fn with_plan(mut self, plan_id: Uuid) -> Self {
        self.plan_id = Some(plan_id);
        self
    }
}

/// A registered tenant together with the descriptor of its new store.
#[derive(Debug, Clone)]
pub struct ProvisionedTenant {
    pub tenant: Tenant,
    pub store: String,
    pub descriptor: ConnectionDescriptor,
}

#[derive(Debug, Clone)]
pub struct ProvisionerOptions {
    pub store_prefix: String,
    pub step_timeout: Duration,
    pub cleanup: CleanupPolicy,
}

impl ProvisionerOptions {
    pub fn from_config(config: &TenancyConfig) -> Self {
        Self {
            store_prefix: config.tenant_database_prefix.clone(),
            step_timeout: config.provisioning_step_timeout(),
            cleanup: config.provisioning_cleanup,
        }
    }
}

#[derive(Clone)]
pub struct TenantProvisioner {
    directory: Arc<dyn TenantDirectory>,
    stores: Arc<dyn StoreAdmin>,
    schema: Arc<dyn SchemaApplier>,
    options: ProvisionerOptions,
}

impl TenantProvisioner {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        stores: Arc<dyn StoreAdmin>,
        schema: Arc<dyn SchemaApplier>,
        options: ProvisionerOptions,
    ) -> Self {
        Self {
            directory,
            stores,
            schema,
            options,
        }
    }

    /// Provision and register a new tenant.
    ///
    /// # Errors
    ///
    /// - `InvalidKey` / `InvalidInput` before anything is touched
    /// - `DuplicateKey` if the directory already has the key
    /// - `StoreAlreadyExists` if the derived store name is taken
    /// - `ProvisioningIncomplete` if a step failed after provisioning began
    pub async fn provision_tenant(
        &self,
        request: ProvisionRequest,
    ) -> Result<ProvisionedTenant, AppError> {
        let key = validate_tenant_key(&request.key)?;
        request.validate()?;

        if self.directory.find_tenant_by_key(&key).await?.is_some() {
            tracing::info!(tenant_key = %key, "Rejected provisioning of existing tenant");
            return Err(TenancyError::DuplicateKey(key).into());
        }

        let store = store_name_for(&self.options.store_prefix, &key);
        let descriptor = self.stores.descriptor_for(&store);
        tracing::info!(tenant_key = %key, store = %store, "Provisioning tenant");

        match self
            .bounded(self.stores.create_store(&store))
            .await
        {
            Ok(()) => {}
            Err(StepFailure::App(AppError::Tenancy(err @ TenancyError::StoreAlreadyExists { .. }))) => {
                tracing::warn!(tenant_key = %key, store = %store, "Tenant store already exists");
                return Err(err.into());
            }
            Err(failure) => {
                // A timed-out CREATE DATABASE may still have created the store; it is
                // never dropped here. `discard_orphaned_store` cleans it up.
                return Err(self.incomplete(&key, ProvisioningStep::CreateStore, &store, failure, false));
            }
        }

        if let Err(failure) = self
            .bounded(async {
                self.schema
                    .apply(&descriptor)
                    .await
                    .map_err(AppError::from)
            })
            .await
        {
            let cleaned_up = self.compensate(&key, &store).await;
            return Err(self.incomplete(&key, ProvisioningStep::ApplySchema, &store, failure, cleaned_up));
        }

        let new_tenant = NewTenant {
            id: Uuid::new_v4(),
            key: key.clone(),
            name: request.name,
            contact_email: request.contact_email,
            contact_phone: request.contact_phone,
            notes: request.notes,
            connection_descriptor: descriptor.clone(),
            plan_id: request.plan_id,
        };

        let tenant = match self
            .bounded(self.directory.insert_tenant(new_tenant))
            .await
        {
            Ok(tenant) => tenant,
            Err(failure) => {
                // The insert may have committed even though the call failed or timed out.
                match self.find_registration(&key, &descriptor).await {
                    Registration::Registered(tenant) => {
                        tracing::warn!(
                            tenant_key = %key,
                            tenant_id = %tenant.id,
                            store = %store,
                            error = %failure.reason(),
                            "Tenant registration reported failure but the row was committed"
                        );
                        tenant
                    }
                    Registration::Absent => {
                        let cleaned_up = self.compensate(&key, &store).await;
                        return Err(self.incomplete(
                            &key,
                            ProvisioningStep::RegisterTenant,
                            &store,
                            failure,
                            cleaned_up,
                        ));
                    }
                    Registration::Unknown => {
                        return Err(self.incomplete(
                            &key,
                            ProvisioningStep::RegisterTenant,
                            &store,
                            failure,
                            false,
                        ));
                    }
                }
            }
        };

        tracing::info!(
            tenant_key = %key,
            tenant_id = %tenant.id,
            store = %store,
            "Tenant provisioned"
        );

        Ok(ProvisionedTenant {
            tenant,
            store,
            descriptor,
        })
    }

    /// Run [`TenantProvisioner::provision_tenant`] on its own task.
    pub fn spawn_provision(
        &self,
        request: ProvisionRequest,
    ) -> JoinHandle<Result<ProvisionedTenant, AppError>> {
        let provisioner = self.clone();
        tokio::spawn(async move { provisioner.provision_tenant(request).await })
    }

    /// Drop the store derived from `key` when no tenant is registered under that key.
    ///
    /// Cleans up after an incomplete provisioning that left its store behind.
    /// Returns whether a store was dropped.
    pub async fn discard_orphaned_store(&self, key: &str) -> Result<bool, AppError> {
        let key = validate_tenant_key(key)?;

        if self.directory.find_tenant_by_key(&key).await?.is_some() {
            return Err(AppError::InvalidInput(format!(
                "Tenant '{}' is registered; its store is not orphaned",
                key
            )));
        }

        let store = store_name_for(&self.options.store_prefix, &key);
        if !self.stores.store_exists(&store).await? {
            tracing::info!(tenant_key = %key, store = %store, "No orphaned store to discard");
            return Ok(false);
        }

        self.stores.drop_store(&store).await?;
        tracing::info!(tenant_key = %key, store = %store, "Discarded orphaned tenant store");
        Ok(true)
    }

    async fn bounded<T, F>(&self, step: F) -> Result<T, StepFailure>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.options.step_timeout, step).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(StepFailure::App(err)),
            Err(_) => Err(StepFailure::TimedOut(self.options.step_timeout)),
        }
    }

    /// Check whether a tenant row for `key` pointing at `descriptor` exists after a
    /// failed registration. `Unknown` when the directory cannot answer.
    async fn find_registration(&self, key: &str, descriptor: &ConnectionDescriptor) -> Registration {
        match self.bounded(self.directory.find_tenant_by_key(key)).await {
            Ok(Some(tenant)) if tenant.connection_descriptor == *descriptor => {
                Registration::Registered(tenant)
            }
            // Another row owns the key; this store is not referenced by it.
            Ok(Some(_)) | Ok(None) => Registration::Absent,
            Err(failure) => {
                tracing::error!(
                    tenant_key = %key,
                    error = %failure.reason(),
                    "Could not confirm tenant registration, leaving store in place"
                );
                Registration::Unknown
            }
        }
    }

    /// Apply the cleanup policy to a store whose provisioning failed. Returns whether
    /// the store was dropped.
    async fn compensate(&self, key: &str, store: &str) -> bool {
        match self.options.cleanup {
            CleanupPolicy::Leave => false,
            CleanupPolicy::Drop => match self.stores.drop_store(store).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::error!(
                        tenant_key = %key,
                        store = %store,
                        error = %err,
                        "Failed to drop store of incomplete tenant"
                    );
                    false
                }
            },
        }
    }

    fn incomplete(
        &self,
        key: &str,
        step: ProvisioningStep,
        store: &str,
        failure: StepFailure,
        cleaned_up: bool,
    ) -> AppError {
        let reason = failure.reason();
        tracing::error!(
            tenant_key = %key,
            step = %step,
            store = %store,
            cleaned_up,
            error = %reason,
            "Tenant provisioning incomplete"
        );

        TenancyError::ProvisioningIncomplete {
            key: key.to_string(),
            step,
            store: store.to_string(),
            reason,
            cleaned_up,
        }
        .into()
    }
}

enum Registration {
    Registered(Tenant),
    Absent,
    Unknown,
}

enum StepFailure {
    App(AppError),
    TimedOut(Duration),
}

impl StepFailure {
    fn reason(&self) -> String {
        match self {
            StepFailure::App(err) => err.detailed_message(),
            StepFailure::TimedOut(limit) => format!("timed out after {:?}", limit),
        }
    }
}
