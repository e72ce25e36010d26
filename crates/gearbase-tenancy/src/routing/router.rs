//! Tenant connection router
//!
//! Maps a tenant key to a live handle on that tenant's isolated store and caches it.
//!
//! Every key has at most one slot in the cache. A slot is either `Ready` (a handle that
//! can be returned) or `Pending` (a creation in flight). A miss installs a `Pending`
//! slot and spawns one background task that looks the tenant up and opens the handle;
//! every caller that misses on the same key meanwhile subscribes to that task's
//! outcome instead of opening its own handle. The cache lock is only held for map
//! operations, never across directory or store I/O, so one tenant's cold start does
//! not block another's.
//!
//! Because the creation runs on its own task, a caller that gives up (timeout, client
//! disconnect) does not strand the other waiters.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gearbase_core::models::{ConnectionDescriptor, Tenant};
use gearbase_core::{normalize_tenant_key, AppError, TenancyConfig, TenancyError};
use gearbase_db::TenantDirectory;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use super::connector::TenantConnector;

const DEFAULT_OPEN_TIMEOUT_SECS: u64 = 10;

/// A cached handle on one tenant's isolated store.
pub struct TenantConnection<H> {
    key: String,
    tenant_id: Uuid,
    descriptor: ConnectionDescriptor,
    handle: H,
    opened_at: Instant,
    validated_at: Instant,
}

impl<H> TenantConnection<H> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// When the underlying handle was opened.
    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// When the tenant's status was last confirmed against the directory.
    pub fn validated_at(&self) -> Instant {
        self.validated_at
    }
}

impl<H> fmt::Debug for TenantConnection<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConnection")
            .field("key", &self.key)
            .field("tenant_id", &self.tenant_id)
            .field("store", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Router tuning knobs.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Age after which a cached entry is revalidated against the directory before it
    /// is handed out again. `None` keeps entries until they are invalidated.
    pub ttl: Option<Duration>,
    /// Upper bound on opening a single tenant handle.
    pub open_timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            open_timeout: Duration::from_secs(DEFAULT_OPEN_TIMEOUT_SECS),
        }
    }
}

impl RouterOptions {
    pub fn from_config(config: &TenancyConfig) -> Self {
        Self {
            ttl: config.tenant_cache_ttl(),
            open_timeout: config.tenant_connect_timeout(),
        }
    }
}

type Resolved<H> = Result<Arc<TenantConnection<H>>, TenancyError>;

#[derive(Clone)]
enum FlightOutcome<H> {
    Done(Resolved<H>),
    /// The slot was invalidated while the creation was running; resolve again.
    Superseded,
}

type OutcomeReceiver<H> = watch::Receiver<Option<FlightOutcome<H>>>;

struct Flight<H> {
    outcome: OutcomeReceiver<H>,
}

impl<H> Flight<H> {
    /// The creating task went away without reporting (it panicked).
    fn is_abandoned(&self) -> bool {
        self.outcome.has_changed().is_err()
    }
}

enum Slot<H> {
    Ready(Arc<TenantConnection<H>>),
    Pending(Arc<Flight<H>>),
}

enum Lookup<H> {
    Hit(Arc<TenantConnection<H>>),
    Wait(OutcomeReceiver<H>),
}

struct RouterInner<C: TenantConnector> {
    directory: Arc<dyn TenantDirectory>,
    connector: C,
    options: RouterOptions,
    slots: RwLock<HashMap<String, Slot<C::Handle>>>,
    shut_down: AtomicBool,
}

/// Per-process tenant connection cache.
///
/// Construct once at startup, share by cloning, and call [`TenantRouter::shutdown`]
/// when the process stops.
pub struct TenantRouter<C: TenantConnector> {
    inner: Arc<RouterInner<C>>,
}

impl<C: TenantConnector> Clone for TenantRouter<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: TenantConnector> TenantRouter<C> {
    pub fn new(directory: Arc<dyn TenantDirectory>, connector: C, options: RouterOptions) -> Self {
        tracing::info!(
            ttl = ?options.ttl,
            open_timeout = ?options.open_timeout,
            "Tenant router initialized"
        );
        Self {
            inner: Arc::new(RouterInner {
                directory,
                connector,
                options,
                slots: RwLock::new(HashMap::new()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Resolve a tenant key to a handle on its isolated store.
    ///
    /// # Errors
    ///
    /// - `MissingTenantKey` if the key is blank
    /// - `TenantNotFound` if no tenant has this key
    /// - `TenantInactive` if the tenant exists but is deactivated
    /// - `StoreUnreachable` if the tenant's store could not be opened
    /// - `ControlPlaneUnavailable` if the directory lookup failed
    /// - `RouterShutDown` after [`TenantRouter::shutdown`]
    pub async fn resolve(&self, key: &str) -> Resolved<C::Handle> {
        let key = normalize_tenant_key(key);
        if key.is_empty() {
            return Err(TenancyError::MissingTenantKey);
        }

        loop {
            if self.inner.is_shut_down() {
                return Err(TenancyError::RouterShutDown);
            }

            let fast = {
                let slots = self.inner.slots.read().await;
                match slots.get(&key) {
                    Some(Slot::Ready(conn)) if self.inner.is_fresh(conn) => {
                        Some(Lookup::Hit(Arc::clone(conn)))
                    }
                    Some(Slot::Pending(flight)) if !flight.is_abandoned() => {
                        Some(Lookup::Wait(flight.outcome.clone()))
                    }
                    _ => None,
                }
            };

            let lookup = match fast {
                Some(lookup) => lookup,
                None => self.join_or_start(&key).await,
            };

            let outcome = match lookup {
                Lookup::Hit(conn) => return Ok(conn),
                Lookup::Wait(rx) => wait_for_outcome(rx).await,
            };

            match outcome {
                FlightOutcome::Done(result) => return result,
                FlightOutcome::Superseded => {
                    tracing::debug!(tenant_key = %key, "Tenant resolution superseded, retrying");
                }
            }
        }
    }

    /// Close and evict the cached handle for `key`. Returns whether anything was
    /// evicted. A creation in flight for the key is superseded: its handle is closed
    /// and its waiters resolve again.
    pub async fn invalidate(&self, key: &str) -> bool {
        let key = normalize_tenant_key(key);
        let removed = self.inner.slots.write().await.remove(&key);

        match removed {
            Some(Slot::Ready(conn)) => {
                self.inner.connector.close(&conn.handle).await;
                tracing::info!(tenant_key = %key, "Invalidated cached tenant connection");
                true
            }
            Some(Slot::Pending(_)) => {
                tracing::info!(tenant_key = %key, "Invalidated in-flight tenant connection");
                true
            }
            None => false,
        }
    }

    /// Close and evict every cached handle. Returns the number of evicted slots.
    pub async fn invalidate_all(&self) -> usize {
        let drained: Vec<(String, Slot<C::Handle>)> =
            self.inner.slots.write().await.drain().collect();
        let count = drained.len();

        for (_, slot) in drained {
            if let Slot::Ready(conn) = slot {
                self.inner.connector.close(&conn.handle).await;
            }
        }

        tracing::info!(evicted = count, "Invalidated all tenant connections");
        count
    }

    /// Stop serving resolutions and close every cached handle.
    pub async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        let evicted = self.invalidate_all().await;
        tracing::info!(evicted, "Tenant router shut down");
    }

    /// Keys with a ready handle, sorted.
    pub async fn cached_keys(&self) -> Vec<String> {
        let slots = self.inner.slots.read().await;
        let mut keys: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of slots, ready or in flight.
    pub async fn len(&self) -> usize {
        self.inner.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Slow path: under the write lock, either join an existing flight or start one.
    async fn join_or_start(&self, key: &str) -> Lookup<C::Handle> {
        let mut slots = self.inner.slots.write().await;

        let previous = match slots.get(key) {
            Some(Slot::Ready(conn)) if self.inner.is_fresh(conn) => {
                return Lookup::Hit(Arc::clone(conn));
            }
            Some(Slot::Pending(flight)) if !flight.is_abandoned() => {
                return Lookup::Wait(flight.outcome.clone());
            }
            Some(Slot::Ready(conn)) => Some(Arc::clone(conn)),
            Some(Slot::Pending(_)) | None => None,
        };

        let (tx, rx) = watch::channel(None);
        let flight = Arc::new(Flight {
            outcome: rx.clone(),
        });
        slots.insert(key.to_string(), Slot::Pending(Arc::clone(&flight)));
        drop(slots);

        tokio::spawn(Arc::clone(&self.inner).run_flight(key.to_string(), flight, tx, previous));
        Lookup::Wait(rx)
    }
}

impl<C: TenantConnector> RouterInner<C> {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn is_fresh(&self, conn: &TenantConnection<C::Handle>) -> bool {
        match self.options.ttl {
            Some(ttl) => conn.validated_at.elapsed() < ttl,
            None => true,
        }
    }

    async fn run_flight(
        self: Arc<Self>,
        key: String,
        flight: Arc<Flight<C::Handle>>,
        tx: watch::Sender<Option<FlightOutcome<C::Handle>>>,
        previous: Option<Arc<TenantConnection<C::Handle>>>,
    ) {
        let (result, retired) = self.establish(&key, previous).await;

        let mut slots = self.slots.write().await;
        let still_current = matches!(
            slots.get(&key),
            Some(Slot::Pending(current)) if Arc::ptr_eq(current, &flight)
        );

        let mut to_close: Vec<C::Handle> = retired.into_iter().collect();
        let outcome = if still_current && !self.is_shut_down() {
            match &result {
                Ok(conn) => {
                    slots.insert(key.clone(), Slot::Ready(Arc::clone(conn)));
                }
                Err(_) => {
                    slots.remove(&key);
                }
            }
            FlightOutcome::Done(result)
        } else {
            if still_current {
                slots.remove(&key);
            }
            if let Ok(conn) = result {
                to_close.push(conn.handle.clone());
            }
            tracing::debug!(tenant_key = %key, "Discarding superseded tenant connection");
            FlightOutcome::Superseded
        };
        drop(slots);

        for handle in &to_close {
            self.connector.close(handle).await;
        }

        tx.send_replace(Some(outcome));
    }

    /// Look the tenant up and produce a handle, reusing `previous` when the tenant is
    /// still active on the same store. The second value is a handle that must be
    /// closed because it no longer belongs in the cache.
    async fn establish(
        &self,
        key: &str,
        previous: Option<Arc<TenantConnection<C::Handle>>>,
    ) -> (Resolved<C::Handle>, Option<C::Handle>) {
        let tenant = match self.directory.find_tenant_by_key(key).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                tracing::debug!(tenant_key = %key, "Tenant not found");
                let retired = previous.map(|conn| conn.handle.clone());
                return (Err(TenancyError::TenantNotFound(key.to_string())), retired);
            }
            Err(err) => {
                let err = control_plane_error(err);
                if let Some(conn) = previous {
                    // The tenant was valid at its last check; keep serving it and let
                    // the next request retry the revalidation.
                    tracing::warn!(
                        tenant_key = %key,
                        error = %err,
                        "Revalidation failed, keeping cached tenant connection"
                    );
                    return (Ok(conn), None);
                }
                tracing::error!(tenant_key = %key, error = %err, "Tenant lookup failed");
                return (Err(err), None);
            }
        };

        if !tenant.status.is_active() {
            tracing::info!(tenant_key = %key, tenant_id = %tenant.id, "Rejected inactive tenant");
            let retired = previous.map(|conn| conn.handle.clone());
            return (Err(TenancyError::TenantInactive(key.to_string())), retired);
        }

        let mut retired = None;
        if let Some(conn) = previous {
            if conn.tenant_id == tenant.id && conn.descriptor == tenant.connection_descriptor {
                tracing::debug!(tenant_key = %key, "Revalidated cached tenant connection");
                return (
                    Ok(Arc::new(TenantConnection {
                        key: conn.key.clone(),
                        tenant_id: conn.tenant_id,
                        descriptor: conn.descriptor.clone(),
                        handle: conn.handle.clone(),
                        opened_at: conn.opened_at,
                        validated_at: Instant::now(),
                    })),
                    None,
                );
            }
            tracing::info!(tenant_key = %key, "Tenant store changed, replacing connection");
            retired = Some(conn.handle.clone());
        }

        (self.open(key, tenant).await, retired)
    }

    async fn open(&self, key: &str, tenant: Tenant) -> Resolved<C::Handle> {
        let descriptor = tenant.connection_descriptor;
        let opened = tokio::time::timeout(
            self.options.open_timeout,
            self.connector.open(key, &descriptor),
        )
        .await;

        let handle = match opened {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => {
                tracing::error!(tenant_key = %key, store = %descriptor, error = %err, "Tenant store unreachable");
                return Err(TenancyError::StoreUnreachable {
                    key: key.to_string(),
                    reason: format!("{:#}", err),
                });
            }
            Err(_) => {
                tracing::error!(
                    tenant_key = %key,
                    store = %descriptor,
                    timeout = ?self.options.open_timeout,
                    "Timed out opening tenant store"
                );
                return Err(TenancyError::StoreUnreachable {
                    key: key.to_string(),
                    reason: format!("timed out after {:?}", self.options.open_timeout),
                });
            }
        };

        let now = Instant::now();
        Ok(Arc::new(TenantConnection {
            key: key.to_string(),
            tenant_id: tenant.id,
            descriptor,
            handle,
            opened_at: now,
            validated_at: now,
        }))
    }
}

async fn wait_for_outcome<H: Clone>(mut rx: OutcomeReceiver<H>) -> FlightOutcome<H> {
    match rx.wait_for(|outcome| outcome.is_some()).await {
        Ok(outcome) => outcome.clone().unwrap_or(FlightOutcome::Superseded),
        Err(_) => FlightOutcome::Superseded,
    }
}

fn control_plane_error(err: AppError) -> TenancyError {
    match err {
        AppError::Tenancy(inner) => inner,
        other => TenancyError::ControlPlaneUnavailable(other.to_string()),
    }
}
