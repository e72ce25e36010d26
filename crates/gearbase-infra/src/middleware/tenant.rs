//! Tenant resolution middleware
//!
//! Reads the tenant key from the request, resolves it through the tenant router and
//! attaches the resulting [`TenantContext`] to the request extensions. Handlers behind
//! this middleware only ever see the pool of the tenant the request was addressed to.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;
use gearbase_core::{normalize_tenant_key, TenancyConfig, TenancyError};
use gearbase_tenancy::{TenantConnection, TenantConnector, TenantRouter};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::HttpAppError;

/// Where a request's tenant key comes from.
///
/// The configured header wins. Without it, the first label of `Host` is used when the
/// host is a direct subdomain of the base domain (`acme.gearbase.app`).
#[derive(Debug, Clone)]
pub struct TenantKeySource {
    header: HeaderName,
    base_domain: Option<String>,
}

impl TenantKeySource {
    pub fn new(header: &str, base_domain: Option<&str>) -> Result<Self> {
        let header = HeaderName::from_bytes(header.trim().as_bytes())
            .with_context(|| format!("Invalid tenant header name '{}'", header))?;
        let base_domain = base_domain
            .map(|domain| domain.trim().trim_matches('.').to_ascii_lowercase())
            .filter(|domain| !domain.is_empty());

        Ok(Self {
            header,
            base_domain,
        })
    }

    pub fn from_config(config: &TenancyConfig) -> Result<Self> {
        Self::new(&config.tenant_header, config.tenant_base_domain.as_deref())
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// The normalized tenant key, if the request names one.
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        let from_header = headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(normalize_tenant_key)
            .filter(|key| !key.is_empty());

        from_header.or_else(|| self.key_from_host(headers))
    }

    fn key_from_host(&self, headers: &HeaderMap) -> Option<String> {
        let base = self.base_domain.as_deref()?;
        let host = headers.get(header::HOST)?.to_str().ok()?;
        let host = host
            .split(':')
            .next()
            .unwrap_or_default()
            .trim_end_matches('.')
            .to_ascii_lowercase();

        let label = host.strip_suffix(base)?.strip_suffix('.')?;
        if label.is_empty() || label.contains('.') {
            return None;
        }
        Some(label.to_string())
    }
}

/// The tenant a request was resolved to.
pub struct TenantContext<H> {
    pub key: String,
    pub tenant_id: Uuid,
    connection: Arc<TenantConnection<H>>,
}

impl<H> TenantContext<H> {
    pub fn new(connection: Arc<TenantConnection<H>>) -> Self {
        Self {
            key: connection.key().to_string(),
            tenant_id: connection.tenant_id(),
            connection,
        }
    }

    /// Handle on the tenant's isolated store.
    pub fn pool(&self) -> &H {
        self.connection.handle()
    }
}

impl<H> Clone for TenantContext<H> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            tenant_id: self.tenant_id,
            connection: Arc::clone(&self.connection),
        }
    }
}

impl<H> std::fmt::Debug for TenantContext<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantContext")
            .field("key", &self.key)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

pub type PgTenantContext = TenantContext<sqlx::PgPool>;

/// State for [`tenant_connection_middleware`].
pub struct TenantResolverState<C: TenantConnector> {
    pub router: TenantRouter<C>,
    pub source: TenantKeySource,
}

impl<C: TenantConnector> TenantResolverState<C> {
    pub fn new(router: TenantRouter<C>, source: TenantKeySource) -> Self {
        Self { router, source }
    }
}

impl<C: TenantConnector> Clone for TenantResolverState<C> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            source: self.source.clone(),
        }
    }
}

/// Resolve the request's tenant and expose it to handlers as `Extension<TenantContext<_>>`.
///
/// Install with `axum::middleware::from_fn_with_state(state, tenant_connection_middleware::<C>)`.
pub async fn tenant_connection_middleware<C: TenantConnector>(
    State(state): State<TenantResolverState<C>>,
    mut request: Request,
    next: Next,
) -> Result<Response, HttpAppError> {
    let key = state
        .source
        .extract(request.headers())
        .ok_or(TenancyError::MissingTenantKey)?;

    let connection = state.router.resolve(&key).await?;
    let context = TenantContext::new(connection);
    let span = tracing::info_span!("tenant", tenant_key = %context.key, tenant_id = %context.tenant_id);

    request.extensions_mut().insert(context);
    Ok(next.run(request).instrument(span).await)
}
