//! Configuration module
//!
//! Environment-driven configuration for the control-plane connection, tenant store
//! provisioning, the connection router cache, and request-side tenant resolution.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::models::ConnectionDescriptor;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const TENANT_POOL_MAX_CONNECTIONS: u32 = 5;
const TENANT_CONNECT_TIMEOUT_SECS: u64 = 10;
const TENANT_CACHE_TTL_SECS: u64 = 300;
const PROVISIONING_STEP_TIMEOUT_SECS: u64 = 120;
const TENANT_DATABASE_PREFIX: &str = "tenant_";
const MAX_TENANT_DATABASE_PREFIX_LENGTH: usize = 20;
const TENANT_MIGRATIONS_DIR: &str = "tenant_migrations";
const TENANT_HEADER: &str = "x-tenant-subdomain";
const DATABASE_PLACEHOLDER: &str = "{database}";

/// What the provisioner does with a store it created when a later step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPolicy {
    /// Leave the store in place for an operator to inspect.
    Leave,
    /// Drop the store as a compensating action.
    Drop,
}

impl FromStr for CleanupPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "leave" => Ok(CleanupPolicy::Leave),
            "drop" => Ok(CleanupPolicy::Drop),
            other => Err(anyhow!(
                "PROVISIONING_CLEANUP must be 'leave' or 'drop', got '{}'",
                other
            )),
        }
    }
}

#[derive(Clone)]
pub struct TenancyConfig {
    pub environment: String,
    pub control_plane_database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// Tenant store URL with a `{database}` placeholder.
    pub tenant_database_url_template: String,
    pub tenant_database_prefix: String,
    pub tenant_pool_max_connections: u32,
    pub tenant_connect_timeout_secs: u64,
    /// 0 disables TTL revalidation; entries then live until invalidated.
    pub tenant_cache_ttl_secs: u64,
    pub provisioning_step_timeout_secs: u64,
    pub provisioning_cleanup: CleanupPolicy,
    pub tenant_migrations_dir: String,
    pub tenant_header: String,
    pub tenant_base_domain: Option<String>,
}

// Connection URLs carry credentials; keep them out of Debug output.
impl std::fmt::Debug for TenancyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenancyConfig")
            .field("environment", &self.environment)
            .field(
                "control_plane_database_url",
                &ConnectionDescriptor::new(self.control_plane_database_url.clone()),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_timeout_seconds", &self.db_timeout_seconds)
            .field("tenant_database_prefix", &self.tenant_database_prefix)
            .field(
                "tenant_pool_max_connections",
                &self.tenant_pool_max_connections,
            )
            .field(
                "tenant_connect_timeout_secs",
                &self.tenant_connect_timeout_secs,
            )
            .field("tenant_cache_ttl_secs", &self.tenant_cache_ttl_secs)
            .field(
                "provisioning_step_timeout_secs",
                &self.provisioning_step_timeout_secs,
            )
            .field("provisioning_cleanup", &self.provisioning_cleanup)
            .field("tenant_migrations_dir", &self.tenant_migrations_dir)
            .field("tenant_header", &self.tenant_header)
            .field("tenant_base_domain", &self.tenant_base_domain)
            .finish_non_exhaustive()
    }
}

impl TenancyConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let control_plane_database_url = lookup("CONTROL_PLANE_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "CONTROL_PLANE_DATABASE_URL (or DATABASE_URL) must be set to the tenant directory database"
                )
            })?;

        let tenant_database_url_template = match lookup("TENANT_DATABASE_URL_TEMPLATE") {
            Some(template) => template,
            None => derive_tenant_url_template(&control_plane_database_url)?,
        };

        let provisioning_cleanup = match lookup("PROVISIONING_CLEANUP") {
            Some(value) => value.parse()?,
            None => CleanupPolicy::Leave,
        };

        let config = TenancyConfig {
            environment,
            control_plane_database_url,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(&lookup, "DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            tenant_database_url_template,
            tenant_database_prefix: lookup("TENANT_DATABASE_PREFIX")
                .unwrap_or_else(|| TENANT_DATABASE_PREFIX.to_string()),
            tenant_pool_max_connections: parse_or(
                &lookup,
                "TENANT_POOL_MAX_CONNECTIONS",
                TENANT_POOL_MAX_CONNECTIONS,
            ),
            tenant_connect_timeout_secs: parse_or(
                &lookup,
                "TENANT_CONNECT_TIMEOUT_SECS",
                TENANT_CONNECT_TIMEOUT_SECS,
            ),
            tenant_cache_ttl_secs: parse_or(&lookup, "TENANT_CACHE_TTL_SECS", TENANT_CACHE_TTL_SECS),
            provisioning_step_timeout_secs: parse_or(
                &lookup,
                "PROVISIONING_STEP_TIMEOUT_SECS",
                PROVISIONING_STEP_TIMEOUT_SECS,
            ),
            provisioning_cleanup,
            tenant_migrations_dir: lookup("TENANT_MIGRATIONS_DIR")
                .unwrap_or_else(|| TENANT_MIGRATIONS_DIR.to_string()),
            tenant_header: lookup("TENANT_HEADER")
                .map(|s| s.trim().to_ascii_lowercase())
                .unwrap_or_else(|| TENANT_HEADER.to_string()),
            tenant_base_domain: lookup("TENANT_BASE_DOMAIN")
                .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|s| !s.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tenant_database_url_template.contains(DATABASE_PLACEHOLDER) {
            return Err(anyhow!(
                "TENANT_DATABASE_URL_TEMPLATE must contain the {} placeholder",
                DATABASE_PLACEHOLDER
            ));
        }

        let prefix = &self.tenant_database_prefix;
        let prefix_ok = !prefix.is_empty()
            && prefix.len() <= MAX_TENANT_DATABASE_PREFIX_LENGTH
            && prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            && !prefix.starts_with(|c: char| c.is_ascii_digit());
        if !prefix_ok {
            return Err(anyhow!(
                "TENANT_DATABASE_PREFIX must be 1-{} characters of lowercase letters, digits or underscores, not starting with a digit",
                MAX_TENANT_DATABASE_PREFIX_LENGTH
            ));
        }

        if self.tenant_pool_max_connections == 0 {
            return Err(anyhow!("TENANT_POOL_MAX_CONNECTIONS must be at least 1"));
        }

        if self.tenant_connect_timeout_secs == 0 || self.provisioning_step_timeout_secs == 0 {
            return Err(anyhow!(
                "TENANT_CONNECT_TIMEOUT_SECS and PROVISIONING_STEP_TIMEOUT_SECS must be positive"
            ));
        }

        if self.tenant_header.is_empty() {
            return Err(anyhow!("TENANT_HEADER cannot be empty"));
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Connection descriptor for a tenant store with the given database name.
    pub fn descriptor_for(&self, store_name: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::new(
            self.tenant_database_url_template
                .replace(DATABASE_PLACEHOLDER, store_name),
        )
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.db_timeout_seconds)
    }

    pub fn tenant_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.tenant_connect_timeout_secs)
    }

    pub fn tenant_cache_ttl(&self) -> Option<Duration> {
        match self.tenant_cache_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn provisioning_step_timeout(&self) -> Duration {
        Duration::from_secs(self.provisioning_step_timeout_secs)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(name)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Replace the database path segment of a Postgres URL with the `{database}`
/// placeholder, keeping credentials, host and query parameters.
fn derive_tenant_url_template(control_plane_url: &str) -> Result<String> {
    let (base, query) = match control_plane_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (control_plane_url, None),
    };

    let authority_start = base
        .find("://")
        .map(|i| i + 3)
        .ok_or_else(|| anyhow!("CONTROL_PLANE_DATABASE_URL is not a database URL"))?;

    let path_start = base[authority_start..]
        .find('/')
        .map(|i| authority_start + i)
        .unwrap_or(base.len());

    let mut template = format!("{}/{}", &base[..path_start], DATABASE_PLACEHOLDER);
    if let Some(query) = query {
        template.push('?');
        template.push_str(query);
    }
    Ok(template)
}
