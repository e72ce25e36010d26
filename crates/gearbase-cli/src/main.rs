//! Gearbase CLI: operator commands for the tenant registry.
//!
//! Reads the same environment as the services (CONTROL_PLANE_DATABASE_URL,
//! TENANT_DATABASE_URL_TEMPLATE, ...); a `.env` file is honored.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gearbase_cli::{init_tracing, plan_row, require_found, tenant_row, TENANT_TABLE_HEADER};
use gearbase_core::models::{Tenant, TenantStatus};
use gearbase_core::{normalize_tenant_key, TenancyConfig};
use gearbase_db::{connect_control_plane, PlanRepository, TenantRepository};
use gearbase_infra::LogFormat;
use gearbase_tenancy::{
    MigratorSchema, PgStoreAdmin, PgTenantConnector, PgTenantRouter, ProvisionRequest,
    ProvisionerOptions, RouterOptions, TenantProvisioner,
};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Parser)]
#[command(name = "gearbase", about = "Gearbase tenant registry CLI")]
struct Cli {
    /// Log output format: pretty or json
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    /// Print results as JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a tenant's database, apply the tenant schema and register it
    Provision {
        /// Subdomain key, e.g. "acme-tools"
        key: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Contact email
        #[arg(long)]
        email: String,
        /// Plan slug from the catalog
        #[arg(long)]
        plan: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show one tenant
    Show { key: String },
    /// List tenants
    List {
        /// Filter by status: active or inactive
        #[arg(long)]
        status: Option<TenantStatus>,
    },
    /// Allow a tenant to serve traffic again
    Activate { key: String },
    /// Stop a tenant from serving traffic
    Deactivate { key: String },
    /// Open the tenant's pool through the router and run a probe query
    Check { key: String },
    /// Drop the database left behind by an incomplete provisioning
    DiscardStore { key: String },
    /// List active plans
    Plans,
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn print_tenants(tenants: &[Tenant], json: bool) -> Result<()> {
    if json {
        return print_json(&tenants);
    }
    println!("{}", TENANT_TABLE_HEADER);
    for tenant in tenants {
        println!("{}", tenant_row(tenant));
    }
    Ok(())
}

async fn require_tenant(repo: &TenantRepository, key: &str) -> Result<Tenant> {
    let row = repo.find_tenant_by_key(key).await?;
    Ok(require_found(row, format_args!("Tenant '{}'", normalize_tenant_key(key)))?)
}

async fn set_status(
    repo: &TenantRepository,
    key: &str,
    status: TenantStatus,
    json: bool,
) -> Result<()> {
    let tenant = require_tenant(repo, key).await?;
    if tenant.status == status {
        println!("Tenant '{}' is already {}", tenant.key, status);
        return Ok(());
    }

    let updated = repo
        .update_tenant_status(tenant.id, status, tenant.version)
        .await?;
    tracing::info!(tenant_key = %updated.key, status = %status, "Tenant status changed");
    print_tenants(&[updated], json)
}

fn provisioner(pool: &PgPool, config: &TenancyConfig) -> TenantProvisioner {
    TenantProvisioner::new(
        Arc::new(TenantRepository::new(pool.clone())),
        Arc::new(PgStoreAdmin::new(pool.clone(), config.clone())),
        Arc::new(MigratorSchema::from_config(config)),
        ProvisionerOptions::from_config(config),
    )
}

async fn check(pool: &PgPool, config: &TenancyConfig, key: &str) -> Result<()> {
    let router = PgTenantRouter::new(
        Arc::new(TenantRepository::new(pool.clone())),
        PgTenantConnector::from_config(config),
        RouterOptions::from_config(config),
    );

    let outcome = async {
        let conn = router.resolve(key).await?;
        sqlx::query("SELECT 1")
            .execute(conn.handle())
            .await
            .context("Probe query failed")?;
        Ok::<_, anyhow::Error>(conn.tenant_id())
    }
    .await;
    router.shutdown().await;

    let tenant_id = outcome?;
    println!(
        "Tenant '{}' ({}) is reachable",
        normalize_tenant_key(key),
        tenant_id
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let config = TenancyConfig::from_env().context("Failed to load configuration")?;
    let pool = connect_control_plane(&config).await?;
    let tenants = TenantRepository::new(pool.clone());
    let plans = PlanRepository::new(pool.clone());

    match cli.command {
        Commands::Provision {
            key,
            name,
            email,
            plan,
            phone,
            notes,
        } => {
            let mut request = ProvisionRequest::new(key, name, email);
            if let Some(slug) = plan {
                let row = plans.find_plan_by_slug(&slug).await?;
                let plan = require_found(row, format_args!("Plan '{}'", slug))?;
                request = request.with_plan(plan.id);
            }
            request.contact_phone = phone;
            request.notes = notes;

            let provisioned = provisioner(&pool, &config)
                .spawn_provision(request)
                .await
                .context("Provisioning task failed")??;
            println!(
                "Provisioned tenant '{}' on store {}",
                provisioned.tenant.key, provisioned.store
            );
            print_tenants(&[provisioned.tenant], cli.json)?;
        }
        Commands::Show { key } => {
            let tenant = require_tenant(&tenants, &key).await?;
            print_tenants(&[tenant], cli.json)?;
        }
        Commands::List { status } => {
            let rows = tenants.list_tenants(status).await?;
            print_tenants(&rows, cli.json)?;
        }
        Commands::Activate { key } => {
            set_status(&tenants, &key, TenantStatus::Active, cli.json).await?;
        }
        Commands::Deactivate { key } => {
            set_status(&tenants, &key, TenantStatus::Inactive, cli.json).await?;
            println!("Running services drop their cached pool on invalidation or TTL expiry");
        }
        Commands::Check { key } => {
            check(&pool, &config, &key).await?;
        }
        Commands::DiscardStore { key } => {
            if provisioner(&pool, &config).discard_orphaned_store(&key).await? {
                println!("Dropped orphaned store for '{}'", normalize_tenant_key(&key));
            } else {
                println!("No orphaned store for '{}'", normalize_tenant_key(&key));
            }
        }
        Commands::Plans => {
            let rows = plans.list_active_plans().await?;
            if cli.json {
                print_json(&rows)?;
            } else {
                for plan in &rows {
                    println!("{}", plan_row(plan));
                }
            }
        }
    }

    pool.close().await;
    gearbase_infra::shutdown_telemetry().await;
    Ok(())
}
