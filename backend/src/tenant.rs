//! Tenant-scoped database handle resolution
//!
//! Every tenant is an isolated deployment with its own database. The
//! registry is built once at startup from configuration; request handlers
//! resolve the caller's tenant to a pool and pass that handle into the
//! services explicitly. Core logic never looks a pool up from global state.

use std::collections::HashMap;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Registry of tenant database pools
#[derive(Clone)]
pub struct TenantRegistry {
    pools: HashMap<Uuid, PgPool>,
    default_pool: PgPool,
}

impl TenantRegistry {
    /// Connect the default pool and one pool per configured tenant
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let default_pool = connect_pool(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        let mut pools = HashMap::with_capacity(config.tenants.len());
        for tenant in &config.tenants {
            tracing::info!("Connecting tenant database for {}", tenant.id);
            let pool = connect_pool(
                &tenant.url,
                config.database.max_connections,
                config.database.min_connections,
            )
            .await?;
            pools.insert(tenant.id, pool);
        }

        Ok(Self {
            pools,
            default_pool,
        })
    }

    /// Resolve a tenant id to its database handle.
    ///
    /// Tenants without a dedicated deployment share the default database.
    pub fn resolve(&self, tenant_id: Uuid) -> AppResult<PgPool> {
        if let Some(pool) = self.pools.get(&tenant_id) {
            return Ok(pool.clone());
        }
        Ok(self.default_pool.clone())
    }

    /// Resolve an explicitly named tenant, rejecting unknown ids.
    ///
    /// Used by unauthenticated surfaces (courier webhook) where the tenant
    /// arrives as a header instead of a JWT claim.
    pub fn resolve_strict(&self, tenant_id: Option<Uuid>) -> AppResult<PgPool> {
        match tenant_id {
            None => Ok(self.default_pool.clone()),
            Some(id) => self
                .pools
                .get(&id)
                .cloned()
                .ok_or_else(|| AppError::UnknownTenant(id.to_string())),
        }
    }

    /// Handle for the default tenant (migrations, health checks)
    pub fn default_pool(&self) -> &PgPool {
        &self.default_pool
    }
}

async fn connect_pool(url: &str, max: u32, min: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max)
        .min_connections(min)
        .acquire_timeout(Duration::from_secs(30))
        .connect(url)
        .await?;
    Ok(pool)
}
