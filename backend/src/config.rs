//! Configuration management for the Marketplace Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with MKT_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Default tenant database configuration
    pub database: DatabaseConfig,

    /// Additional tenant deployments
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Payment gateway configuration
    pub gateway: GatewayConfig,

    /// Courier integration configuration
    pub courier: CourierConfig,

    /// Invoice rendering service configuration
    pub invoices: InvoiceConfig,

    /// Shipping policy configuration
    pub shipping: ShippingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

/// One isolated tenant deployment (its own database)
#[derive(Debug, Deserialize, Clone)]
pub struct TenantConfig {
    /// Tenant identifier carried in JWT claims
    pub id: uuid::Uuid,

    /// PostgreSQL connection URL for this tenant
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for validating JWT tokens
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Payment gateway API base URL
    pub base_url: String,

    /// Public key id exposed to clients
    pub key_id: String,

    /// Secret used for signature verification
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CourierConfig {
    /// Courier API base URL
    pub base_url: String,

    /// Courier API key
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InvoiceConfig {
    /// Invoice rendering service base URL
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShippingConfig {
    /// Flat delivery fee applied per order
    pub flat_fee: rust_decimal::Decimal,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("MKT_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("gateway.base_url", "https://api.gateway.example")?
            .set_default("courier.base_url", "https://api.courier.example")?
            .set_default("invoices.base_url", "https://invoices.internal")?
            .set_default("shipping.flat_fee", "0")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (MKT_ prefix)
            .add_source(
                Environment::with_prefix("MKT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
