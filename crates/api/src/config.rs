//! API server configuration

use anyhow::Context;

/// Runtime configuration, loaded once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub jwt_secret: String,
    /// Deployment environment name ("development", "staging", "production").
    pub environment: String,
    /// Whether ledger writes run inside database transactions. Disabled only
    /// for pooled deployments that cannot hold a transaction open.
    pub atomic_ledger_writes: bool,
    /// Whether payment gateway credentials are configured.
    pub gateway_configured: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters");
        }

        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let atomic_ledger_writes = std::env::var("LEDGER_ATOMIC_WRITES")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let gateway_configured = std::env::var("GATEWAY_API_KEY")
            .map(|v| !v.is_empty())
            .unwrap_or(false);

        Ok(Self {
            database_url,
            bind_address,
            jwt_secret,
            environment,
            atomic_ledger_writes,
            gateway_configured,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Simulated recharges are a development convenience; a production
    /// deployment with gateway credentials must go through checkout.
    pub fn allows_simulated_recharge(&self) -> bool {
        !self.is_production() || !self.gateway_configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(environment: &str, gateway_configured: bool) -> Config {
        Config {
            database_url: "postgres://localhost/souq".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            environment: environment.to_string(),
            atomic_ledger_writes: true,
            gateway_configured,
        }
    }

    #[test]
    fn test_simulated_recharge_gate() {
        assert!(config("development", false).allows_simulated_recharge());
        assert!(config("development", true).allows_simulated_recharge());
        assert!(config("production", false).allows_simulated_recharge());
        assert!(!config("production", true).allows_simulated_recharge());
    }
}
