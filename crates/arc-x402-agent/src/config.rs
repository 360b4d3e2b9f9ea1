//! Agent configuration from environment variables.

use std::time::Duration;

use x402::{GatewayClient, HandlerConfig};

use crate::error::AgentError;

/// Guardrail and payment settings for the vault agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Ceiling for a single deposit, in USDC (env: MAX_DEPOSIT_AMOUNT, default 10000).
    pub max_deposit_amount: f64,
    /// Ceiling for a single withdrawal, in shares (env: MAX_WITHDRAW_AMOUNT, default 10000).
    pub max_withdraw_amount: f64,
    /// Cooldown between guarded actions of the same name (env: COOLDOWN_SECONDS, default 60).
    pub cooldown_seconds: u64,
    /// Ceiling for a single autonomous x402 payment (env: MAX_AUTO_PAYMENT, default 10.0).
    pub max_auto_payment: f64,
    /// Settlement poll interval (env: SETTLE_POLL_INTERVAL_SECS, default 2).
    pub settle_poll_interval_secs: u64,
    /// Settlement wait ceiling (env: SETTLE_TIMEOUT_SECS, default 30).
    pub settle_timeout_secs: u64,
    /// Gateway API key (env: CIRCLE_API_KEY).
    pub gateway_api_key: Option<String>,
    /// Gateway base URL override, for sandboxes (env: CIRCLE_BASE_URL).
    pub gateway_base_url: Option<String>,
    /// Gateway wallet to pay from (env: CIRCLE_WALLET_ID).
    pub gateway_wallet_id: Option<String>,
    /// On-chain address payments are attributed to (env: PAYER_ADDRESS).
    pub payer_address: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_deposit_amount: 10_000.0,
            max_withdraw_amount: 10_000.0,
            cooldown_seconds: 60,
            max_auto_payment: 10.0,
            settle_poll_interval_secs: 2,
            settle_timeout_secs: 30,
            gateway_api_key: None,
            gateway_base_url: None,
            gateway_wallet_id: None,
            payer_address: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

impl AgentConfig {
    /// Load configuration from the environment (reads `.env` if present).
    pub fn from_env() -> Result<Self, AgentError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Ok(Self {
            max_deposit_amount: env_parse("MAX_DEPOSIT_AMOUNT", defaults.max_deposit_amount),
            max_withdraw_amount: env_parse("MAX_WITHDRAW_AMOUNT", defaults.max_withdraw_amount),
            cooldown_seconds: env_parse("COOLDOWN_SECONDS", defaults.cooldown_seconds),
            max_auto_payment: env_parse("MAX_AUTO_PAYMENT", defaults.max_auto_payment),
            settle_poll_interval_secs: env_parse(
                "SETTLE_POLL_INTERVAL_SECS",
                defaults.settle_poll_interval_secs,
            ),
            settle_timeout_secs: env_parse("SETTLE_TIMEOUT_SECS", defaults.settle_timeout_secs),
            gateway_api_key: env_opt("CIRCLE_API_KEY"),
            gateway_base_url: env_opt("CIRCLE_BASE_URL"),
            gateway_wallet_id: env_opt("CIRCLE_WALLET_ID"),
            payer_address: env_opt("PAYER_ADDRESS"),
        })
    }

    /// The handler-facing slice of this configuration.
    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            max_auto_payment: self.max_auto_payment,
            poll_interval: Duration::from_secs(self.settle_poll_interval_secs),
            settle_timeout: Duration::from_secs(self.settle_timeout_secs),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    /// Build a gateway rail client from this configuration.
    pub fn gateway_client(&self) -> Result<GatewayClient, AgentError> {
        let key = self.gateway_api_key.as_deref().ok_or_else(|| {
            AgentError::Config("CIRCLE_API_KEY is not set".to_string())
        })?;
        let client = match self.gateway_base_url.as_deref() {
            Some(url) => GatewayClient::with_base_url(key, url)?,
            None => GatewayClient::new(key)?,
        };
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AgentConfig::default();
        assert_eq!(config.max_deposit_amount, 10_000.0);
        assert_eq!(config.cooldown_seconds, 60);
        assert_eq!(config.max_auto_payment, 10.0);
    }

    #[test]
    fn handler_config_mirrors_payment_settings() {
        let config = AgentConfig {
            max_auto_payment: 2.5,
            settle_poll_interval_secs: 1,
            settle_timeout_secs: 7,
            ..AgentConfig::default()
        };
        let hc = config.handler_config();
        assert_eq!(hc.max_auto_payment, 2.5);
        assert_eq!(hc.poll_interval, Duration::from_secs(1));
        assert_eq!(hc.settle_timeout, Duration::from_secs(7));
    }

    #[test]
    fn gateway_client_requires_api_key() {
        let config = AgentConfig::default();
        assert!(matches!(
            config.gateway_client(),
            Err(AgentError::Config(_))
        ));
    }
}
