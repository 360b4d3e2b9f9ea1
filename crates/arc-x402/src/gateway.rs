//! Payment rail boundary: the [`PaymentRail`] trait the handler drives, and
//! [`GatewayClient`], a reqwest implementation of the Circle-style gateway
//! REST API.
//!
//! The handler only ever observes transfer state transitions by polling; it
//! never reimplements settlement.

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::DEFAULT_GATEWAY_URL;
use crate::error::X402Error;

/// Terminal and non-terminal transfer states reported by the rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Complete,
    Failed,
}

/// A rail-owned transfer. The core holds snapshots only.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub id: String,
    pub status: TransferStatus,
    pub tx_hash: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub source_wallet_id: String,
    pub destination_address: String,
    pub chain: String,
}

/// Payment rail capability consumed by the x402 handler.
///
/// Implementations must signal hard failure (`Err` or `Failed` status)
/// distinctly from not-yet-complete (`Pending` status).
pub trait PaymentRail: Send + Sync {
    /// Submit a transfer. Returns the rail's view of it, usually `Pending`.
    fn create_transfer(
        &self,
        destination_address: &str,
        amount: f64,
        source_wallet_id: &str,
        chain: &str,
        metadata: Option<Value>,
    ) -> impl Future<Output = Result<Transfer, X402Error>> + Send;

    /// Fetch the current state of a transfer.
    fn poll_transfer(
        &self,
        transfer_id: &str,
    ) -> impl Future<Output = Result<Transfer, X402Error>> + Send;

    /// Wallet balances as a currency → amount mapping.
    fn get_balance(
        &self,
        wallet_id: &str,
    ) -> impl Future<Output = Result<HashMap<String, f64>, X402Error>> + Send;
}

// --- wire shapes (Circle-style REST API, camelCase) ---

#[derive(Serialize, Deserialize)]
struct MoneyWire {
    amount: String,
    currency: String,
}

#[derive(Serialize, Deserialize)]
struct SourceWire {
    #[serde(rename = "type")]
    kind: String,
    id: String,
}

#[derive(Serialize, Deserialize)]
struct DestinationWire {
    #[serde(rename = "type")]
    kind: String,
    address: String,
    chain: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequestWire {
    idempotency_key: String,
    source: SourceWire,
    destination: DestinationWire,
    amount: MoneyWire,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferWire {
    id: String,
    status: TransferStatus,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    source: Option<SourceWire>,
    #[serde(default)]
    destination: Option<DestinationWire>,
    #[serde(default)]
    amount: Option<MoneyWire>,
}

#[derive(Deserialize)]
struct BalanceWire {
    #[serde(default)]
    balances: Vec<MoneyWire>,
}

#[derive(Deserialize)]
struct ApiErrorWire {
    #[serde(default)]
    message: Option<String>,
}

impl From<TransferWire> for Transfer {
    fn from(wire: TransferWire) -> Self {
        let (amount, currency) = wire
            .amount
            .map(|m| (m.amount.parse().unwrap_or(0.0), m.currency))
            .unwrap_or((0.0, "USDC".to_string()));
        Self {
            id: wire.id,
            status: wire.status,
            tx_hash: wire.transaction_hash,
            amount,
            currency,
            source_wallet_id: wire.source.map(|s| s.id).unwrap_or_default(),
            destination_address: wire.destination.as_ref().map(|d| d.address.clone()).unwrap_or_default(),
            chain: wire.destination.map(|d| d.chain).unwrap_or_default(),
        }
    }
}

/// Gateway REST client. Sessions are created once and reused across calls.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    /// Build a client against the production gateway.
    pub fn new(api_key: &str) -> Result<Self, X402Error> {
        Self::with_base_url(api_key, DEFAULT_GATEWAY_URL)
    }

    /// Build a client against a custom gateway base URL.
    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, X402Error> {
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| X402Error::Http(format!("invalid API key: {e}")))?;
        auth.set_sensitive(true);
        let mut default_headers = reqwest::header::HeaderMap::new();
        default_headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| X402Error::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn decode_or_error<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, X402Error> {
        let status = resp.status();
        if status.as_u16() >= 400 {
            let message = resp
                .json::<ApiErrorWire>()
                .await
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(X402Error::PaymentExecution(format!(
                "gateway API error ({status}): {message}"
            )));
        }
        let value: Value = resp
            .json()
            .await
            .map_err(|e| X402Error::Http(format!("failed to parse gateway response: {e}")))?;
        Self::decode_payload(value)
    }

    /// Some gateway deployments wrap responses in a `data` envelope, others
    /// return the payload bare. Accept both.
    fn decode_payload<T: serde::de::DeserializeOwned>(mut value: Value) -> Result<T, X402Error> {
        let payload = if value.get("data").is_some() {
            value["data"].take()
        } else {
            value
        };
        serde_json::from_value(payload)
            .map_err(|e| X402Error::Http(format!("failed to parse gateway response: {e}")))
    }
}

impl PaymentRail for GatewayClient {
    async fn create_transfer(
        &self,
        destination_address: &str,
        amount: f64,
        source_wallet_id: &str,
        chain: &str,
        metadata: Option<Value>,
    ) -> Result<Transfer, X402Error> {
        // A fresh idempotency key per call: retries of a failed *call* are
        // new payments, but the rail deduplicates a retried submission.
        let request = TransferRequestWire {
            idempotency_key: Uuid::new_v4().to_string(),
            source: SourceWire {
                kind: "wallet".to_string(),
                id: source_wallet_id.to_string(),
            },
            destination: DestinationWire {
                kind: "blockchain".to_string(),
                address: destination_address.to_string(),
                chain: chain.to_string(),
            },
            amount: MoneyWire {
                amount: format!("{amount:.6}"),
                currency: "USDC".to_string(),
            },
            metadata,
        };

        tracing::info!(
            amount = %request.amount.amount,
            destination = destination_address,
            chain,
            "submitting gateway transfer"
        );

        let resp = self
            .http
            .post(format!("{}/transfers", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| X402Error::Http(format!("transfer request failed: {e}")))?;

        let wire: TransferWire = Self::decode_or_error(resp).await?;
        Ok(wire.into())
    }

    async fn poll_transfer(&self, transfer_id: &str) -> Result<Transfer, X402Error> {
        let resp = self
            .http
            .get(format!("{}/transfers/{transfer_id}", self.base_url))
            .send()
            .await
            .map_err(|e| X402Error::Http(format!("transfer status request failed: {e}")))?;

        let wire: TransferWire = Self::decode_or_error(resp).await?;
        Ok(wire.into())
    }

    async fn get_balance(&self, wallet_id: &str) -> Result<HashMap<String, f64>, X402Error> {
        let resp = self
            .http
            .get(format!("{}/wallets/{wallet_id}", self.base_url))
            .send()
            .await
            .map_err(|e| X402Error::Http(format!("wallet request failed: {e}")))?;

        let wire: BalanceWire = Self::decode_or_error(resp).await?;
        let mut balances = HashMap::new();
        for money in wire.balances {
            balances.insert(money.currency, money.amount.parse().unwrap_or(0.0));
        }
        Ok(balances)
    }
}
