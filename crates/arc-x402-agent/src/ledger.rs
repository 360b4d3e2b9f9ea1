//! Ledger (vault contract) collaborator boundary.
//!
//! The agent treats the chain as an opaque capability: it calls these
//! operations only after guardrail approval and handles success and failure
//! uniformly. Contract plumbing lives behind the implementation.

use std::future::Future;

use serde_json::Value;

use crate::error::AgentError;

/// Result of a ledger call.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub tx_hash: String,
    /// Operation-specific detail (shares received, assets returned, ...).
    pub detail: Value,
}

/// Yield-vault operations consumed by the agent.
pub trait LedgerClient: Send + Sync {
    /// Deposit USDC into the vault.
    fn deposit(&self, amount: f64) -> impl Future<Output = Result<TxOutcome, AgentError>> + Send;

    /// Withdraw vault shares back to USDC.
    fn withdraw(&self, shares: f64) -> impl Future<Output = Result<TxOutcome, AgentError>> + Send;

    /// Trigger auto-compound of accrued yield.
    fn compound(&self) -> impl Future<Output = Result<TxOutcome, AgentError>> + Send;

    /// Current vault share balance of the agent's account.
    fn balance_of(&self) -> impl Future<Output = Result<f64, AgentError>> + Send;
}
