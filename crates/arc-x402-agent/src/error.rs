use thiserror::Error;

/// Errors surfaced by the vault agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Amount out of bounds or action in cooldown.
    #[error("guardrail violation: {0}")]
    Guardrail(String),

    /// The ledger (vault contract) rejected or failed the call.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// An x402/rail error bubbled up from the payment core.
    #[error("payment error: {0}")]
    Payment(#[from] x402::X402Error),

    #[error("config error: {0}")]
    Config(String),
}
