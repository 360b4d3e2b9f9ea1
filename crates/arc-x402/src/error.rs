use thiserror::Error;

/// Errors returned by x402 operations.
///
/// Each variant is a distinct, caller-branchable outcome; the handler never
/// collapses them into a generic catch-all.
#[derive(Debug, Error)]
pub enum X402Error {
    /// Amount out of bounds or action in cooldown. Never retried
    /// automatically; the caller adjusts input or waits.
    #[error("guardrail violation: {0}")]
    GuardrailViolation(String),

    /// A 402 was received but no usable payment requirement could be parsed.
    #[error("protocol parse error: {0}")]
    ProtocolParse(String),

    /// The rail rejected the transfer or reported it failed.
    #[error("payment execution failed: {0}")]
    PaymentExecution(String),

    /// The transfer did not reach a terminal status within the settlement
    /// window. The transfer may still be in flight; the outcome is unknown.
    #[error("settlement timed out after {timeout_secs}s for transfer {transfer_id}")]
    SettlementTimeout {
        transfer_id: String,
        timeout_secs: u64,
    },

    /// A second 402 arrived on the paid retry. Never triggers a second
    /// payment.
    #[error("paid but still denied: {0}")]
    ProtocolReplay(String),

    /// Malformed proof token on decode.
    #[error("proof codec error: {0}")]
    Codec(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
