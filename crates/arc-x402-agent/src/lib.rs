//! Guarded vault agent on top of the x402 payment core.
//!
//! The [`VaultAgent`] wraps three collaborators:
//!
//! - a [`GuardrailEngine`] enforcing per-action amount ceilings and a
//!   cooldown window,
//! - a [`LedgerClient`] implementation talking to the yield vault, and
//! - an [`x402::X402Handler`] for paying HTTP 402 demands autonomously.
//!
//! Every guarded operation emits INITIATED/COMPLETED/FAILED events on the
//! shared [`x402::EventBus`], so other agents and observers can react
//! without being wired in directly.

pub mod config;
pub mod error;
pub mod guardrail;
pub mod ledger;
pub mod vault;

pub use config::AgentConfig;
pub use error::AgentError;
pub use guardrail::GuardrailEngine;
pub use ledger::{LedgerClient, TxOutcome};
pub use vault::{BalanceReport, FetchOutcome, PaymentSummary, VaultAgent};
