//! Vault agent: guarded DeFi operations plus autonomous x402 payments.
//!
//! A thin façade over the guardrail engine, the ledger boundary, and the
//! x402 handler. Every guarded operation follows the same shape: gate →
//! INITIATED event → call → cooldown update → COMPLETED event, with a
//! FAILED event (and an untouched cooldown) on error. The whole sequence
//! runs under the action's lock, so concurrent same-action calls cannot
//! both slip through an open cooldown window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use x402::{
    Event, EventBus, EventType, PaymentRail, PaymentRecord, Transfer, X402Handler,
};

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::guardrail::GuardrailEngine;
use crate::ledger::{LedgerClient, TxOutcome};

const ACTION_DEPOSIT: &str = "deposit";
const ACTION_WITHDRAW: &str = "withdraw";
const ACTION_COMPOUND: &str = "compound";

/// Result of a fetch that may or may not have paid.
#[derive(Debug)]
pub struct FetchOutcome {
    pub status: u16,
    pub body: Value,
    pub payment_made: bool,
}

/// Autonomous payment statistics.
#[derive(Debug, Serialize)]
pub struct PaymentSummary {
    pub payments: Vec<PaymentRecord>,
    pub total_spent: f64,
    pub payment_count: usize,
}

/// Combined vault and gateway balances.
#[derive(Debug, Serialize)]
pub struct BalanceReport {
    pub vault_shares: f64,
    pub gateway: HashMap<String, f64>,
}

/// Agent for the yield vault, with guardrails and x402 payment support.
pub struct VaultAgent<L: LedgerClient, R: PaymentRail> {
    name: String,
    bus: Arc<EventBus>,
    guardrails: GuardrailEngine,
    ledger: L,
    handler: X402Handler<R>,
    wallet_id: String,
    running: AtomicBool,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl<L: LedgerClient, R: PaymentRail> VaultAgent<L, R> {
    pub fn new(config: &AgentConfig, bus: Arc<EventBus>, ledger: L, rail: R) -> Self {
        let limits = HashMap::from([
            (ACTION_DEPOSIT.to_string(), config.max_deposit_amount),
            (ACTION_WITHDRAW.to_string(), config.max_withdraw_amount),
        ]);
        let wallet_id = config.gateway_wallet_id.clone().unwrap_or_default();
        let payer = config.payer_address.clone().unwrap_or_default();
        let handler = X402Handler::with_config(
            rail,
            bus.clone(),
            &wallet_id,
            &payer,
            config.handler_config(),
        );

        Self {
            name: "VaultAgent".to_string(),
            bus,
            guardrails: GuardrailEngine::with_limits(config.cooldown(), limits),
            ledger,
            handler,
            wallet_id,
            running: AtomicBool::new(false),
            started_at: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Agent uptime in seconds, when running.
    pub fn uptime(&self) -> Option<f64> {
        self.started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0)
    }

    /// Mark the agent started and announce it on the bus. Idempotent.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

        self.emit(EventType::AgentStarted, json!({"agent_name": self.name}))
            .await;
        tracing::info!(agent = %self.name, "agent started");
    }

    /// Mark the agent stopped and announce it on the bus. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let uptime = self.uptime();
        *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        self.emit(
            EventType::AgentStopped,
            json!({"agent_name": self.name, "uptime": uptime}),
        )
        .await;
        tracing::info!(agent = %self.name, "agent stopped");
    }

    // --- guarded vault operations ---

    /// Deposit USDC into the vault, subject to amount and cooldown guardrails.
    pub async fn deposit(&self, amount: f64) -> Result<TxOutcome, AgentError> {
        let _gate = self.guardrails.lock_action(ACTION_DEPOSIT).await;
        self.guardrails.check(ACTION_DEPOSIT, amount)?;
        self.emit(EventType::DepositInitiated, json!({"amount": amount}))
            .await;

        match self.ledger.deposit(amount).await {
            Ok(outcome) => {
                self.guardrails.update_cooldown(ACTION_DEPOSIT);
                self.emit(
                    EventType::DepositCompleted,
                    json!({"amount": amount, "tx_hash": outcome.tx_hash}),
                )
                .await;
                Ok(outcome)
            }
            Err(err) => {
                self.emit(
                    EventType::DepositFailed,
                    json!({"amount": amount, "error": err.to_string()}),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Withdraw vault shares, subject to amount and cooldown guardrails.
    pub async fn withdraw(&self, shares: f64) -> Result<TxOutcome, AgentError> {
        let _gate = self.guardrails.lock_action(ACTION_WITHDRAW).await;
        self.guardrails.check(ACTION_WITHDRAW, shares)?;
        self.emit(EventType::WithdrawInitiated, json!({"shares": shares}))
            .await;

        match self.ledger.withdraw(shares).await {
            Ok(outcome) => {
                self.guardrails.update_cooldown(ACTION_WITHDRAW);
                self.emit(
                    EventType::WithdrawCompleted,
                    json!({"shares": shares, "tx_hash": outcome.tx_hash}),
                )
                .await;
                Ok(outcome)
            }
            Err(err) => {
                self.emit(
                    EventType::WithdrawFailed,
                    json!({"shares": shares, "error": err.to_string()}),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Trigger auto-compound, subject to the cooldown guardrail.
    pub async fn compound(&self) -> Result<TxOutcome, AgentError> {
        let _gate = self.guardrails.lock_action(ACTION_COMPOUND).await;
        self.guardrails.check_action(ACTION_COMPOUND)?;
        self.emit(EventType::CompoundInitiated, json!({})).await;

        match self.ledger.compound().await {
            Ok(outcome) => {
                self.guardrails.update_cooldown(ACTION_COMPOUND);
                self.emit(
                    EventType::CompoundCompleted,
                    json!({"tx_hash": outcome.tx_hash}),
                )
                .await;
                Ok(outcome)
            }
            Err(err) => {
                self.emit(EventType::CompoundFailed, json!({"error": err.to_string()}))
                    .await;
                Err(err)
            }
        }
    }

    // --- gateway payments ---

    /// Transfer USDC through the gateway and wait for settlement.
    pub async fn transfer_usdc(
        &self,
        destination_address: &str,
        amount: f64,
        metadata: Option<Value>,
    ) -> Result<Transfer, AgentError> {
        tracing::info!(
            agent = %self.name,
            amount,
            destination = destination_address,
            "initiating gateway transfer"
        );

        let result: Result<Transfer, AgentError> = async {
            let transfer = self
                .handler
                .rail()
                .create_transfer(destination_address, amount, &self.wallet_id, "ARC", metadata)
                .await?;
            let settled = self.handler.wait_for_settlement(&transfer.id).await?;
            Ok(settled)
        }
        .await;

        match result {
            Ok(settled) => {
                self.emit(
                    EventType::PaymentCompleted,
                    json!({
                        "type": "gateway_transfer",
                        "amount": amount,
                        "destination": destination_address,
                        "transfer_id": settled.id,
                        "tx_hash": settled.tx_hash,
                    }),
                )
                .await;
                Ok(settled)
            }
            Err(err) => {
                self.emit(
                    EventType::PaymentFailed,
                    json!({
                        "type": "gateway_transfer",
                        "amount": amount,
                        "destination": destination_address,
                        "error": err.to_string(),
                    }),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Gateway wallet balances, currency → amount.
    pub async fn gateway_balance(&self) -> Result<HashMap<String, f64>, AgentError> {
        Ok(self.handler.rail().get_balance(&self.wallet_id).await?)
    }

    // --- x402 autonomous payments ---

    /// Access a possibly paywalled resource, paying automatically on 402.
    pub async fn access_paid_service(
        &self,
        url: &str,
        method: reqwest::Method,
    ) -> Result<Value, AgentError> {
        tracing::info!(agent = %self.name, url, "accessing service");
        Ok(self.handler.pay_and_access(url, method).await?)
    }

    /// Fetch a URL with optional automatic 402 payment handling.
    pub async fn fetch_with_auto_payment(
        &self,
        url: &str,
        method: reqwest::Method,
        auto_pay: bool,
    ) -> Result<FetchOutcome, AgentError> {
        let before = self.handler.payment_history().len();
        let reply = self
            .handler
            .fetch_with_payment(url, method, None, None, auto_pay)
            .await?;
        let payment_made = self.handler.payment_history().len() > before;

        Ok(FetchOutcome {
            status: reply.status,
            body: reply.body,
            payment_made,
        })
    }

    /// History and statistics of autonomous payments.
    pub fn payment_summary(&self) -> PaymentSummary {
        let payments = self.handler.payment_history();
        PaymentSummary {
            total_spent: self.handler.total_spent(),
            payment_count: payments.len(),
            payments,
        }
    }

    /// Vault share balance combined with gateway balances.
    pub async fn balance(&self) -> Result<BalanceReport, AgentError> {
        let vault_shares = self.ledger.balance_of().await?;
        let gateway = self.gateway_balance().await?;
        Ok(BalanceReport {
            vault_shares,
            gateway,
        })
    }

    async fn emit(&self, event_type: EventType, data: Value) {
        self.bus
            .publish(Event::from_agent(event_type, data, &self.name))
            .await;
    }
}
