//! Autonomous payment handler for HTTP 402 responses.
//!
//! The flow per call: issue request → detect 402 → parse requirement →
//! ceiling check → pay via rail → await settlement → attach proof → retry
//! the original request exactly once → return the final response. A second
//! 402 after a paid retry is a protocol error, never a second payment —
//! this bounds autonomous spend per call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};

use crate::bus::{Event, EventBus, EventType};
use crate::config::HandlerConfig;
use crate::error::X402Error;
use crate::gateway::{PaymentRail, Transfer, TransferStatus};
use crate::proof::PaymentProof;
use crate::requirement::{is_payment_required, parse_payment_requirement, PaymentRequirement};

const SOURCE_AGENT: &str = "X402Handler";

/// Final response surfaced to the caller after the protocol ran.
#[derive(Debug)]
pub struct HttpReply {
    pub status: u16,
    pub headers: HeaderMap,
    /// Parsed JSON when the body is JSON, otherwise the raw text as a string.
    pub body: Value,
}

/// One confirmed autonomous payment. Appended only after settlement.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecord {
    pub requirement: PaymentRequirement,
    pub transfer_id: String,
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// x402 protocol handler, generic over the payment rail.
pub struct X402Handler<R: PaymentRail> {
    rail: R,
    http: reqwest::Client,
    bus: Arc<EventBus>,
    source_wallet_id: String,
    payer_address: String,
    config: HandlerConfig,
    history: Mutex<Vec<PaymentRecord>>,
}

impl<R: PaymentRail> X402Handler<R> {
    pub fn new(rail: R, bus: Arc<EventBus>, source_wallet_id: &str, payer_address: &str) -> Self {
        Self::with_config(rail, bus, source_wallet_id, payer_address, HandlerConfig::default())
    }

    pub fn with_config(
        rail: R,
        bus: Arc<EventBus>,
        source_wallet_id: &str,
        payer_address: &str,
        config: HandlerConfig,
    ) -> Self {
        Self {
            rail,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("failed to build HTTP client"),
            bus,
            source_wallet_id: source_wallet_id.to_string(),
            payer_address: payer_address.to_string(),
            config,
            history: Mutex::new(Vec::new()),
        }
    }

    /// The underlying rail, for direct transfers outside the 402 flow.
    pub fn rail(&self) -> &R {
        &self.rail
    }

    fn history_lock(&self) -> MutexGuard<'_, Vec<PaymentRecord>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch a URL, transparently paying a 402 demand when `auto_pay` is set.
    ///
    /// Performs at most two HTTP requests. Returns the first response
    /// unchanged when it does not demand payment (or `auto_pay` is off);
    /// otherwise pays and returns the retried response. A second payment
    /// demand on the retry yields [`X402Error::ProtocolReplay`].
    pub async fn fetch_with_payment(
        &self,
        url: &str,
        method: Method,
        headers: Option<HeaderMap>,
        json_body: Option<&Value>,
        auto_pay: bool,
    ) -> Result<HttpReply, X402Error> {
        let base_headers = headers.unwrap_or_default();

        let first = self
            .issue(method.clone(), url, base_headers.clone(), json_body)
            .await?;
        if !is_payment_required(first.status, &first.headers) || !auto_pay {
            return Ok(first);
        }

        let requirement = parse_payment_requirement(first.status, &first.headers, Some(&first.body))
            .ok_or_else(|| {
                X402Error::ProtocolParse(
                    "received 402 but no usable payment requirement in headers or body".to_string(),
                )
            })?;

        tracing::info!(
            amount = requirement.amount,
            currency = %requirement.currency,
            recipient = %requirement.recipient_address,
            url,
            "payment required; paying autonomously"
        );

        let (_transfer, proof) = self.execute_payment(&requirement).await?;

        let mut paid_headers = base_headers;
        let token = proof.to_header()?;
        paid_headers.insert(
            HeaderName::from_static("x-payment-proof"),
            HeaderValue::from_str(&token)
                .map_err(|e| X402Error::Http(format!("proof token not header-safe: {e}")))?,
        );
        paid_headers.insert(
            HeaderName::from_static("x-payment-txhash"),
            HeaderValue::from_str(&proof.tx_hash)
                .map_err(|e| X402Error::Http(format!("tx hash not header-safe: {e}")))?,
        );

        let retry = self.issue(method, url, paid_headers, json_body).await?;
        if is_payment_required(retry.status, &retry.headers) {
            return Err(X402Error::ProtocolReplay(format!(
                "paid {} {} to {} but resource still demands payment (status {})",
                requirement.amount,
                requirement.currency,
                requirement.recipient_address,
                retry.status
            )));
        }

        Ok(retry)
    }

    /// Convenience wrapper: fetch with auto-payment and treat any final
    /// status >= 400 as an error, returning only the body.
    pub async fn pay_and_access(&self, url: &str, method: Method) -> Result<Value, X402Error> {
        let reply = self.fetch_with_payment(url, method, None, None, true).await?;
        if reply.status >= 400 {
            return Err(X402Error::Http(format!(
                "request failed with status {}: {}",
                reply.status, reply.body
            )));
        }
        Ok(reply.body)
    }

    /// Pay one requirement: ceiling gate, transfer, settlement wait, proof.
    ///
    /// The ceiling check runs before any rail call. Lifecycle events are
    /// published for the attempt, completion, and failure; history records
    /// only confirmed spend.
    async fn execute_payment(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<(Transfer, PaymentProof), X402Error> {
        if requirement.amount > self.config.max_auto_payment {
            return Err(X402Error::GuardrailViolation(format!(
                "payment amount {} {} exceeds max auto-payment {}",
                requirement.amount, requirement.currency, self.config.max_auto_payment
            )));
        }

        self.publish(
            EventType::PaymentInitiated,
            json!({
                "type": "x402_payment",
                "amount": requirement.amount,
                "currency": requirement.currency,
                "recipient": requirement.recipient_address,
                "description": requirement.description,
            }),
        )
        .await;

        match self.pay(requirement).await {
            Ok((transfer, proof)) => {
                self.publish(
                    EventType::PaymentCompleted,
                    json!({
                        "type": "x402_payment",
                        "amount": requirement.amount,
                        "recipient": requirement.recipient_address,
                        "transfer_id": proof.transfer_id,
                        "tx_hash": proof.tx_hash,
                    }),
                )
                .await;
                Ok((transfer, proof))
            }
            Err(err) => {
                self.publish(
                    EventType::PaymentFailed,
                    json!({
                        "type": "x402_payment",
                        "amount": requirement.amount,
                        "recipient": requirement.recipient_address,
                        "error": err.to_string(),
                    }),
                )
                .await;
                Err(err)
            }
        }
    }

    async fn pay(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<(Transfer, PaymentProof), X402Error> {
        let transfer = self
            .rail
            .create_transfer(
                &requirement.recipient_address,
                requirement.amount,
                &self.source_wallet_id,
                &requirement.network,
                Some(json!({
                    "payment_id": requirement.payment_id,
                    "type": "x402_autonomous_payment",
                })),
            )
            .await
            .map_err(|e| {
                X402Error::PaymentExecution(format!(
                    "transfer of {} {} to {} failed: {e}",
                    requirement.amount, requirement.currency, requirement.recipient_address
                ))
            })?;

        let settled = self.wait_for_settlement(&transfer.id).await?;

        let proof = PaymentProof {
            transfer_id: settled.id.clone(),
            tx_hash: settled
                .tx_hash
                .clone()
                .unwrap_or_else(|| format!("0x{}", settled.id)),
            amount: requirement.amount,
            currency: requirement.currency.clone(),
            payer_address: self.payer_address.clone(),
            timestamp: Utc::now(),
        };

        // History reflects only confirmed spend: appended after settlement,
        // before the retried request goes out.
        self.history_lock().push(PaymentRecord {
            requirement: requirement.clone(),
            transfer_id: proof.transfer_id.clone(),
            tx_hash: proof.tx_hash.clone(),
            timestamp: proof.timestamp,
        });

        Ok((settled, proof))
    }

    /// Poll the rail until the transfer reaches a terminal status.
    ///
    /// `Failed` surfaces immediately as a payment error. Exceeding the
    /// settlement window yields [`X402Error::SettlementTimeout`]; the
    /// transfer is not cancelled and may still settle later — the handler
    /// just stops tracking it.
    pub async fn wait_for_settlement(&self, transfer_id: &str) -> Result<Transfer, X402Error> {
        let started = std::time::Instant::now();
        loop {
            let transfer = self.rail.poll_transfer(transfer_id).await?;
            match transfer.status {
                TransferStatus::Complete => return Ok(transfer),
                TransferStatus::Failed => {
                    return Err(X402Error::PaymentExecution(format!(
                        "transfer {transfer_id} failed on the rail"
                    )))
                }
                TransferStatus::Pending => {}
            }
            if started.elapsed() >= self.config.settle_timeout {
                return Err(X402Error::SettlementTimeout {
                    transfer_id: transfer_id.to_string(),
                    timeout_secs: self.config.settle_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Confirmed autonomous payments made over this handler's lifetime.
    pub fn payment_history(&self) -> Vec<PaymentRecord> {
        self.history_lock().clone()
    }

    /// Total confirmed autonomous spend.
    pub fn total_spent(&self) -> f64 {
        self.history_lock()
            .iter()
            .map(|r| r.requirement.amount)
            .sum()
    }

    async fn issue(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        json_body: Option<&Value>,
    ) -> Result<HttpReply, X402Error> {
        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = json_body {
            request = request.json(body);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| X402Error::Http(format!("request to {url} failed: {e}")))?;

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let text = resp
            .text()
            .await
            .map_err(|e| X402Error::Http(format!("failed to read response body: {e}")))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(HttpReply {
            status,
            headers,
            body,
        })
    }

    async fn publish(&self, event_type: EventType, data: Value) {
        self.bus
            .publish(Event::from_agent(event_type, data, SOURCE_AGENT))
            .await;
    }
}
