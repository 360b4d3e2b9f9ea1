//! Proof-of-payment codec.
//!
//! A proof round-trips through a single opaque header value: compact JSON,
//! then standard base64 so it is safe in an HTTP header. The resource server
//! decodes it with the same codec and checks the amount against its demand.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::PROOF_AMOUNT_TOLERANCE;
use crate::error::X402Error;

/// Proof that a specific rail transfer settled. Produced once per successful
/// payment and attached to the retried request.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentProof {
    pub transfer_id: String,
    pub tx_hash: String,
    pub amount: f64,
    pub currency: String,
    pub payer_address: String,
    pub timestamp: DateTime<Utc>,
}

/// Wire shape of the token payload. Amount travels as a string and the payer
/// field is named `payer` — both fixed by the wire contract.
#[derive(Serialize, Deserialize)]
struct ProofWire {
    transfer_id: String,
    tx_hash: String,
    amount: String,
    currency: String,
    payer: String,
    timestamp: String,
}

impl PaymentProof {
    /// Encode as a single header-safe token.
    pub fn to_header(&self) -> Result<String, X402Error> {
        let wire = ProofWire {
            transfer_id: self.transfer_id.clone(),
            tx_hash: self.tx_hash.clone(),
            amount: self.amount.to_string(),
            currency: self.currency.clone(),
            payer: self.payer_address.clone(),
            timestamp: self.timestamp.to_rfc3339(),
        };
        let json = serde_json::to_vec(&wire)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }

    /// Decode a token. Truncated or tampered input yields
    /// [`X402Error::Codec`], never a partial proof.
    pub fn from_header(token: &str) -> Result<Self, X402Error> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(token)
            .map_err(|e| X402Error::Codec(format!("invalid base64: {e}")))?;
        let wire: ProofWire = serde_json::from_slice(&bytes)
            .map_err(|e| X402Error::Codec(format!("invalid proof JSON: {e}")))?;
        let amount: f64 = wire
            .amount
            .parse()
            .map_err(|e| X402Error::Codec(format!("invalid proof amount: {e}")))?;
        let timestamp = DateTime::parse_from_rfc3339(&wire.timestamp)
            .map_err(|e| X402Error::Codec(format!("invalid proof timestamp: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            transfer_id: wire.transfer_id,
            tx_hash: wire.tx_hash,
            amount,
            currency: wire.currency,
            payer_address: wire.payer,
            timestamp,
        })
    }

    /// Whether this proof covers `expected_amount`, allowing a 1% shortfall
    /// for rail fee rounding.
    pub fn covers(&self, expected_amount: f64) -> bool {
        self.amount >= expected_amount * PROOF_AMOUNT_TOLERANCE
    }
}
