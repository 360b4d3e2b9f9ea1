//! Payment-demand parsing for 402 responses.
//!
//! A demand arrives in one of two wire encodings: `X-Payment-*` headers
//! (standard x402) or a JSON body with `payment_required: true`. The parser
//! is an ordered list of strategies — headers first, body as fallback, never
//! both.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    DEFAULT_CURRENCY, DEFAULT_NETWORK, HEADER_PAYMENT_ADDRESS, HEADER_PAYMENT_AMOUNT,
    HEADER_PAYMENT_CURRENCY, HEADER_PAYMENT_DESCRIPTION, HEADER_PAYMENT_ID,
    HEADER_PAYMENT_MAX_AMOUNT, HEADER_PAYMENT_MIN_AMOUNT, HEADER_PAYMENT_NETWORK,
    HEADER_PAYMENT_REQUIRED,
};

/// A normalized payment demand parsed from a 402 response.
///
/// Transient: constructed per response, consumed by the handler, never
/// persisted (a snapshot is kept in payment history after settlement).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequirement {
    pub amount: f64,
    pub currency: String,
    pub recipient_address: String,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<f64>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl PaymentRequirement {
    /// Parse a demand from `X-Payment-*` headers.
    ///
    /// Returns `None` unless both a parseable amount and a non-empty
    /// recipient address are present.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let amount: f64 = header_str(headers, HEADER_PAYMENT_AMOUNT)?.parse().ok()?;
        let recipient = header_str(headers, HEADER_PAYMENT_ADDRESS)?;
        if recipient.is_empty() {
            return None;
        }

        Some(Self {
            amount,
            currency: header_str(headers, HEADER_PAYMENT_CURRENCY)
                .unwrap_or(DEFAULT_CURRENCY)
                .to_string(),
            recipient_address: recipient.to_string(),
            network: header_str(headers, HEADER_PAYMENT_NETWORK)
                .unwrap_or(DEFAULT_NETWORK)
                .to_string(),
            payment_id: header_str(headers, HEADER_PAYMENT_ID).map(str::to_string),
            description: header_str(headers, HEADER_PAYMENT_DESCRIPTION).map(str::to_string),
            min_amount: header_str(headers, HEADER_PAYMENT_MIN_AMOUNT).and_then(|v| v.parse().ok()),
            max_amount: header_str(headers, HEADER_PAYMENT_MAX_AMOUNT).and_then(|v| v.parse().ok()),
        })
    }

    /// Parse a demand from a JSON body carrying `payment_required: true`.
    ///
    /// The recipient may live under `recipient` or `address`. Returns `None`
    /// unless the marker, an amount, and a non-empty recipient are present.
    pub fn from_json_body(body: &Value) -> Option<Self> {
        if body.get("payment_required").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        let amount = body.get("amount").and_then(Value::as_f64)?;
        let recipient = body
            .get("recipient")
            .or_else(|| body.get("address"))
            .and_then(Value::as_str)?;
        if recipient.is_empty() {
            return None;
        }

        let str_field = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);

        Some(Self {
            amount,
            currency: str_field("currency").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            recipient_address: recipient.to_string(),
            network: str_field("network").unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
            payment_id: str_field("payment_id"),
            description: str_field("description"),
            min_amount: body.get("min_amount").and_then(Value::as_f64),
            max_amount: body.get("max_amount").and_then(Value::as_f64),
        })
    }
}

/// Whether a response demands payment: status 402 **or** the
/// `X-Payment-Required: true` marker. Deliberately OR'd — proxies that
/// rewrite status codes still carry the marker.
pub fn is_payment_required(status: u16, headers: &HeaderMap) -> bool {
    if status == 402 {
        return true;
    }
    header_str(headers, HEADER_PAYMENT_REQUIRED)
        .map_or(false, |v| v.eq_ignore_ascii_case("true"))
}

/// Extract a normalized demand from a payment-required response.
///
/// Strategies run in order — headers first, JSON body second; the first
/// success wins. `None` means the handler must surface a protocol error
/// rather than retry blindly.
pub fn parse_payment_requirement(
    status: u16,
    headers: &HeaderMap,
    body: Option<&Value>,
) -> Option<PaymentRequirement> {
    if !is_payment_required(status, headers) {
        return None;
    }
    PaymentRequirement::from_headers(headers)
        .or_else(|| body.and_then(PaymentRequirement::from_json_body))
}

/// Build the x402 header set for a paywalled endpoint (server side of the
/// wire contract). Amounts are always rendered with six decimal places.
pub fn payment_required_headers(
    amount: f64,
    recipient_address: &str,
    payment_id: Option<&str>,
    description: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        (HEADER_PAYMENT_REQUIRED, "true".to_string()),
        (HEADER_PAYMENT_AMOUNT, format!("{amount:.6}")),
        (HEADER_PAYMENT_CURRENCY, DEFAULT_CURRENCY.to_string()),
        (HEADER_PAYMENT_ADDRESS, recipient_address.to_string()),
        (HEADER_PAYMENT_NETWORK, DEFAULT_NETWORK.to_string()),
    ];
    if let Some(id) = payment_id {
        headers.push((HEADER_PAYMENT_ID, id.to_string()));
    }
    if let Some(desc) = description {
        headers.push((HEADER_PAYMENT_DESCRIPTION, desc.to_string()));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};
    use serde_json::json;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                name.parse::<HeaderName>().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn parses_full_header_set() {
        let h = headers(&[
            ("X-Payment-Required", "true"),
            ("X-Payment-Amount", "0.100000"),
            ("X-Payment-Currency", "USDC"),
            ("X-Payment-Address", "0xABCtest"),
            ("X-Payment-Network", "ARC"),
            ("X-Payment-Id", "pay-42"),
            ("X-Payment-Description", "premium report"),
            ("X-Payment-Min-Amount", "0.05"),
            ("X-Payment-Max-Amount", "1.0"),
        ]);
        let req = PaymentRequirement::from_headers(&h).unwrap();
        assert_eq!(req.amount, 0.1);
        assert_eq!(req.currency, "USDC");
        assert_eq!(req.recipient_address, "0xABCtest");
        assert_eq!(req.network, "ARC");
        assert_eq!(req.payment_id.as_deref(), Some("pay-42"));
        assert_eq!(req.description.as_deref(), Some("premium report"));
        assert_eq!(req.min_amount, Some(0.05));
        assert_eq!(req.max_amount, Some(1.0));
    }

    #[test]
    fn header_parse_defaults_currency_and_network() {
        let h = headers(&[
            ("X-Payment-Amount", "2.5"),
            ("X-Payment-Address", "0xfeed"),
        ]);
        let req = PaymentRequirement::from_headers(&h).unwrap();
        assert_eq!(req.currency, "USDC");
        assert_eq!(req.network, "ARC");
        assert!(req.payment_id.is_none());
    }

    #[test]
    fn header_parse_rejects_missing_amount_or_recipient() {
        let no_amount = headers(&[("X-Payment-Address", "0xfeed")]);
        assert!(PaymentRequirement::from_headers(&no_amount).is_none());

        let no_recipient = headers(&[("X-Payment-Amount", "1.0")]);
        assert!(PaymentRequirement::from_headers(&no_recipient).is_none());

        let empty_recipient = headers(&[
            ("X-Payment-Amount", "1.0"),
            ("X-Payment-Address", ""),
        ]);
        assert!(PaymentRequirement::from_headers(&empty_recipient).is_none());
    }

    #[test]
    fn parses_json_body_with_recipient_or_address_key() {
        let body = json!({
            "payment_required": true,
            "amount": 0.25,
            "currency": "USDC",
            "recipient": "0xaaa",
            "network": "ARC",
            "payment_id": "p1"
        });
        let req = PaymentRequirement::from_json_body(&body).unwrap();
        assert_eq!(req.amount, 0.25);
        assert_eq!(req.recipient_address, "0xaaa");

        let alt = json!({"payment_required": true, "amount": 0.25, "address": "0xbbb"});
        let req = PaymentRequirement::from_json_body(&alt).unwrap();
        assert_eq!(req.recipient_address, "0xbbb");
    }

    #[test]
    fn json_body_requires_marker() {
        let body = json!({"amount": 0.25, "recipient": "0xaaa"});
        assert!(PaymentRequirement::from_json_body(&body).is_none());
    }

    #[test]
    fn detection_ors_status_and_marker() {
        let marker = headers(&[("X-Payment-Required", "true")]);
        assert!(is_payment_required(402, &HeaderMap::new()));
        assert!(is_payment_required(200, &marker));
        assert!(!is_payment_required(200, &HeaderMap::new()));

        let off = headers(&[("X-Payment-Required", "false")]);
        assert!(!is_payment_required(200, &off));
    }

    #[test]
    fn strategy_order_prefers_headers_over_body() {
        let h = headers(&[
            ("X-Payment-Amount", "0.10"),
            ("X-Payment-Address", "0xheader"),
        ]);
        let body = json!({"payment_required": true, "amount": 9.0, "recipient": "0xbody"});
        let req = parse_payment_requirement(402, &h, Some(&body)).unwrap();
        assert_eq!(req.recipient_address, "0xheader");
        assert_eq!(req.amount, 0.10);
    }

    #[test]
    fn falls_back_to_body_when_headers_unusable() {
        let body = json!({"payment_required": true, "amount": 0.5, "recipient": "0xbody"});
        let req = parse_payment_requirement(402, &HeaderMap::new(), Some(&body)).unwrap();
        assert_eq!(req.recipient_address, "0xbody");
    }

    #[test]
    fn unusable_demand_parses_to_none() {
        assert!(parse_payment_requirement(402, &HeaderMap::new(), None).is_none());
        let junk = json!({"payment_required": true});
        assert!(parse_payment_requirement(402, &HeaderMap::new(), Some(&junk)).is_none());
    }

    #[test]
    fn builder_renders_six_decimal_amount() {
        let pairs = payment_required_headers(0.1, "0xABCtest", Some("pay-1"), None);
        let amount = pairs
            .iter()
            .find(|(name, _)| *name == "X-Payment-Amount")
            .map(|(_, v)| v.as_str());
        assert_eq!(amount, Some("0.100000"));
        assert!(pairs.iter().any(|(n, v)| *n == "X-Payment-Id" && v == "pay-1"));
        assert!(!pairs.iter().any(|(n, _)| *n == "X-Payment-Description"));
    }
}
