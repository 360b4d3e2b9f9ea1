//! Wire-level constants for the x402 protocol on Arc.

/// Boolean marker header set by paywalled endpoints alongside (or instead of)
/// a 402 status code. Proxies sometimes rewrite status codes, so detection
/// checks both.
pub const HEADER_PAYMENT_REQUIRED: &str = "X-Payment-Required";

/// Required payment amount, formatted as a decimal string (`"0.100000"`).
pub const HEADER_PAYMENT_AMOUNT: &str = "X-Payment-Amount";

/// Payment currency. Defaults to [`DEFAULT_CURRENCY`] when absent.
pub const HEADER_PAYMENT_CURRENCY: &str = "X-Payment-Currency";

/// Destination address for the payment.
pub const HEADER_PAYMENT_ADDRESS: &str = "X-Payment-Address";

/// Chain identifier. Defaults to [`DEFAULT_NETWORK`] when absent.
pub const HEADER_PAYMENT_NETWORK: &str = "X-Payment-Network";

/// Optional opaque payment id chosen by the resource server.
pub const HEADER_PAYMENT_ID: &str = "X-Payment-Id";

/// Optional human-readable description of what is being paid for.
pub const HEADER_PAYMENT_DESCRIPTION: &str = "X-Payment-Description";

/// Optional lower bound the server will accept.
pub const HEADER_PAYMENT_MIN_AMOUNT: &str = "X-Payment-Min-Amount";

/// Optional upper bound the server will accept.
pub const HEADER_PAYMENT_MAX_AMOUNT: &str = "X-Payment-Max-Amount";

/// Proof-of-payment token attached to the retried request
/// (base64-encoded JSON, see [`crate::proof::PaymentProof`]).
pub const HEADER_PAYMENT_PROOF: &str = "X-Payment-Proof";

/// Plain transaction hash attached to the retried request.
pub const HEADER_PAYMENT_TX_HASH: &str = "X-Payment-TxHash";

/// Currency assumed when a payment demand omits one.
pub const DEFAULT_CURRENCY: &str = "USDC";

/// Chain identifier assumed when a payment demand omits one.
pub const DEFAULT_NETWORK: &str = "ARC";

/// A decoded proof is accepted when its amount is at least this fraction of
/// the expected amount. Rail fee rounding can shave a fraction of a cent.
pub const PROOF_AMOUNT_TOLERANCE: f64 = 0.99;

/// Maximum number of events retained by the bus before FIFO eviction.
pub const EVENT_HISTORY_CAPACITY: usize = 1000;

/// Default base URL of the payment gateway REST API.
pub const DEFAULT_GATEWAY_URL: &str = "https://api.circle.com/v1";
