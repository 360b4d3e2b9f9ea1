//! x402 autonomous payment protocol for USDC on Arc.
//!
//! When a request comes back `402 Payment Required`, the handler parses the
//! payment demand, checks it against a spend ceiling, pays through the
//! gateway rail, waits for settlement, and retries the original request
//! exactly once with an `X-Payment-Proof` token attached.
//!
//! # Quick Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use x402::{EventBus, GatewayClient, X402Handler};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), x402::X402Error> {
//! let bus = Arc::new(EventBus::new());
//! let rail = GatewayClient::new("YOUR_API_KEY")?;
//! let handler = X402Handler::new(rail, bus, "wallet-id", "0xYourAddress");
//!
//! let report = handler
//!     .pay_and_access("https://api.example.com/premium-report", reqwest::Method::GET)
//!     .await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod proof;
pub mod requirement;

pub use bus::{handler as event_handler, Event, EventBus, EventHandler, EventType, HandlerResult};
pub use config::HandlerConfig;
pub use constants::*;
pub use error::X402Error;
pub use gateway::{GatewayClient, PaymentRail, Transfer, TransferStatus};
pub use handler::{HttpReply, PaymentRecord, X402Handler};
pub use proof::PaymentProof;
pub use requirement::{
    is_payment_required, parse_payment_requirement, payment_required_headers, PaymentRequirement,
};
