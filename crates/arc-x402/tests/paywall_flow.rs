//! End-to-end x402 flow against a local paywall server.
//!
//! The fixture is a minimal HTTP/1.1 server on a loopback socket: it demands
//! payment until it sees an `X-Payment-Proof` header, counts every request,
//! and records the last request so tests can assert on the proof headers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use serde_json::Value;
use x402::{
    EventBus, EventType, HandlerConfig, PaymentProof, PaymentRail, Transfer, TransferStatus,
    X402Error, X402Handler,
};

struct Paywall {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    last_request: Arc<Mutex<String>>,
}

/// Spawn the paywall fixture. When `always_402` is set, even paid requests
/// are denied again — the "paid but still denied" pathology.
async fn spawn_paywall(always_402: bool, free: bool) -> Paywall {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let last_request = Arc::new(Mutex::new(String::new()));

    let hits_srv = hits.clone();
    let last_srv = last_request.clone();
    tokio::spawn(async move {
        loop {
            let (mut sock, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let hits = hits_srv.clone();
            let last = last_srv.clone();

            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                loop {
                    match sock.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => read += n,
                    }
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") || read == buf.len() {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&buf[..read]).to_string();
                hits.fetch_add(1, Ordering::SeqCst);
                *last.lock().unwrap() = request.clone();

                let paid = request.to_ascii_lowercase().contains("x-payment-proof:");
                let response = if free || (paid && !always_402) {
                    let body = r#"{"report":"premium","pages":3}"#;
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    )
                } else {
                    "HTTP/1.1 402 Payment Required\r\n\
                     X-Payment-Required: true\r\n\
                     X-Payment-Amount: 0.100000\r\n\
                     X-Payment-Currency: USDC\r\n\
                     X-Payment-Address: 0xABCtest\r\n\
                     X-Payment-Network: ARC\r\n\
                     Content-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string()
                };
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });

    Paywall {
        addr,
        hits,
        last_request,
    }
}

/// Rail stub that settles every transfer on the first poll.
struct InstantRail;

impl PaymentRail for InstantRail {
    async fn create_transfer(
        &self,
        destination_address: &str,
        amount: f64,
        source_wallet_id: &str,
        chain: &str,
        _metadata: Option<Value>,
    ) -> Result<Transfer, X402Error> {
        Ok(Transfer {
            id: "tr-flow-1".to_string(),
            status: TransferStatus::Pending,
            tx_hash: Some("0xdeadbeef".to_string()),
            amount,
            currency: "USDC".to_string(),
            source_wallet_id: source_wallet_id.to_string(),
            destination_address: destination_address.to_string(),
            chain: chain.to_string(),
        })
    }

    async fn poll_transfer(&self, transfer_id: &str) -> Result<Transfer, X402Error> {
        Ok(Transfer {
            id: transfer_id.to_string(),
            status: TransferStatus::Complete,
            tx_hash: Some("0xdeadbeef".to_string()),
            amount: 0.1,
            currency: "USDC".to_string(),
            source_wallet_id: "wallet-1".to_string(),
            destination_address: "0xABCtest".to_string(),
            chain: "ARC".to_string(),
        })
    }

    async fn get_balance(&self, _wallet_id: &str) -> Result<HashMap<String, f64>, X402Error> {
        Ok(HashMap::from([("USDC".to_string(), 1000.0)]))
    }
}

fn make_handler(bus: Arc<EventBus>) -> X402Handler<InstantRail> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
    X402Handler::with_config(
        InstantRail,
        bus,
        "wallet-1",
        "0xPayer",
        HandlerConfig {
            max_auto_payment: 1.0,
            poll_interval: Duration::from_millis(5),
            settle_timeout: Duration::from_millis(100),
        },
    )
}

#[tokio::test]
async fn happy_path_pays_once_and_gets_the_resource() {
    let paywall = spawn_paywall(false, false).await;
    let bus = Arc::new(EventBus::new());
    let handler = make_handler(bus.clone());
    let url = format!("http://{}/report", paywall.addr);

    let reply = handler
        .fetch_with_payment(&url, reqwest::Method::GET, None, None, true)
        .await
        .unwrap();

    assert_eq!(reply.status, 200);
    assert_eq!(reply.body["report"], "premium");
    assert_eq!(paywall.hits.load(Ordering::SeqCst), 2);

    // The retried request carried the plain tx hash and a decodable proof.
    let last = paywall.last_request.lock().unwrap().clone();
    let lower = last.to_ascii_lowercase();
    assert!(lower.contains("x-payment-txhash: 0xdeadbeef"));
    // Base64 is case-sensitive: match the name case-insensitively but take
    // the value from the raw request text.
    let token = last
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("x-payment-proof:"))
        .and_then(|l| l.splitn(2, ':').nth(1))
        .map(|v| v.trim().to_string())
        .expect("proof header missing");
    let proof = PaymentProof::from_header(&token).unwrap();
    assert_eq!(proof.tx_hash, "0xdeadbeef");
    assert!(proof.covers(0.1));

    assert_eq!(handler.payment_history().len(), 1);
    assert!((handler.total_spent() - 0.1).abs() < 1e-9);

    let events = bus.get_history(None, 10);
    assert_eq!(events[0].event_type, EventType::PaymentInitiated);
    assert_eq!(events[1].event_type, EventType::PaymentCompleted);
}

#[tokio::test]
async fn always_denied_resource_gets_exactly_one_retry() {
    let paywall = spawn_paywall(true, false).await;
    let handler = make_handler(Arc::new(EventBus::new()));
    let url = format!("http://{}/report", paywall.addr);

    let err = handler
        .fetch_with_payment(&url, reqwest::Method::GET, None, None, true)
        .await
        .unwrap_err();

    assert!(matches!(err, X402Error::ProtocolReplay(_)));
    // Exactly two HTTP requests: the original and one paid retry.
    assert_eq!(paywall.hits.load(Ordering::SeqCst), 2);
    // Exactly one payment was made despite the repeated demand.
    assert_eq!(handler.payment_history().len(), 1);
}

#[tokio::test]
async fn free_resource_is_fetched_without_payment() {
    let paywall = spawn_paywall(false, true).await;
    let handler = make_handler(Arc::new(EventBus::new()));
    let url = format!("http://{}/open", paywall.addr);

    let reply = handler
        .fetch_with_payment(&url, reqwest::Method::GET, None, None, true)
        .await
        .unwrap();

    assert_eq!(reply.status, 200);
    assert_eq!(paywall.hits.load(Ordering::SeqCst), 1);
    assert!(handler.payment_history().is_empty());
}

#[tokio::test]
async fn auto_pay_off_returns_the_402_untouched() {
    let paywall = spawn_paywall(false, false).await;
    let handler = make_handler(Arc::new(EventBus::new()));
    let url = format!("http://{}/report", paywall.addr);

    let reply = handler
        .fetch_with_payment(&url, reqwest::Method::GET, None, None, false)
        .await
        .unwrap();

    assert_eq!(reply.status, 402);
    assert_eq!(paywall.hits.load(Ordering::SeqCst), 1);
    assert!(handler.payment_history().is_empty());
}

#[tokio::test]
async fn pay_and_access_returns_the_body() {
    let paywall = spawn_paywall(false, false).await;
    let handler = make_handler(Arc::new(EventBus::new()));
    let url = format!("http://{}/report", paywall.addr);

    let body = handler
        .pay_and_access(&url, reqwest::Method::GET)
        .await
        .unwrap();

    assert_eq!(body["pages"], 3);
}
