//! End-to-end allocation requests against in-memory collaborators.
//!
//! Drives `AllocationPipeline` and the HTTP router, decoding the streamed
//! body the way a browser client would.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use yield_allocator::engine::executor::ExecutionOrchestrator;
use yield_allocator::engine::pipeline::AllocationPipeline;
use yield_allocator::engine::progress::ProgressChannel;
use yield_allocator::server::{build_router, ServerState};
use yield_allocator::types::{OutcomeStatus, Protocol};
use yield_allocator::wallet::WalletProvider;
use yield_allocator::wire::{self, StreamOutcome, StreamReader};

use crate::mock_protocols::{MockExecutor, MockMarkets, MockWallet, WALLET};

struct Harness {
    pipeline: Arc<AllocationPipeline>,
    wallet: Arc<dyn WalletProvider>,
    markets: Arc<MockMarkets>,
    executor: Arc<MockExecutor>,
}

fn harness(markets: MockMarkets, wallet: MockWallet, executor: MockExecutor, timeout: Duration) -> Harness {
    let markets = Arc::new(markets);
    let executor = Arc::new(executor);
    let wallet: Arc<dyn WalletProvider> = Arc::new(wallet);
    let pipeline = AllocationPipeline::new(
        markets.clone(),
        Arc::clone(&wallet),
        ExecutionOrchestrator::new(executor.clone(), timeout, "USDC"),
        WALLET,
        "USDC",
    );
    Harness {
        pipeline: Arc::new(pipeline),
        wallet,
        markets,
        executor,
    }
}

fn default_harness() -> Harness {
    harness(
        MockMarkets::new("USDC"),
        MockWallet::new(10_000, 1_000_000_000_000_000_000),
        MockExecutor::new(),
        Duration::from_secs(5),
    )
}

/// Run one request and decode it chunk by chunk as it arrives.
async fn request(h: &Harness, body: &str) -> StreamOutcome {
    let (progress, mut stream) = ProgressChannel::new(8);
    let pipeline = Arc::clone(&h.pipeline);
    let body = body.as_bytes().to_vec();
    let task = tokio::spawn(async move { pipeline.run(&body, progress).await });

    let mut reader = StreamReader::new();
    while let Some(chunk) = stream.next_line().await {
        reader.push(&chunk);
    }
    task.await.unwrap();
    reader.finish()
}

#[tokio::test]
async fn test_reference_split_end_to_end() {
    let h = default_harness();
    let outcome = request(&h, r#"{"amount": 1000}"#).await;

    assert!(outcome.succeeded(), "logs: {:?}", outcome.logs);
    let text = outcome.logs.join("\n");
    assert!(text.contains("Allocation Strategy (Score-based: Moonwell 7.5 vs Morpho 5.7):"));
    assert!(text.contains("moonwell: 57.0% (569.908815 USDC)"));
    assert!(text.contains("morpho: 43.0% (430.091185 USDC)"));

    let result = outcome.result.unwrap();
    let amounts: Vec<f64> = result.allocation.allocations.iter().map(|a| a.amount).collect();
    assert!((amounts[0] - 1000.0 * 7.5 / 13.16).abs() < 1e-6);
    assert!((amounts[1] - 1000.0 * 5.66 / 13.16).abs() < 1e-6);
    assert!((amounts.iter().sum::<f64>() - 1000.0).abs() < 1e-6);

    let formatted: Vec<&str> = result.deposits.iter().map(|d| d.formatted_amount.as_str()).collect();
    assert_eq!(formatted, vec!["569.91", "430.09"]);

    let mut submitted: Vec<String> = h.executor.submitted().into_iter().map(|t| t.amount).collect();
    submitted.sort();
    assert_eq!(submitted, vec!["430.09".to_string(), "569.91".to_string()]);
}

#[tokio::test]
async fn test_stage_lines_in_order() {
    let h = default_harness();
    let outcome = request(&h, r#"{"amount": 100}"#).await;

    let position = |needle: &str| {
        outcome
            .logs
            .iter()
            .position(|l| l.starts_with(needle))
            .unwrap_or_else(|| panic!("missing {needle}"))
    };
    let fetching = position("Fetching market data...");
    let found = position("Found markets:");
    let analyzing = position("Analyzing market conditions...");
    let strategy = position("Allocation Strategy");
    let depositing = position("Depositing");
    let results = position("Deposit Results:");

    assert!(fetching < found && found < analyzing && analyzing < strategy);
    assert!(strategy < depositing && depositing < results);
}

#[tokio::test]
async fn test_one_deposit_fails_result_still_lists_both() {
    let h = harness(
        MockMarkets::new("USDC"),
        MockWallet::new(10_000, 0),
        MockExecutor::new().failing(Protocol::Morpho),
        Duration::from_secs(5),
    );
    let outcome = request(&h, r#"{"amount": 1000}"#).await;

    assert!(outcome.succeeded());
    assert!(outcome
        .logs
        .iter()
        .any(|l| l == "Error: Morpho deposit failed: execution reverted"));
    assert!(outcome.logs.iter().any(|l| l.starts_with("✗ Morpho:")));
    assert!(outcome.logs.iter().any(|l| l.starts_with("✓ Moonwell: 569.91 USDC")));

    let deposits = outcome.result.unwrap().deposits;
    assert_eq!(deposits.len(), 2);
    assert_eq!(deposits[0].status, Some(OutcomeStatus::Succeeded));
    assert_eq!(deposits[1].status, Some(OutcomeStatus::Failed));
    assert_eq!(deposits[1].formatted_amount, "430.09");
}

#[tokio::test]
async fn test_slow_deposit_times_out_without_blocking_sibling() {
    let h = harness(
        MockMarkets::new("USDC"),
        MockWallet::new(10_000, 0),
        MockExecutor::new().delayed(Protocol::Moonwell, Duration::from_secs(30)),
        Duration::from_millis(100),
    );
    let outcome = request(&h, r#"{"amount": 50}"#).await;

    let deposits = outcome.result.unwrap().deposits;
    assert_eq!(deposits[0].status, Some(OutcomeStatus::TimedOut));
    assert_eq!(deposits[1].status, Some(OutcomeStatus::Succeeded));
    assert!(outcome
        .logs
        .iter()
        .any(|l| l == "Error: Moonwell deposit timed out after 100ms"));
}

#[tokio::test]
async fn test_wrong_asset_vault_falls_back_to_moonwell() {
    let h = harness(
        MockMarkets::new("WETH"),
        MockWallet::new(10_000, 0),
        MockExecutor::new(),
        Duration::from_secs(5),
    );
    let outcome = request(&h, r#"{"amount": 321.5}"#).await;

    assert!(outcome
        .logs
        .iter()
        .any(|l| l == "Skipping Morpho vault as it's not a USDC vault"));
    let result = outcome.result.unwrap();
    assert_eq!(result.allocation.allocations.len(), 1);
    assert_eq!(result.allocation.allocations[0].protocol, Protocol::Moonwell);
    assert_eq!(result.allocation.allocations[0].amount, 321.5);
    assert_eq!(h.executor.submitted().len(), 1);
}

#[tokio::test]
async fn test_above_balance_rejected_before_market_calls() {
    let h = harness(
        MockMarkets::new("USDC"),
        MockWallet::new(100, 0),
        MockExecutor::new(),
        Duration::from_secs(5),
    );
    let outcome = request(&h, r#"{"amount": 100.01}"#).await;

    assert!(!outcome.succeeded());
    assert!(outcome.last_error().unwrap().contains("exceeds available balance of 100.00 USDC"));
    assert!(h.markets.calls().is_empty());
    assert!(h.executor.submitted().is_empty());
}

#[tokio::test]
async fn test_oversized_amount_ends_stream_with_error() {
    let h = default_harness();
    let outcome = request(&h, r#"{"amount": 1e25}"#).await;

    assert!(!outcome.succeeded());
    assert_eq!(outcome.logs.len(), 1);
    assert!(outcome.logs[0].starts_with("Error: Invalid input:"));
    assert!(h.markets.calls().is_empty());
}

#[tokio::test]
async fn test_market_outage_ends_stream_with_error() {
    let markets = MockMarkets::new("USDC");
    markets.set_error(Protocol::Moonwell, "Moonwell API error 502 Bad Gateway");
    let h = harness(markets, MockWallet::new(10_000, 0), MockExecutor::new(), Duration::from_secs(5));

    let outcome = request(&h, r#"{"amount": 10}"#).await;
    assert!(!outcome.succeeded());
    assert_eq!(
        outcome.last_error(),
        Some("Market unavailable (Moonwell): Moonwell API error 502 Bad Gateway")
    );
    assert!(h.executor.submitted().is_empty());
}

#[tokio::test]
async fn test_identical_requests_identical_allocation() {
    let h = default_harness();
    let a = request(&h, r#"{"amount": 777.77}"#).await.result.unwrap();
    let b = request(&h, r#"{"amount": 777.77}"#).await.result.unwrap();
    assert_eq!(
        serde_json::to_string(&a.allocation).unwrap(),
        serde_json::to_string(&b.allocation).unwrap()
    );
}

// ---------------------------------------------------------------------------
// Over HTTP
// ---------------------------------------------------------------------------

fn router(h: &Harness) -> axum::Router {
    build_router(Arc::new(ServerState {
        pipeline: Arc::clone(&h.pipeline),
        wallet: Arc::clone(&h.wallet),
        stream_capacity: 4,
    }))
}

#[tokio::test]
async fn test_http_allocation_stream() {
    let h = default_harness();
    let req = Request::builder()
        .method("POST")
        .uri("/api/allocator")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"amount": 1000}"#))
        .unwrap();
    let resp = router(&h).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");

    let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    let outcome = wire::decode(&String::from_utf8(body.to_vec()).unwrap());
    assert!(outcome.succeeded());
    assert_eq!(outcome.result.unwrap().deposits.len(), 2);
}

#[tokio::test]
async fn test_http_wallet_info() {
    let h = default_harness();
    let resp = router(&h)
        .oneshot(Request::builder().uri("/api/wallet/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["usdcBalance"], 10_000_000_000u64);
    assert_eq!(json["ethBalance"], 1.0);
}
