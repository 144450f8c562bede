use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::Address;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_log::test;

use tokenpipe::engine::{placeholder_quote, PriceAggregationEngine};
use tokenpipe::sources::PriceSource;
use tokenpipe::types::{Quote, QuoteSource};

/// Scripted source: serves a fixed outcome and counts how often it is hit.
struct StubSource {
    name: &'static str,
    proves_liquidity: bool,
    outcome: Result<Option<Quote>, String>,
    calls: Arc<AtomicUsize>,
}

impl StubSource {
    fn serving(name: &'static str, proves_liquidity: bool, quote: Quote) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                name,
                proves_liquidity,
                outcome: Ok(Some(quote)),
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn empty(name: &'static str) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                name,
                proves_liquidity: false,
                outcome: Ok(None),
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn failing(name: &'static str) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                name,
                proves_liquidity: false,
                outcome: Err("503 service unavailable".to_string()),
                calls: calls.clone(),
            }),
            calls,
        )
    }
}

#[async_trait]
impl PriceSource for StubSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn proves_liquidity(&self) -> bool {
        self.proves_liquidity
    }

    async fn fetch(&self, _address: Address) -> Result<Option<Quote>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(quote) => Ok(quote.clone()),
            Err(e) => Err(anyhow!(e.clone())),
        }
    }
}

fn quote(source: QuoteSource, price: f64, market_cap: f64) -> Quote {
    Quote {
        price,
        market_cap,
        volume_24h: 0.0,
        daily_change: 0.0,
        holders: None,
        source,
    }
}

#[test(tokio::test)]
async fn primary_source_wins_and_sets_valid_market_cap() {
    let (primary, _) = StubSource::serving(
        "dex-pairs",
        true,
        quote(QuoteSource::DexPair, 0.002, 5000.0),
    );
    let (secondary, secondary_calls) = StubSource::serving(
        "market-api",
        false,
        quote(QuoteSource::MarketApi, 99.0, 999999.0),
    );

    let engine = PriceAggregationEngine::new(vec![primary, secondary], 1000.0);
    let result = engine.aggregate(Address::random()).await;

    assert_eq!(result.quote.source, QuoteSource::DexPair);
    assert_eq!(result.quote.price, 0.002);
    assert!(result.has_valid_market_cap);
    // Strict priority: later sources are never consulted.
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
}

#[test(tokio::test)]
async fn primary_below_liquidity_floor_is_not_validated() {
    let (primary, _) = StubSource::serving(
        "dex-pairs",
        true,
        quote(QuoteSource::DexPair, 0.002, 800.0),
    );

    let engine = PriceAggregationEngine::new(vec![primary], 1000.0);
    let result = engine.aggregate(Address::random()).await;

    assert_eq!(result.quote.market_cap, 800.0);
    assert!(!result.has_valid_market_cap);
}

#[test(tokio::test)]
async fn secondary_market_cap_is_never_trusted() {
    let (primary, _) = StubSource::empty("dex-pairs");
    let (secondary, _) = StubSource::serving(
        "market-api",
        false,
        quote(QuoteSource::MarketApi, 0.01, 500.0),
    );

    let engine = PriceAggregationEngine::new(vec![primary, secondary], 100.0);
    let result = engine.aggregate(Address::random()).await;

    assert_eq!(result.quote.source, QuoteSource::MarketApi);
    assert_eq!(result.quote.market_cap, 500.0);
    // Positive cap from a source that cannot prove a live pair.
    assert!(!result.has_valid_market_cap);
}

#[test(tokio::test)]
async fn failed_source_is_skipped_not_fatal() {
    let (primary, primary_calls) = StubSource::failing("dex-pairs");
    let (secondary, _) = StubSource::serving(
        "market-api",
        false,
        quote(QuoteSource::MarketApi, 0.5, 0.0),
    );

    let engine = PriceAggregationEngine::new(vec![primary, secondary], 1000.0);
    let result = engine.aggregate(Address::random()).await;

    assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.quote.source, QuoteSource::MarketApi);
}

#[test(tokio::test)]
async fn all_sources_down_yields_deterministic_placeholder() {
    let (primary, _) = StubSource::failing("dex-pairs");
    let (secondary, _) = StubSource::empty("market-api");
    let (tertiary, _) = StubSource::failing("keyed-provider");

    let engine = PriceAggregationEngine::new(vec![primary, secondary, tertiary], 1000.0);
    let address = Address::random();
    let result = engine.aggregate(address).await;

    assert_eq!(result.quote.source, QuoteSource::Fallback);
    assert_eq!(result.quote.price, 0.0);
    assert_eq!(result.quote.market_cap, 0.0);
    assert_eq!(result.quote.volume_24h, 0.0);
    assert!(!result.has_valid_market_cap);
    assert_eq!(result.quote, placeholder_quote(address));
}

#[test(tokio::test)]
async fn empty_source_list_still_produces_a_quote() {
    let engine = PriceAggregationEngine::new(vec![], 1000.0);
    let result = engine.aggregate(Address::random()).await;
    assert_eq!(result.quote.source, QuoteSource::Fallback);
}
