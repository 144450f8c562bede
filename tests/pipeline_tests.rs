//! End-to-end path: a direct-creation transaction becomes a persisted token
//! with no market data, and the next scheduler pass fills the snapshot in.

use anyhow::Result;
use async_trait::async_trait;
use ethers::providers::Provider;
use ethers::types::{Address, Block, Transaction, TransactionReceipt, H256, U256, U64};
use std::sync::Arc;
use std::time::Duration;
use test_log::test;

use tokenpipe::chain::BlockSource;
use tokenpipe::detector::TokenCreationDetector;
use tokenpipe::engine::PriceAggregationEngine;
use tokenpipe::metadata::MetadataResolver;
use tokenpipe::persistence::InMemoryTokenStore;
use tokenpipe::scheduler::BatchScheduler;
use tokenpipe::sources::PriceSource;
use tokenpipe::types::{classify, Quote, QuoteSource, TokenCategory, TokenMetadata};

struct FooResolver;

#[async_trait]
impl MetadataResolver for FooResolver {
    async fn resolve(&self, address: Address) -> Result<Option<TokenMetadata>> {
        Ok(Some(TokenMetadata {
            address,
            name: "Foo".to_string(),
            symbol: "FOO".to_string(),
            decimals: 18,
            total_supply: U256::zero(),
            category: classify("Foo", "FOO"),
        }))
    }
}

struct PrimaryOnly;

#[async_trait]
impl PriceSource for PrimaryOnly {
    fn name(&self) -> &'static str {
        "dex-pairs"
    }

    fn proves_liquidity(&self) -> bool {
        true
    }

    async fn fetch(&self, _address: Address) -> Result<Option<Quote>> {
        Ok(Some(Quote {
            price: 0.002,
            market_cap: 5000.0,
            volume_24h: 42.0,
            daily_change: 1.5,
            holders: None,
            source: QuoteSource::DexPair,
        }))
    }
}

#[test(tokio::test)]
async fn discovery_then_first_price_pass() {
    let store = Arc::new(InMemoryTokenStore::new());
    let token = Address::random();
    let creator = Address::random();

    // Discovery half: one direct-creation transaction whose receipt carries
    // the deployed contract address.
    let (provider, mock) = Provider::mocked();
    let detector = TokenCreationDetector::new(
        BlockSource::new(Arc::new(provider)),
        Arc::new(FooResolver),
        store.clone(),
        vec![],
    );

    let mut receipt = TransactionReceipt::default();
    receipt.contract_address = Some(token);
    mock.push(receipt).unwrap();

    let mut tx = Transaction::default();
    tx.hash = H256::random();
    tx.from = creator;
    tx.to = None;
    let mut block = Block::default();
    block.number = Some(U64::from(1));
    block.transactions = vec![tx];
    mock.push(block).unwrap();

    detector.process_block(1).await.unwrap();

    let created = store.get(&token).expect("token created exactly once");
    assert_eq!(store.len(), 1);
    assert_eq!(created.name, "Foo");
    assert_eq!(created.symbol, "FOO");
    assert_eq!(created.creator_address, Some(creator));
    assert_eq!(created.category, TokenCategory::General);
    assert_eq!(created.price, 0.0);
    assert_eq!(created.market_cap, 0.0);
    assert!(!created.has_valid_market_cap);
    assert!(created.last_price_update.is_none());

    // Price half: the next scheduled pass with only the primary source
    // answering promotes the row to a validated market cap.
    let engine = Arc::new(PriceAggregationEngine::new(
        vec![Arc::new(PrimaryOnly)],
        1000.0,
    ));
    let scheduler = BatchScheduler::new(
        engine,
        store.clone(),
        5,
        Duration::from_millis(1),
        Duration::from_secs(120),
    );
    let stats = scheduler.run_pass().await.unwrap();
    assert_eq!(stats.updated, 1);

    let updated = store.get(&token).unwrap();
    assert_eq!(updated.price, 0.002);
    assert_eq!(updated.market_cap, 5000.0);
    assert!(updated.has_valid_market_cap);
    assert!(updated.last_price_update.is_some());
    // Identity fields untouched by the price half.
    assert_eq!(updated.name, "Foo");
    assert_eq!(updated.symbol, "FOO");
}
