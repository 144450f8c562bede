use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use ethers::types::Address;

use crate::types::{MarketSnapshot, NewToken, Token};

/// One upsert, keyed by contract address. Creation writes the immutable
/// identity fields exactly once; a market write only ever touches the
/// snapshot fields and timestamps.
#[derive(Debug, Clone)]
pub enum TokenUpsert {
    Create(NewToken),
    Market(MarketSnapshot),
}

/// Persistence contract consumed by the pipeline. The real gateway lives
/// outside this subsystem; all the pipeline requires is an atomic
/// upsert-by-unique-key per address. Textual address representations are
/// expected to be lower-cased by the implementing adapter.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Atomic per-address upsert. `Create` for an existing address is a
    /// no-op returning the existing row (discovery idempotence); `Market`
    /// for a missing address is an error.
    async fn upsert_by_address(&self, address: Address, fields: TokenUpsert) -> Result<Token>;

    /// Every token eligible for the scheduler's next pass. Soft-disabled
    /// rows are excluded.
    async fn list_active(&self) -> Result<Vec<Token>>;
}

/// In-memory adapter. Reference semantics for the upsert contract and the
/// store used by tests; a deployment wires its own gateway behind the same
/// trait.
#[derive(Default)]
pub struct InMemoryTokenStore {
    rows: DashMap<Address, Token>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<Token> {
        self.rows.get(address).map(|r| r.value().clone())
    }

    /// Test/seeding hook for rows that arrived outside the discovery path.
    pub fn insert_raw(&self, token: Token) {
        self.rows.insert(token.contract_address, token);
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn upsert_by_address(&self, address: Address, fields: TokenUpsert) -> Result<Token> {
        match fields {
            TokenUpsert::Create(new) => {
                let now = Utc::now();
                let entry = self.rows.entry(address).or_insert_with(|| Token {
                    contract_address: address,
                    name: new.name,
                    symbol: new.symbol,
                    creator_address: new.creator_address,
                    category: new.category,
                    price: 0.0,
                    market_cap: 0.0,
                    volume_24h: 0.0,
                    daily_change: 0.0,
                    holders: None,
                    has_valid_market_cap: false,
                    last_price_update: None,
                    created_at: now,
                    updated_at: now,
                    is_active: true,
                });
                Ok(entry.value().clone())
            }
            TokenUpsert::Market(snap) => {
                let mut row = self
                    .rows
                    .get_mut(&address)
                    .ok_or_else(|| anyhow!("market update for unknown token {address:?}"))?;
                row.price = snap.price;
                row.market_cap = snap.market_cap;
                row.volume_24h = snap.volume_24h;
                row.daily_change = snap.daily_change;
                row.holders = snap.holders;
                row.has_valid_market_cap = snap.has_valid_market_cap;
                row.last_price_update = Some(snap.updated_at);
                row.updated_at = snap.updated_at;
                Ok(row.value().clone())
            }
        }
    }

    async fn list_active(&self) -> Result<Vec<Token>> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.value().is_active)
            .map(|r| r.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenCategory;

    fn new_token(address: Address) -> NewToken {
        NewToken {
            address,
            name: "Foo".to_string(),
            symbol: "FOO".to_string(),
            creator_address: None,
            category: TokenCategory::General,
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_per_address() {
        let store = InMemoryTokenStore::new();
        let address = Address::random();

        store
            .upsert_by_address(address, TokenUpsert::Create(new_token(address)))
            .await
            .unwrap();

        let mut renamed = new_token(address);
        renamed.name = "Bar".to_string();
        let row = store
            .upsert_by_address(address, TokenUpsert::Create(renamed))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        // Identity fields are never rewritten after creation.
        assert_eq!(row.name, "Foo");
    }

    #[tokio::test]
    async fn market_update_touches_only_snapshot_fields() {
        let store = InMemoryTokenStore::new();
        let address = Address::random();
        store
            .upsert_by_address(address, TokenUpsert::Create(new_token(address)))
            .await
            .unwrap();

        let snap = MarketSnapshot {
            price: 0.002,
            market_cap: 5000.0,
            volume_24h: 120.0,
            daily_change: -3.5,
            holders: Some(44),
            has_valid_market_cap: true,
            updated_at: Utc::now(),
        };
        let row = store
            .upsert_by_address(address, TokenUpsert::Market(snap))
            .await
            .unwrap();

        assert_eq!(row.name, "Foo");
        assert_eq!(row.symbol, "FOO");
        assert_eq!(row.price, 0.002);
        assert!(row.has_valid_market_cap);
        assert!(row.last_price_update.is_some());
    }

    #[tokio::test]
    async fn market_update_for_unknown_address_fails() {
        let store = InMemoryTokenStore::new();
        let snap = MarketSnapshot {
            price: 1.0,
            market_cap: 1.0,
            volume_24h: 0.0,
            daily_change: 0.0,
            holders: None,
            has_valid_market_cap: false,
            updated_at: Utc::now(),
        };
        let result = store
            .upsert_by_address(Address::random(), TokenUpsert::Market(snap))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_active_skips_disabled_rows() {
        let store = InMemoryTokenStore::new();
        let active = Address::random();
        let disabled = Address::random();
        store
            .upsert_by_address(active, TokenUpsert::Create(new_token(active)))
            .await
            .unwrap();
        let mut row = store
            .upsert_by_address(disabled, TokenUpsert::Create(new_token(disabled)))
            .await
            .unwrap();
        row.is_active = false;
        store.insert_raw(row);

        let listed = store.list_active().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].contract_address, active);
    }
}
