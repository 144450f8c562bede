use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// Coarse, advisory token classification derived from name/symbol text.
/// Keyword matching only; never validated against any ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCategory {
    Creative,
    Gaming,
    DevTools,
    General,
}

const CREATIVE_KEYWORDS: &[&str] = &["art", "nft", "creative", "paint", "pixel", "music"];
const GAMING_KEYWORDS: &[&str] = &["game", "play", "quest", "arcade", "guild"];
const DEV_KEYWORDS: &[&str] = &["dev", "protocol", "infra", "tool", "chain", "node"];

/// Derive a category from token name and symbol by keyword matching.
///
/// This is a known-approximate heuristic: "Smart Contract Art Gallery" and
/// "Artificial Sweetener Coin" both land in `Creative`. Downstream treats
/// the tag as advisory UI grouping, nothing more.
pub fn classify(name: &str, symbol: &str) -> TokenCategory {
    let haystack = format!("{} {}", name, symbol).to_lowercase();

    if CREATIVE_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        TokenCategory::Creative
    } else if GAMING_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        TokenCategory::Gaming
    } else if DEV_KEYWORDS.iter().any(|k| haystack.contains(k)) {
        TokenCategory::DevTools
    } else {
        TokenCategory::General
    }
}

/// Canonical metadata read from the contract at discovery time.
/// `name`/`symbol` are immutable once persisted.
#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: ethers::types::U256,
    pub category: TokenCategory,
}

/// Which provider produced an accepted quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    DexPair,
    MarketApi,
    KeyedProvider,
    Fallback,
}

/// A single normalized market-data snapshot for one token from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub daily_change: f64,
    pub holders: Option<u64>,
    pub source: QuoteSource,
}

impl Quote {
    pub fn empty(source: QuoteSource) -> Self {
        Self {
            price: 0.0,
            market_cap: 0.0,
            volume_24h: 0.0,
            daily_change: 0.0,
            holders: None,
            source,
        }
    }
}

/// The persisted token aggregate. `contract_address` is the only identity;
/// the price half of the pipeline only ever touches the market snapshot
/// fields and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub contract_address: Address,
    pub name: String,
    pub symbol: String,
    pub creator_address: Option<Address>,
    pub category: TokenCategory,
    pub price: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub daily_change: f64,
    pub holders: Option<u64>,
    pub has_valid_market_cap: bool,
    pub last_price_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Creation-time fields, written exactly once per address.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub creator_address: Option<Address>,
    pub category: TokenCategory,
}

/// Full re-derivation of the market fields. Every write carries the whole
/// snapshot so concurrent writers resolve by last-write-wins.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub price: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub daily_change: f64,
    pub holders: Option<u64>,
    pub has_valid_market_cap: bool,
    pub updated_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn from_quote(quote: &Quote, has_valid_market_cap: bool) -> Self {
        Self {
            price: quote.price,
            market_cap: quote.market_cap,
            volume_24h: quote.volume_24h,
            daily_change: quote.daily_change,
            holders: quote.holders,
            has_valid_market_cap,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_creative_keywords() {
        assert_eq!(classify("Pixel Art Collective", "PIX"), TokenCategory::Creative);
        assert_eq!(classify("SomeToken", "NFTX"), TokenCategory::Creative);
    }

    #[test]
    fn classify_gaming_keywords() {
        assert_eq!(classify("Arcade Quest", "AQ"), TokenCategory::Gaming);
        assert_eq!(classify("playcoin", "PLC"), TokenCategory::Gaming);
    }

    #[test]
    fn classify_dev_keywords() {
        assert_eq!(classify("Lending Protocol", "LEND"), TokenCategory::DevTools);
    }

    #[test]
    fn classify_defaults_to_general() {
        assert_eq!(classify("Foo", "FOO"), TokenCategory::General);
        assert_eq!(classify("", ""), TokenCategory::General);
    }

    #[test]
    fn classify_priority_is_creative_first() {
        // "art game" matches both tables; creative wins by table order.
        assert_eq!(classify("Art Game", "AG"), TokenCategory::Creative);
    }

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(classify("GAME", "X"), TokenCategory::Gaming);
    }
}
