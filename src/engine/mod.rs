use ethers::types::Address;
use ethers::utils::keccak256;
use log::{debug, warn};
use metrics::counter;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::metrics::{METRIC_QUOTES_ACCEPTED, METRIC_SOURCE_FAILURES};
use crate::sources::{DexPairSource, KeyedProviderSource, MarketApiSource, PriceSource};
use crate::types::{Quote, QuoteSource};

/// An accepted quote plus the trust decision derived from where it came
/// from. `has_valid_market_cap` means "the quote came from the one source
/// able to prove an active, liquid trading pair, and the cap clears the
/// minimum-liquidity floor".
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedQuote {
    pub quote: Quote,
    pub has_valid_market_cap: bool,
}

/// Walks an ordered list of price sources and returns the first quote that
/// passes its source's own validity predicate. No merging, no averaging,
/// no synchronous retries: a failed source is simply skipped until the next
/// scheduled pass. If every live source comes up empty, a deterministic
/// placeholder keeps pre-launch tokens rankable.
pub struct PriceAggregationEngine {
    sources: Vec<Arc<dyn PriceSource>>,
    min_liquidity_floor: f64,
}

impl PriceAggregationEngine {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, min_liquidity_floor: f64) -> Self {
        Self {
            sources,
            min_liquidity_floor,
        }
    }

    /// Standard source chain from configuration: trading-pair index first,
    /// then the token-price API, then the keyed provider when configured.
    pub fn from_config(config: &PipelineConfig) -> anyhow::Result<Self> {
        let mut sources: Vec<Arc<dyn PriceSource>> = vec![Arc::new(DexPairSource::new(
            config.dex_api_url.clone(),
            config.http_timeout,
        )?)];

        if let Some(url) = &config.market_api_url {
            sources.push(Arc::new(MarketApiSource::new(
                url.clone(),
                config.http_timeout,
            )?));
        }

        if config.keyed_provider_enabled() {
            // Both checked by keyed_provider_enabled.
            let url = config.keyed_provider_url.clone().unwrap_or_default();
            let key = config.keyed_provider_api_key.clone().unwrap_or_default();
            sources.push(Arc::new(KeyedProviderSource::new(
                url,
                key,
                config.http_timeout,
            )?));
        }

        Ok(Self::new(sources, config.min_liquidity_floor))
    }

    /// Total: always produces a quote. The placeholder path must never be
    /// mistaken for market data, so it forces price/cap/volume to zero and
    /// never sets `has_valid_market_cap`.
    pub async fn aggregate(&self, address: Address) -> AggregatedQuote {
        for source in &self.sources {
            match source.fetch(address).await {
                Ok(Some(quote)) => {
                    counter!(METRIC_QUOTES_ACCEPTED, 1, "source" => source.name());
                    let has_valid_market_cap =
                        source.proves_liquidity() && quote.market_cap > self.min_liquidity_floor;
                    return AggregatedQuote {
                        quote,
                        has_valid_market_cap,
                    };
                }
                Ok(None) => {
                    debug!("{} has no data for {:?}", source.name(), address);
                }
                Err(e) => {
                    counter!(METRIC_SOURCE_FAILURES, 1, "source" => source.name());
                    warn!("{} unavailable for {:?}: {e:#}", source.name(), address);
                }
            }
        }

        AggregatedQuote {
            quote: placeholder_quote(address),
            has_valid_market_cap: false,
        }
    }
}

/// Deterministic low-signal placeholder derived from a stable hash of the
/// address. Gives pre-launch tokens a bounded holder estimate for UI
/// ordering and nothing else.
pub fn placeholder_quote(address: Address) -> Quote {
    let digest = keccak256(address.as_bytes());
    let seed = u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ]);
    Quote {
        holders: Some(10 + seed % 490),
        ..Quote::empty(QuoteSource::Fallback)
    }
}
