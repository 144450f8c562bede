use anyhow::Result;
use async_trait::async_trait;
use ethers::types::Address;
use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;

use crate::sources::{address_path, PriceSource};
use crate::types::{Quote, QuoteSource};

/// Primary source: a trading-pair index in the DexScreener API shape.
/// When a token trades in several pairs, the one with the highest reported
/// liquidity wins. This is the only source trusted to prove a live pair.
pub struct DexPairSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenPairsResponse {
    pairs: Option<Vec<PairData>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairData {
    price_usd: Option<String>,
    market_cap: Option<f64>,
    fdv: Option<f64>,
    liquidity: Option<PairLiquidity>,
    volume: Option<PairWindow>,
    price_change: Option<PairWindow>,
}

#[derive(Debug, Deserialize)]
struct PairLiquidity {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PairWindow {
    h24: Option<f64>,
}

impl PairData {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity
            .as_ref()
            .and_then(|l| l.usd)
            .unwrap_or(0.0)
    }
}

impl DexPairSource {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

/// Select the highest-liquidity pair and normalize it. Returns `None`
/// unless both price and market cap are strictly positive; a pair index
/// reporting zeros has nothing to prove.
fn best_pair_quote(pairs: &[PairData]) -> Option<Quote> {
    let best = pairs
        .iter()
        .max_by(|a, b| a.liquidity_usd().total_cmp(&b.liquidity_usd()))?;

    let price = best
        .price_usd
        .as_deref()
        .and_then(|p| p.parse::<f64>().ok())
        .unwrap_or(0.0);
    let market_cap = best.market_cap.or(best.fdv).unwrap_or(0.0);

    if price <= 0.0 || market_cap <= 0.0 {
        return None;
    }

    Some(Quote {
        price,
        market_cap,
        volume_24h: best.volume.as_ref().and_then(|w| w.h24).unwrap_or(0.0),
        daily_change: best.price_change.as_ref().and_then(|w| w.h24).unwrap_or(0.0),
        holders: None,
        source: QuoteSource::DexPair,
    })
}

#[async_trait]
impl PriceSource for DexPairSource {
    fn name(&self) -> &'static str {
        "dex-pairs"
    }

    fn proves_liquidity(&self) -> bool {
        true
    }

    async fn fetch(&self, address: Address) -> Result<Option<Quote>> {
        let url = format!(
            "{}/latest/dex/tokens/{}",
            self.base_url,
            address_path(address)
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("dex-pairs returned {} for {:?}", status, address);
            return Ok(None);
        }

        let body: TokenPairsResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("dex-pairs body unreadable for {:?}: {}", address, e);
                return Ok(None);
            }
        };

        let pairs = body.pairs.unwrap_or_default();
        if pairs.is_empty() {
            debug!("dex-pairs has no pairs for {:?}", address);
            return Ok(None);
        }

        Ok(best_pair_quote(&pairs))
    }
}
