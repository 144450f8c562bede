use anyhow::Result;
use async_trait::async_trait;
use ethers::types::Address;
use log::warn;
use serde::Deserialize;
use std::time::Duration;

use crate::sources::{address_path, PriceSource};
use crate::types::{Quote, QuoteSource};

/// Tertiary source: an authenticated provider that only knows spot prices.
/// Skipped entirely when no API key is configured. Market cap, volume and
/// change default to zero and it never contributes a valid market cap.
pub struct KeyedProviderSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceResponse {
    usd_price: Option<f64>,
}

impl KeyedProviderSource {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl PriceSource for KeyedProviderSource {
    fn name(&self) -> &'static str {
        "keyed-provider"
    }

    async fn fetch(&self, address: Address) -> Result<Option<Quote>> {
        let url = format!("{}/v2/erc20/{}/price", self.base_url, address_path(address));

        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            warn!("keyed-provider returned {} for {:?}", status, address);
            return Ok(None);
        }

        let body: PriceResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("keyed-provider body unreadable for {:?}: {}", address, e);
                return Ok(None);
            }
        };

        Ok(body.usd_price.filter(|p| *p > 0.0).map(|price| Quote {
            price,
            market_cap: 0.0,
            volume_24h: 0.0,
            daily_change: 0.0,
            holders: None,
            source: QuoteSource::KeyedProvider,
        }))
    }
}
