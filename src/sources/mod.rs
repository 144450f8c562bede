use anyhow::Result;
use async_trait::async_trait;
use ethers::types::Address;

use crate::types::Quote;

pub mod dexpair;
pub mod keyed;
pub mod market;

pub use dexpair::DexPairSource;
pub use keyed::KeyedProviderSource;
pub use market::MarketApiSource;

/// One external market-data provider. The aggregation engine walks an
/// ordered list of these and takes the first quote; every outbound call a
/// provider makes must carry a bounded timeout.
#[async_trait]
pub trait PriceSource: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Whether this source can prove an active, liquid trading pair. Only
    /// such a source may cause `has_valid_market_cap` to be set.
    fn proves_liquidity(&self) -> bool {
        false
    }

    /// A quote satisfying this source's own validity predicate, or `None`
    /// when the source has no usable data for the address. Transport-level
    /// failures may surface as `Err`; the engine treats both the same way
    /// and moves on to the next source.
    async fn fetch(&self, address: Address) -> Result<Option<Quote>>;
}

/// Lower-cased 0x-prefixed form used in provider URLs and response keys.
pub(crate) fn address_path(address: Address) -> String {
    format!("{:?}", address)
}
