use anyhow::Result;
use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::providers::Middleware;
use ethers::types::{Address, U256};
use log::debug;
use std::sync::Arc;

use crate::types::{classify, TokenMetadata};

abigen!(
    Erc20,
    r#"[
        function name() external view returns (string)
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
        function totalSupply() external view returns (uint256)
    ]"#
);

/// Resolves a candidate address into canonical token metadata, or decides it
/// is not a fungible token at all. Never errors past this boundary: a
/// candidate that cannot be resolved is simply not a token.
#[async_trait]
pub trait MetadataResolver: Send + Sync + 'static {
    async fn resolve(&self, address: Address) -> Result<Option<TokenMetadata>>;
}

pub struct Erc20MetadataResolver<M> {
    provider: Arc<M>,
}

impl<M> Erc20MetadataResolver<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<M: Middleware + 'static> MetadataResolver for Erc20MetadataResolver<M> {
    async fn resolve(&self, address: Address) -> Result<Option<TokenMetadata>> {
        let contract = Erc20::new(address, self.provider.clone());

        // A large fraction of creation-like transactions are not tokens.
        // Missing name or symbol disqualifies the candidate silently.
        let name = match contract.name().call().await {
            Ok(name) if !name.trim().is_empty() => name,
            Ok(_) | Err(_) => {
                debug!("candidate {:?} has no readable name, dropping", address);
                return Ok(None);
            }
        };
        let symbol = match contract.symbol().call().await {
            Ok(symbol) if !symbol.trim().is_empty() => symbol,
            Ok(_) | Err(_) => {
                debug!("candidate {:?} has no readable symbol, dropping", address);
                return Ok(None);
            }
        };

        // Not every token implements the optional views.
        let decimals = contract.decimals().call().await.unwrap_or(18);
        let total_supply = contract
            .total_supply()
            .call()
            .await
            .unwrap_or_else(|_| U256::zero());

        let category = classify(&name, &symbol);
        Ok(Some(TokenMetadata {
            address,
            name,
            symbol,
            decimals,
            total_supply,
            category,
        }))
    }
}
