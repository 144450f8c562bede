use anyhow::{anyhow, Result};
use ethers::providers::{Middleware, PubsubClient, SubscriptionStream};
use ethers::types::{Block, Transaction, TransactionReceipt, TxHash};
use std::sync::Arc;

/// Thin wrapper over the chain RPC endpoint. Everything the discovery half
/// needs from the provider goes through here: head number, block bodies,
/// receipts, and (where the transport supports pubsub) a live block stream.
pub struct BlockSource<M> {
    provider: Arc<M>,
}

impl<M> Clone for BlockSource<M> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
        }
    }
}

impl<M: Middleware + 'static> BlockSource<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> Arc<M> {
        self.provider.clone()
    }

    pub async fn head_block_number(&self) -> Result<u64> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| anyhow!("get_block_number failed: {e}"))?;
        Ok(number.as_u64())
    }

    pub async fn block_with_txs(&self, number: u64) -> Result<Option<Block<Transaction>>> {
        self.provider
            .get_block_with_txs(number)
            .await
            .map_err(|e| anyhow!("get_block_with_txs({number}) failed: {e}"))
    }

    pub async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| anyhow!("get_transaction_receipt({tx_hash:?}) failed: {e}"))
    }
}

impl<M: Middleware + 'static> BlockSource<M>
where
    M::Provider: PubsubClient,
{
    /// Live push stream of new block headers. The caller owns reconnects:
    /// when the stream ends, resubscribe; the periodic sweep covers any
    /// blocks missed in between.
    pub async fn subscribe_blocks(
        &self,
    ) -> Result<SubscriptionStream<'_, M::Provider, Block<TxHash>>> {
        self.provider
            .subscribe_blocks()
            .await
            .map_err(|e| anyhow!("block subscription failed: {e}"))
    }
}
