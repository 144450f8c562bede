use anyhow::{anyhow, Result};
use dashmap::DashMap;
use ethers::providers::Middleware;
use ethers::types::{Address, Transaction, H256};
use ethers::utils::keccak256;
use log::{debug, info, warn};
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::chain::BlockSource;
use crate::metadata::MetadataResolver;
use crate::metrics::{
    METRIC_BLOCKS_SCANNED, METRIC_CANDIDATES_FOUND, METRIC_CANDIDATES_REJECTED,
    METRIC_TOKENS_CREATED, METRIC_WATERMARK,
};
use crate::persistence::{TokenStore, TokenUpsert};
use crate::types::NewToken;

/// Cap on the in-process dedup set. Once reached the set is dropped
/// wholesale; persistence stays the idempotency barrier, so the only cost
/// of a reset is a repeat metadata call per rediscovered candidate.
pub const SEEN_CAPACITY: usize = 4096;

/// A contract address suspected, but not yet confirmed, to be a fungible
/// token, together with the account whose transaction produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub address: Address,
    pub creator: Address,
}

/// Heuristic new-token detection over full blocks.
///
/// Two signals qualify a transaction for receipt inspection: a null `to`
/// (direct contract creation) or a recipient in the configured factory set.
/// Qualifying receipts are searched for a Transfer log minted from the zero
/// address; for direct creations the receipt's `contract_address` is the
/// fallback candidate. Both signals are treated as equally trustworthy,
/// which produces false positives (any deploy, any unrelated mint) and
/// false negatives (factories outside the configured list). That is the
/// intended fidelity: this is a screener, not an indexer.
pub struct TokenCreationDetector<M, R, S> {
    blocks: BlockSource<M>,
    resolver: Arc<R>,
    store: Arc<S>,
    factory_addresses: Vec<Address>,
    transfer_topic: H256,
    /// Addresses already handled by this process. Persistence remains the
    /// real idempotency barrier; this only saves repeat metadata calls.
    seen: DashMap<Address, ()>,
    /// Last block known to have been fully processed.
    watermark: AtomicU64,
}

impl<M, R, S> TokenCreationDetector<M, R, S>
where
    M: Middleware + 'static,
    R: MetadataResolver,
    S: TokenStore,
{
    pub fn new(
        blocks: BlockSource<M>,
        resolver: Arc<R>,
        store: Arc<S>,
        factory_addresses: Vec<Address>,
    ) -> Self {
        Self {
            blocks,
            resolver,
            store,
            factory_addresses,
            transfer_topic: H256::from(keccak256(b"Transfer(address,address,uint256)")),
            seen: DashMap::new(),
            watermark: AtomicU64::new(0),
        }
    }

    pub fn last_checked_block(&self) -> u64 {
        self.watermark.load(Ordering::Acquire)
    }

    /// Size of the in-process dedup set, bounded by [`SEEN_CAPACITY`].
    pub fn seen_candidates(&self) -> usize {
        self.seen.len()
    }

    pub fn set_watermark(&self, block_number: u64) {
        self.watermark.store(block_number, Ordering::Release);
        gauge!(METRIC_WATERMARK, block_number as f64);
    }

    fn advance_watermark(&self, block_number: u64) {
        self.watermark.fetch_max(block_number, Ordering::AcqRel);
        gauge!(METRIC_WATERMARK, self.last_checked_block() as f64);
    }

    fn qualifies(&self, tx: &Transaction) -> bool {
        match tx.to {
            None => true,
            Some(to) => self.factory_addresses.contains(&to),
        }
    }

    fn mint_log_address(&self, logs: &[ethers::types::Log]) -> Option<Address> {
        logs.iter()
            .find(|log| {
                log.topics.len() >= 2
                    && log.topics[0] == self.transfer_topic
                    && log.topics[1] == H256::zero()
            })
            .map(|log| log.address)
    }

    /// Examine one block and return candidate token addresses. RPC errors
    /// for an individual transaction or receipt never abort the scan; a
    /// block that cannot be fetched at all is an error so the sweep can
    /// retry it later.
    pub async fn scan_block(&self, block_number: u64) -> Result<Vec<Candidate>> {
        let block = self
            .blocks
            .block_with_txs(block_number)
            .await?
            .ok_or_else(|| anyhow!("block {block_number} not available yet"))?;

        counter!(METRIC_BLOCKS_SCANNED, 1);
        let mut candidates = Vec::new();

        for tx in &block.transactions {
            if !self.qualifies(tx) {
                continue;
            }

            let receipt = match self.blocks.receipt(tx.hash).await {
                Ok(Some(receipt)) => receipt,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        "receipt fetch failed for {:?} in block {}: {e:#}",
                        tx.hash, block_number
                    );
                    continue;
                }
            };

            let address = match self.mint_log_address(&receipt.logs) {
                Some(address) => Some(address),
                // Direct creations still yield a candidate without a mint.
                None if tx.to.is_none() => receipt.contract_address,
                None => None,
            };

            if let Some(address) = address {
                counter!(METRIC_CANDIDATES_FOUND, 1);
                candidates.push(Candidate {
                    address,
                    creator: tx.from,
                });
            }
        }

        Ok(candidates)
    }

    /// Scan a block and push confirmed tokens through the create path.
    /// Per-candidate failures are isolated; only a failed block fetch
    /// propagates.
    pub async fn process_block(&self, block_number: u64) -> Result<()> {
        let candidates = self.scan_block(block_number).await?;

        for candidate in candidates {
            if self.seen.len() >= SEEN_CAPACITY {
                debug!("seen-candidate set full, resetting");
                self.seen.clear();
            }
            if self.seen.insert(candidate.address, ()).is_some() {
                continue;
            }

            match self.resolver.resolve(candidate.address).await {
                Ok(Some(meta)) => {
                    let created = self
                        .store
                        .upsert_by_address(
                            candidate.address,
                            TokenUpsert::Create(NewToken {
                                address: candidate.address,
                                name: meta.name.clone(),
                                symbol: meta.symbol.clone(),
                                creator_address: Some(candidate.creator),
                                category: meta.category,
                            }),
                        )
                        .await;
                    match created {
                        Ok(token) => {
                            counter!(METRIC_TOKENS_CREATED, 1);
                            info!(
                                "discovered token {} ({}) at {:?} in block {}",
                                token.name, token.symbol, candidate.address, block_number
                            );
                        }
                        Err(e) => {
                            // Let the sweep try the candidate again.
                            self.seen.remove(&candidate.address);
                            warn!("create failed for {:?}: {e:#}", candidate.address);
                        }
                    }
                }
                Ok(None) => {
                    counter!(METRIC_CANDIDATES_REJECTED, 1);
                    debug!("candidate {:?} is not a token", candidate.address);
                }
                Err(e) => {
                    self.seen.remove(&candidate.address);
                    warn!("metadata resolution failed for {:?}: {e:#}", candidate.address);
                }
            }
        }

        Ok(())
    }

    /// Live-subscription path: process the pushed block, then advance the
    /// watermark only when the block is contiguous with it. A push that
    /// lands past a gap must not move the watermark, or the sweep would
    /// never revisit the skipped blocks. Failures are left to the sweep.
    pub async fn handle_live_block(&self, block_number: u64) {
        match self.process_block(block_number).await {
            Ok(()) => {
                let current = self.last_checked_block();
                if block_number == current.saturating_add(1) {
                    self.advance_watermark(block_number);
                } else if block_number > current {
                    debug!(
                        "live block {block_number} leaves blocks {}..{} to the sweep",
                        current + 1,
                        block_number - 1
                    );
                }
            }
            Err(e) => warn!("live scan of block {block_number} failed, sweep will retry: {e:#}"),
        }
    }

    /// Periodic reconciliation sweep: re-scan anything between the watermark
    /// and the chain head the subscription may have missed, bounded to
    /// `max_span` blocks per sweep. Returns the number of blocks processed.
    pub async fn catch_up(&self, max_span: u64) -> Result<u64> {
        let head = self.blocks.head_block_number().await?;
        let from = self.last_checked_block().saturating_add(1);
        if from > head {
            return Ok(0);
        }
        let to = head.min(from.saturating_add(max_span.saturating_sub(1)));

        let mut processed = 0;
        for number in from..=to {
            match self.process_block(number).await {
                Ok(()) => {
                    self.advance_watermark(number);
                    processed += 1;
                }
                Err(e) => {
                    // Stop without advancing so the next sweep retries here.
                    warn!("sweep stalled at block {number}: {e:#}");
                    break;
                }
            }
        }

        if processed > 0 {
            debug!("sweep processed {processed} blocks up to {}", self.last_checked_block());
        }
        Ok(processed)
    }
}
