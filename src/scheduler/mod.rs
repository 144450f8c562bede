use anyhow::Result;
use ethers::types::Address;
use futures::future::join_all;
use log::{debug, info, warn};
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::engine::PriceAggregationEngine;
use crate::metrics::{METRIC_PASS_SECONDS, METRIC_TOKENS_UPDATED, METRIC_UPDATE_FAILURES};
use crate::persistence::{TokenStore, TokenUpsert};
use crate::types::MarketSnapshot;

/// Outcome of one full pass over the active token set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub tokens: usize,
    pub batches: usize,
    pub updated: usize,
}

/// Drives the aggregation engine over every active token on a fixed cadence.
///
/// Batches are the backpressure mechanism: members of a batch run
/// concurrently, batches run strictly one after another with a fixed delay
/// in between, so the instantaneous outbound request rate is capped no
/// matter how many tokens are tracked. The interval never self-adjusts;
/// more tokens just means a longer (staler) full sweep.
pub struct BatchScheduler<S> {
    engine: Arc<PriceAggregationEngine>,
    store: Arc<S>,
    batch_size: usize,
    batch_delay: Duration,
    pass_interval: Duration,
}

impl<S: TokenStore> BatchScheduler<S> {
    pub fn new(
        engine: Arc<PriceAggregationEngine>,
        store: Arc<S>,
        batch_size: usize,
        batch_delay: Duration,
        pass_interval: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            batch_size: batch_size.max(1),
            batch_delay,
            pass_interval,
        }
    }

    /// Timer-driven loop, runs until the shutdown channel flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = interval(self.pass_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("price scheduler stopping");
                    return;
                }
                _ = tick.tick() => {
                    match self.run_pass().await {
                        Ok(stats) => debug!(
                            "pass complete: {}/{} tokens updated in {} batches",
                            stats.updated, stats.tokens, stats.batches
                        ),
                        Err(e) => warn!("scheduler pass failed: {e:#}"),
                    }
                }
            }
        }
    }

    /// One full sweep: list, partition, process each batch fully before the
    /// inter-batch delay and the next one. A token failing inside a batch
    /// never blocks its siblings.
    pub async fn run_pass(&self) -> Result<PassStats> {
        let started = Instant::now();
        let tokens = self.store.list_active().await?;
        let mut stats = PassStats {
            tokens: tokens.len(),
            ..PassStats::default()
        };

        for batch in tokens.chunks(self.batch_size) {
            if stats.batches > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }
            stats.batches += 1;

            let results = join_all(
                batch
                    .iter()
                    .map(|token| self.update_token(token.contract_address)),
            )
            .await;
            stats.updated += results.into_iter().filter(|ok| *ok).count();
        }

        gauge!(METRIC_PASS_SECONDS, started.elapsed().as_secs_f64());
        Ok(stats)
    }

    /// Aggregate-then-persist for a single token. Also the manual refresh
    /// path: safe to race with an in-flight batch touching the same token,
    /// since every write is a full snapshot and the store resolves
    /// last-write-wins per row.
    pub async fn update_token(&self, address: Address) -> bool {
        let aggregated = self.engine.aggregate(address).await;
        let snapshot =
            MarketSnapshot::from_quote(&aggregated.quote, aggregated.has_valid_market_cap);

        match self
            .store
            .upsert_by_address(address, TokenUpsert::Market(snapshot))
            .await
        {
            Ok(_) => {
                counter!(METRIC_TOKENS_UPDATED, 1);
                true
            }
            Err(e) => {
                counter!(METRIC_UPDATE_FAILURES, 1);
                warn!("market update failed for {:?}: {e:#}", address);
                false
            }
        }
    }
}
