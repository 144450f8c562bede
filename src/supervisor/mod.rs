use anyhow::Result;
use ethers::providers::{Middleware, PubsubClient};
use ethers::types::Address;
use futures::StreamExt;
use log::{info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};

use crate::chain::BlockSource;
use crate::config::PipelineConfig;
use crate::detector::TokenCreationDetector;
use crate::engine::PriceAggregationEngine;
use crate::metadata::MetadataResolver;
use crate::persistence::TokenStore;
use crate::scheduler::BatchScheduler;

const RESUBSCRIBE_PAUSE: Duration = Duration::from_secs(5);

/// The only externally observable health surface. Built from atomics; never
/// touches the network.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PipelineHealth {
    pub watcher_running: bool,
    pub scheduler_running: bool,
    pub last_checked_block: u64,
}

/// Top-level lifecycle owner for both halves of the pipeline: the
/// block-watch loop (push subscription plus reconciliation sweep) and the
/// batch-scheduler loop. All loop state lives here, handed to the tasks by
/// `Arc`, so independent pipeline instances can coexist.
pub struct PipelineSupervisor<M, R, S> {
    config: PipelineConfig,
    blocks: BlockSource<M>,
    detector: Arc<TokenCreationDetector<M, R, S>>,
    scheduler: Arc<BatchScheduler<S>>,
    shutdown_tx: watch::Sender<bool>,
    watcher_running: Arc<AtomicBool>,
    scheduler_running: Arc<AtomicBool>,
    started: AtomicBool,
    tasks: Mutex<Option<JoinSet<()>>>,
}

impl<M, R, S> PipelineSupervisor<M, R, S>
where
    M: Middleware + 'static,
    R: MetadataResolver,
    S: TokenStore,
{
    pub fn new(
        config: PipelineConfig,
        provider: Arc<M>,
        resolver: Arc<R>,
        store: Arc<S>,
    ) -> Result<Self> {
        let blocks = BlockSource::new(provider);
        let detector = Arc::new(TokenCreationDetector::new(
            blocks.clone(),
            resolver,
            store.clone(),
            config.factory_addresses.clone(),
        ));
        let engine = Arc::new(PriceAggregationEngine::from_config(&config)?);
        let scheduler = Arc::new(BatchScheduler::new(
            engine,
            store,
            config.batch_size,
            config.batch_delay,
            config.pass_interval,
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            blocks,
            detector,
            scheduler,
            shutdown_tx,
            watcher_running: Arc::new(AtomicBool::new(false)),
            scheduler_running: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            tasks: Mutex::new(None),
        })
    }

    /// Start both loops exactly once. A second call while running is a
    /// no-op; a failed start may be retried. Configuration problems are
    /// fatal here, per the error taxonomy.
    pub async fn initialize(&self) -> Result<()>
    where
        M::Provider: PubsubClient,
    {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        if let Err(e) = self.start_loops().await {
            self.started.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    async fn start_loops(&self) -> Result<()>
    where
        M::Provider: PubsubClient,
    {
        self.config.validate()?;

        // No historical backfill: the watermark starts at the current head.
        let head = self.blocks.head_block_number().await?;
        self.detector.set_watermark(head);
        info!("starting pipeline at block {head}");

        let mut set = JoinSet::new();

        set.spawn(run_block_watcher(
            self.blocks.clone(),
            self.detector.clone(),
            self.config.sweep_interval,
            self.config.max_sweep_span,
            self.shutdown_tx.subscribe(),
            self.watcher_running.clone(),
        ));

        let scheduler = self.scheduler.clone();
        let scheduler_running = self.scheduler_running.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        set.spawn(async move {
            scheduler_running.store(true, Ordering::Release);
            scheduler.run(shutdown_rx).await;
            scheduler_running.store(false, Ordering::Release);
        });

        *self.tasks.lock().await = Some(set);
        Ok(())
    }

    /// Stop accepting block notifications, let in-flight per-token calls
    /// finish against their own timeouts, then return. Dropping the last
    /// provider handle releases the chain connection.
    pub async fn shutdown(&self) {
        if !self.started.load(Ordering::Acquire) {
            return;
        }
        let _ = self.shutdown_tx.send(true);

        if let Some(mut set) = self.tasks.lock().await.take() {
            while set.join_next().await.is_some() {}
        }
        self.started.store(false, Ordering::Release);
        info!("pipeline stopped");
    }

    pub fn health_check(&self) -> PipelineHealth {
        PipelineHealth {
            watcher_running: self.watcher_running.load(Ordering::Acquire),
            scheduler_running: self.scheduler_running.load(Ordering::Acquire),
            last_checked_block: self.detector.last_checked_block(),
        }
    }

    /// Manual single-token refresh: the exact aggregation-then-persist step
    /// of the batch path, outside the cadence. Returns false when the token
    /// is unknown or the write failed.
    pub async fn force_update_token(&self, address: Address) -> bool {
        self.scheduler.update_token(address).await
    }

    /// Run the discovery catch-up on demand rather than waiting for the next
    /// sweep tick. Returns the number of blocks processed.
    pub async fn sync_from_source(&self) -> Result<u64> {
        self.detector.catch_up(self.config.max_sweep_span).await
    }
}

/// Block-watch loop: live push subscription for latency, periodic bounded
/// sweep for at-least-once coverage. Subscription drops or failures fall
/// back to sweep-only operation until the next (re)subscribe attempt.
async fn run_block_watcher<M, R, S>(
    blocks: BlockSource<M>,
    detector: Arc<TokenCreationDetector<M, R, S>>,
    sweep_interval: Duration,
    max_sweep_span: u64,
    mut shutdown: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
) where
    M: Middleware + 'static,
    M::Provider: PubsubClient,
    R: MetadataResolver,
    S: TokenStore,
{
    running.store(true, Ordering::Release);

    let mut sweep = interval(sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'outer: loop {
        match blocks.subscribe_blocks().await {
            Ok(mut stream) => loop {
                tokio::select! {
                    _ = shutdown.changed() => break 'outer,
                    _ = sweep.tick() => {
                        if let Err(e) = detector.catch_up(max_sweep_span).await {
                            warn!("reconciliation sweep failed: {e:#}");
                        }
                    }
                    maybe_block = stream.next() => match maybe_block {
                        Some(block) => {
                            if let Some(number) = block.number {
                                detector.handle_live_block(number.as_u64()).await;
                            }
                        }
                        None => {
                            warn!("block subscription ended, resubscribing");
                            break;
                        }
                    }
                }
            },
            Err(e) => {
                warn!("block subscription unavailable: {e:#}");
                // Sweep still advances the watermark while we wait.
                tokio::select! {
                    _ = shutdown.changed() => break 'outer,
                    _ = sweep.tick() => {
                        if let Err(e) = detector.catch_up(max_sweep_span).await {
                            warn!("reconciliation sweep failed: {e:#}");
                        }
                    }
                }
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(RESUBSCRIBE_PAUSE) => {}
        }
    }

    running.store(false, Ordering::Release);
    info!("block watcher stopped");
}
