//! Driver runs session registries on tokio tasks

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::config::PitcrewConfig;
use crate::landmarks::LandmarkCatalog;
use crate::provider::TickSource;
use crate::providers::ChannelSource;
use crate::registry::SessionRegistry;
use crate::repository::Repository;
use crate::types::Tick;
use crate::{PitcrewError, Result};

/// Consecutive source errors after which a worker gives up.
const MAX_ERRORS: u32 = 10;

/// Handle to a running worker
pub struct DriverHandle {
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    shard: usize,
    join: JoinHandle<SessionRegistry>,
}

impl DriverHandle {
    /// Wait for the worker to finish and take back its registry.
    pub async fn join(self) -> Result<SessionRegistry> {
        let shard = self.shard;
        self.join.await.map_err(|e| {
            error!(shard, error = %e, "Worker task failed");
            PitcrewError::WorkerClosed { shard }
        })
    }

    /// Cancel the worker, wait for its final flush and take back its registry.
    pub async fn shutdown(self) -> Result<SessionRegistry> {
        self.cancel.cancel();
        self.join().await
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Driver spawns and manages tick processing tasks
///
/// A worker task owns one [`SessionRegistry`] and one [`TickSource`]. Ticks
/// are processed one at a time; when the source ends or the worker is
/// cancelled, the registry is flushed with `on_stop` and handed back.
pub struct Driver;

impl Driver {
    /// Spawn a worker for the given registry and source
    pub fn spawn<S>(registry: SessionRegistry, source: S) -> DriverHandle
    where
        S: TickSource,
    {
        Self::spawn_shard(0, registry, source)
    }

    fn spawn_shard<S>(shard: usize, registry: SessionRegistry, source: S) -> DriverHandle
    where
        S: TickSource,
    {
        let cancel = CancellationToken::new();
        let cancel_worker = cancel.clone();
        let join = tokio::spawn(async move {
            Self::worker_task(shard, registry, source, cancel_worker).await
        });
        DriverHandle { cancel, shard, join }
    }

    /// Worker task - pulls ticks from the source into the registry
    async fn worker_task<S>(
        shard: usize,
        mut registry: SessionRegistry,
        mut source: S,
        cancel: CancellationToken,
    ) -> SessionRegistry
    where
        S: TickSource,
    {
        info!(shard, "Worker started");
        let mut tick_count = 0u64;
        let mut error_count = 0u32;

        loop {
            // Use select to allow cancellation while waiting on the source
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(shard, "Worker cancelled");
                    break;
                }
                result = source.next_tick() => result,
            };

            match result {
                Ok(Some(tick)) => {
                    tick_count += 1;
                    error_count = 0;
                    trace!(shard, tick = tick_count, topic = %tick.topic, "Routing tick");
                    registry.notify_tick(&tick);
                }
                Ok(None) => {
                    info!(shard, ticks = tick_count, "Source ended");
                    break;
                }
                Err(e) => {
                    // Source error - don't crash on transient failures
                    error_count += 1;
                    error!(shard, error = %e, "Source error ({}/{})", error_count, MAX_ERRORS);

                    if error_count >= MAX_ERRORS {
                        error!(shard, "Too many source errors, shutting down");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ... capped at 1.6s
                    let backoff = std::time::Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        registry.on_stop();
        info!(shard, ticks = tick_count, stats = ?registry.stats(), "Worker ended");
        registry
    }
}

/// Several workers, each with its own registry, fed by topic hash.
///
/// All ticks of a topic land on the same worker, so per-topic ordering is
/// kept while topics are processed in parallel. Workers share the repository
/// and the landmark catalog.
pub struct ShardedDriver {
    senders: Vec<mpsc::Sender<Tick>>,
    workers: Vec<DriverHandle>,
}

impl ShardedDriver {
    /// Spawn `shards` workers, each buffering up to `capacity` ticks.
    pub fn spawn(
        shards: usize,
        capacity: usize,
        repository: Arc<dyn Repository>,
        config: PitcrewConfig,
    ) -> Self {
        let shards = shards.max(1);
        let catalog = Arc::new(LandmarkCatalog::new());
        let (senders, workers): (Vec<_>, Vec<_>) = (0..shards)
            .map(|shard| {
                let (sender, source) = ChannelSource::channel(capacity);
                let registry = SessionRegistry::with_catalog(
                    Arc::clone(&repository),
                    Arc::clone(&catalog),
                    config.clone(),
                );
                (sender, Driver::spawn_shard(shard, registry, source))
            })
            .unzip();
        debug!(shards, capacity, "Spawned sharded driver");
        Self { senders, workers }
    }

    pub fn shards(&self) -> usize {
        self.senders.len()
    }

    /// Worker responsible for `topic`.
    pub fn shard_for(&self, topic: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        topic.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    /// Queue a tick on its worker, waiting while the worker's buffer is full.
    pub async fn dispatch(&self, tick: Tick) -> Result<()> {
        let shard = self.shard_for(&tick.topic);
        self.senders[shard].send(tick).await.map_err(|_| PitcrewError::WorkerClosed { shard })
    }

    /// Stop accepting ticks, let every worker drain its buffer and flush, and
    /// take back the registries in shard order.
    pub async fn shutdown(self) -> Result<Vec<SessionRegistry>> {
        drop(self.senders);
        join_all(self.workers).await
    }

    /// Stop every worker without draining buffered ticks.
    pub async fn cancel(self) -> Result<Vec<SessionRegistry>> {
        for worker in &self.workers {
            worker.cancel.cancel();
        }
        drop(self.senders);
        join_all(self.workers).await
    }
}

/// Wait for every worker, even after one failed; the first failure is returned.
async fn join_all(workers: Vec<DriverHandle>) -> Result<Vec<SessionRegistry>> {
    let mut registries = Vec::with_capacity(workers.len());
    let mut first_error = None;
    for worker in workers {
        match worker.join().await {
            Ok(registry) => registries.push(registry),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(registries),
    }
}
