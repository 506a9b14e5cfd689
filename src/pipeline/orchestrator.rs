//! Cache-fronted resolution of sources with one acquisition per source at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::{debug, info, warn};

use super::cache::TtlCache;
use crate::error::{AcquisitionError, ConfigError, PipelineError};
use crate::models::Record;
use crate::scrapers::SourceAdapter;

type Acquisition = Shared<BoxFuture<'static, Result<Arc<Vec<Record>>, AcquisitionError>>>;

/// Outcome of resolving one source.
pub type Resolved = Result<Arc<Vec<Record>>, PipelineError>;

struct SourceSlot {
    adapter: Arc<dyn SourceAdapter>,
    /// Running acquisition tagged with its generation.
    inflight: Mutex<Option<(u64, Acquisition)>>,
    generation: AtomicU64,
}

impl SourceSlot {
    fn new(adapter: Arc<dyn SourceAdapter>) -> Self {
        Self {
            adapter,
            inflight: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<(u64, Acquisition)>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop the in-flight handle if it still belongs to `generation`.
    fn finish(&self, generation: u64) {
        let mut inflight = self.lock();
        if matches!(inflight.as_ref(), Some((g, _)) if *g == generation) {
            *inflight = None;
        }
    }
}

/// Resolves source ids to records through the cache and the adapters.
pub struct Pipeline {
    slots: HashMap<String, Arc<SourceSlot>>,
    order: Vec<String>,
    cache: Arc<TtlCache>,
}

impl Pipeline {
    pub fn new(cache: Arc<TtlCache>) -> Self {
        Self {
            slots: HashMap::new(),
            order: Vec::new(),
            cache,
        }
    }

    /// Build a pipeline over `adapters`, rejecting duplicate ids.
    pub fn with_adapters(
        cache: Arc<TtlCache>,
        adapters: impl IntoIterator<Item = Arc<dyn SourceAdapter>>,
    ) -> Result<Self, ConfigError> {
        let mut pipeline = Self::new(cache);
        for adapter in adapters {
            pipeline.register(adapter)?;
        }
        Ok(pipeline)
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Result<(), ConfigError> {
        let id = adapter.id().to_string();
        if self.slots.contains_key(&id) {
            return Err(ConfigError::DuplicateSource(id));
        }
        self.slots.insert(id.clone(), Arc::new(SourceSlot::new(adapter)));
        self.order.push(id);
        Ok(())
    }

    /// Registered source ids in registration order.
    pub fn source_ids(&self) -> &[String] {
        &self.order
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    /// Records for `source_id`, from cache when fresh, otherwise acquired.
    ///
    /// Concurrent callers for the same source share one acquisition and its
    /// outcome. Failures are returned to every waiter and never cached.
    pub async fn resolve(&self, source_id: &str) -> Resolved {
        let slot = self
            .slots
            .get(source_id)
            .ok_or_else(|| PipelineError::UnknownSource(source_id.to_string()))?;

        let acquisition = {
            let mut inflight = slot.lock();

            if let Some(records) = self.cache.get(source_id) {
                debug!("{}: cache hit ({} records)", source_id, records.len());
                return Ok(records);
            }

            match inflight.as_ref() {
                Some((_, running)) => {
                    debug!("{}: joining in-flight acquisition", source_id);
                    running.clone()
                }
                None => {
                    debug!("{}: cache miss", source_id);
                    let generation = slot.generation.fetch_add(1, Ordering::Relaxed);
                    let running = self.start(source_id, slot.clone(), generation);
                    *inflight = Some((generation, running.clone()));
                    running
                }
            }
        };

        acquisition
            .await
            .map_err(|error| PipelineError::Acquisition {
                source_id: source_id.to_string(),
                error,
            })
    }

    /// Resolve every registered source concurrently.
    ///
    /// Each source succeeds or fails on its own; results keep registration order.
    pub async fn resolve_all(&self) -> Vec<(String, Resolved)> {
        let pending = self.order.iter().map(|id| async move {
            let result = self.resolve(id).await;
            (id.clone(), result)
        });
        futures::future::join_all(pending).await
    }

    /// Spawn the acquisition so it completes even if every caller goes away.
    fn start(&self, source_id: &str, slot: Arc<SourceSlot>, generation: u64) -> Acquisition {
        let cache = self.cache.clone();
        let source_id = source_id.to_string();
        let task_slot = slot.clone();
        let task_id = source_id.clone();

        let handle = tokio::spawn(async move {
            info!("{}: acquiring", task_id);
            let start = Instant::now();

            let result = task_slot.adapter.fetch().await.map(Arc::new);
            match &result {
                Ok(records) => {
                    cache.set(&task_id, records.clone());
                    info!(
                        "{}: acquired {} records in {:?}",
                        task_id,
                        records.len(),
                        start.elapsed()
                    );
                }
                Err(e) => warn!("{}: acquisition failed: {}", task_id, e),
            }

            task_slot.finish(generation);
            result
        });

        async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("{}: acquisition task ended abnormally: {}", source_id, e);
                    Err(AcquisitionError::Aborted(e.to_string()))
                }
            };
            slot.finish(generation);
            result
        }
        .boxed()
        .shared()
    }
}
