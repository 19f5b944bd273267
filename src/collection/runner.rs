//! Periodic collection loop.
//!
//! Every tick samples the device, builds a snapshot, and either publishes it
//! or writes it to the offline directory. Each tick carries the generation it
//! was scheduled under; `stop` and `start` bump the generation, so a tick
//! that outlives its run skips delivery and never updates the display.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::collection::display::{DeliveryOutcome, DisplayUpdate};
use crate::collection::schedule::{CollectionError, Schedule};
use crate::delivery::DeliveryConnection;
use crate::sampler::{NetworkCounters, Sampler};
use crate::snapshot::MetricsSnapshot;
use crate::storage::{RecordKind, StorageWriter};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Loop lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum LoopState {
    Idle,
    Running,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran to completion.
    Delivered(DeliveryOutcome),
    /// The previous tick was still running.
    Skipped,
    /// The loop was stopped or restarted before delivery.
    Cancelled,
}

struct SamplerState {
    sampler: Sampler,
    previous: NetworkCounters,
}

struct Inner {
    sampler: Mutex<SamplerState>,
    delivery: Arc<DeliveryConnection>,
    storage: StorageWriter,
    device_id: String,
    generation: AtomicU64,
    tick_guard: AsyncMutex<()>,
    display: watch::Sender<Option<DisplayUpdate>>,
}

/// Drives sampler → snapshot → delivery-or-fallback on a fixed interval.
pub struct CollectionLoop {
    inner: Arc<Inner>,
    schedule: Schedule,
    scheduler: AsyncMutex<Option<JobScheduler>>,
}

impl std::fmt::Debug for CollectionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionLoop")
            .field("device_id", &self.inner.device_id)
            .field("schedule", &self.schedule)
            .field("generation", &self.inner.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl CollectionLoop {
    pub fn new(
        sampler: Sampler,
        delivery: Arc<DeliveryConnection>,
        storage: StorageWriter,
        device_id: impl Into<String>,
        schedule: Schedule,
    ) -> Self {
        let (display, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                sampler: Mutex::new(SamplerState {
                    sampler,
                    previous: NetworkCounters::ZERO,
                }),
                delivery,
                storage,
                device_id: device_id.into(),
                generation: AtomicU64::new(0),
                tick_guard: AsyncMutex::new(()),
                display,
            }),
            schedule,
            scheduler: AsyncMutex::new(None),
        }
    }

    pub async fn state(&self) -> LoopState {
        if self.scheduler.lock().await.is_some() {
            LoopState::Running
        } else {
            LoopState::Idle
        }
    }

    /// Observe display updates. Holds `None` until the first tick completes.
    pub fn subscribe(&self) -> watch::Receiver<Option<DisplayUpdate>> {
        self.inner.display.subscribe()
    }

    /// Most recent display update.
    pub fn latest(&self) -> Option<DisplayUpdate> {
        self.inner.display.borrow().clone()
    }

    /// Start ticking. Connects first if no session exists, then runs one tick
    /// immediately. A no-op while already running.
    pub async fn start(&self) -> Result<(), CollectionError> {
        let mut slot = self.scheduler.lock().await;
        if slot.is_some() {
            tracing::debug!("Collection loop already running");
            return Ok(());
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if self.inner.delivery.status().can_connect() {
            if let Err(e) = self.inner.delivery.connect().await {
                self.inner.log_failure(format!("Broker connect failed: {e}"));
            }
        }

        let scheduler = match self.schedule_ticks(generation).await {
            Ok(scheduler) => scheduler,
            Err(e) => {
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
                self.inner
                    .log_failure(format!("Collection scheduler failed to start: {e}"));
                return Err(e);
            }
        };
        *slot = Some(scheduler);
        drop(slot);

        self.inner.log_event("Data collection started");
        tracing::info!(schedule = %self.schedule, generation, "Collection loop started");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.tick(generation).await;
        });
        Ok(())
    }

    /// Stop ticking. Ticks already in flight skip delivery from this point on.
    pub async fn stop(&self) -> Result<(), CollectionError> {
        self.stop_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Stop with custom scheduler shutdown timeout.
    pub async fn stop_with_timeout(&self, timeout: Duration) -> Result<(), CollectionError> {
        let Some(mut scheduler) = self.scheduler.lock().await.take() else {
            tracing::debug!("Collection loop not running");
            return Ok(());
        };
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let result = tokio::time::timeout(timeout, async {
            scheduler
                .shutdown()
                .await
                .map_err(|e| CollectionError::Scheduler(e.to_string()))
        })
        .await;

        match result {
            Ok(Ok(())) => tracing::info!("Collection loop stopped"),
            Ok(Err(e)) => {
                self.inner
                    .log_failure(format!("Collection scheduler shutdown failed: {e}"));
                return Err(e);
            }
            Err(_) => tracing::warn!("Collection scheduler shutdown timed out"),
        }
        self.inner.log_event("Data collection stopped");
        Ok(())
    }

    /// Run one tick under the current generation, outside the schedule.
    pub async fn tick_now(&self) -> TickOutcome {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner.tick(generation).await
    }

    async fn schedule_ticks(&self, generation: u64) -> Result<JobScheduler, CollectionError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| CollectionError::Scheduler(e.to_string()))?;

        let inner = Arc::clone(&self.inner);
        let job = Job::new_repeated_async(
            self.schedule.period(),
            move |_: uuid::Uuid, _: JobScheduler| {
                let inner = Arc::clone(&inner);
                Box::pin(async move {
                    inner.tick(generation).await;
                }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
            },
        )
        .map_err(|e| CollectionError::Scheduler(e.to_string()))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| CollectionError::Scheduler(e.to_string()))?;
        scheduler
            .start()
            .await
            .map_err(|e| CollectionError::Scheduler(e.to_string()))?;
        Ok(scheduler)
    }
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn tick(&self, generation: u64) -> TickOutcome {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            tracing::warn!(generation, "Previous tick still running, skipping");
            return TickOutcome::Skipped;
        };
        if !self.is_current(generation) {
            return TickOutcome::Cancelled;
        }

        let started = std::time::Instant::now();
        let fields = {
            let mut state = self
                .sampler
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let previous = state.previous;
            let (fields, next) = state.sampler.sample(previous);
            state.previous = next;
            fields
        };
        let snapshot = MetricsSnapshot::build(fields, self.device_id.as_str(), Utc::now());

        if !self.is_current(generation) {
            tracing::debug!(generation, "Loop stopped during sampling, dropping tick");
            return TickOutcome::Cancelled;
        }

        let outcome = match snapshot.serialize() {
            Ok(payload) => self.deliver(payload).await,
            Err(e) => {
                let message = format!("Error creating payload: {e}");
                self.log_failure(&message);
                DeliveryOutcome::Failed(message)
            }
        };

        tracing::debug!(
            generation,
            outcome = ?outcome,
            duration_ms = started.elapsed().as_millis() as u64,
            "Tick complete"
        );

        if self.is_current(generation) {
            let update = DisplayUpdate::new(snapshot, outcome.clone(), self.delivery.status());
            self.display.send_replace(Some(update));
        } else {
            tracing::debug!(generation, "Loop stopped during delivery, display not updated");
        }
        TickOutcome::Delivered(outcome)
    }

    async fn deliver(&self, payload: Vec<u8>) -> DeliveryOutcome {
        let status = self.delivery.status();
        if !status.is_connected() {
            tracing::debug!(status = %status, "Broker unavailable, saving locally");
            self.log_event(format!("Broker {status}, saving locally"));
            return self.save_locally(payload).await;
        }

        self.log_event(format!(
            "Preparing to send data: {}",
            String::from_utf8_lossy(&payload)
        ));
        match self.delivery.publish(payload.clone()).await {
            Ok(()) => {
                tracing::info!("Data sent to broker");
                self.log_event("Data sent to broker");
                DeliveryOutcome::Sent
            }
            Err(e) => {
                self.log_failure(format!("Failed to publish: {e}"));
                self.save_locally(payload).await
            }
        }
    }

    async fn save_locally(&self, payload: Vec<u8>) -> DeliveryOutcome {
        match self.storage.save(payload, RecordKind::Metrics).await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Data saved locally");
                DeliveryOutcome::SavedLocally(path)
            }
            Err(e) => {
                let message = format!("Error saving locally: {e}");
                self.log_failure(&message);
                DeliveryOutcome::Failed(message)
            }
        }
    }

    fn log_event(&self, message: impl Into<String>) {
        if let Err(e) = self.storage.append_log(message) {
            tracing::warn!(error = %e, "Failed to enqueue log line");
        }
    }

    fn log_failure(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!("{message}");
        self.log_event(message);
    }
}
