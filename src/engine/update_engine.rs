//! Periodic batch-update engine
//!
//! Drives bounded, lock-aware mutation of a shared [`RowTable`]:
//! - runs on a background tokio task at a fixed rate,
//! - picks a random subset of rows each tick and perturbs their prices,
//! - skips rows under an edit lock,
//! - hands each non-empty batch to a [`BatchPublisher`]; the consumer
//!   applies it (re-checking locks) on its own execution context.

use crate::engine::config::{EngineConfig, PRICE_DECIMALS, PRICE_FLOOR};
use crate::engine::publisher::{BatchPublisher, PriceUpdate, UpdateBatch};
use crate::error::Result;
use crate::model::{now_ms, Row, RowTable};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// How long `shutdown` waits for the tick task before aborting it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

struct TickTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct EngineInner {
    config: RwLock<EngineConfig>,
    table: RwLock<Option<Arc<RowTable>>>,
    publisher: RwLock<Option<Arc<dyn BatchPublisher>>>,
    running: AtomicBool,
    shut_down: AtomicBool,
    task: Mutex<Option<TickTask>>,
}

/// Engine for real-time price updates.
pub struct UpdateEngine {
    inner: Arc<EngineInner>,
}

impl UpdateEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config: RwLock::new(EngineConfig::default()),
                table: RwLock::new(None),
                publisher: RwLock::new(None),
                running: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let engine = Self::new();
        *engine.inner.config.write() = config;
        Ok(engine)
    }

    /// Replace the engine parameters. Fails fast on invalid bounds; the
    /// tick period takes effect on the next `start`, the batch-size and
    /// change-magnitude parameters on the next tick.
    pub fn configure(&self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        *self.inner.config.write() = config;
        Ok(())
    }

    pub fn config(&self) -> EngineConfig {
        self.inner.config.read().clone()
    }

    /// Register the collection to update. May be called at any time,
    /// including while running; the next tick observes the new table.
    pub fn attach(&self, table: Arc<RowTable>) {
        info!("Update engine data source set with {} rows", table.len());
        *self.inner.table.write() = Some(table);
    }

    /// Register the publisher that receives each tick's batch. May be
    /// replaced at any time.
    pub fn set_publisher(&self, publisher: Arc<dyn BatchPublisher>) {
        *self.inner.publisher.write() = Some(publisher);
    }

    /// Begin periodic ticking. No-op if already running, shut down, or
    /// no non-empty table is attached (data may arrive moments later).
    pub fn start(&self) {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            warn!("Cannot start update engine: already shut down");
            return;
        }

        let has_data = self
            .inner
            .table
            .read()
            .as_ref()
            .map(|t| !t.is_empty())
            .unwrap_or(false);
        if !has_data {
            warn!("Cannot start update engine: no data available");
            return;
        }

        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Update engine already running");
            return;
        }

        let period = self.inner.config.read().interval();
        info!("Starting update engine with {:?} interval", period);

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first interval tick completes immediately; consume it so
            // the first real tick fires one full period after start.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = inner.run_tick() {
                            warn!("Tick skipped: {}", e);
                        }
                    }
                }
            }
            debug!("Tick task exited");
        });

        *self.inner.task.lock() = Some(TickTask {
            stop: stop_tx,
            handle,
        });
    }

    /// Stop future ticks. A tick already computing completes normally.
    /// No-op if not running.
    pub fn pause(&self) {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        if let Some(task) = self.inner.task.lock().take() {
            // Signal the task to exit at its next loop turn; a tick in
            // flight is never preempted.
            let _ = task.stop.send(true);
        }
        info!("Update engine paused");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Pause and release the tick task permanently. Idempotent; waits up
    /// to [`SHUTDOWN_GRACE`] for the task to finish, then aborts it. The
    /// engine cannot be restarted afterwards.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Update engine already shut down");
            return;
        }
        self.inner.running.store(false, Ordering::SeqCst);

        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            let _ = task.stop.send(true);
            let abort = task.handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, task.handle)
                .await
                .is_err()
            {
                warn!("Tick task did not stop within {:?}, aborting", SHUTDOWN_GRACE);
                abort.abort();
            }
        }
        info!("Update engine shutdown complete");
    }
}

impl Default for UpdateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineInner {
    /// One tick: snapshot the table, compute a candidate batch, hand it
    /// to the publisher. Errors here are logged by the tick loop and
    /// never stop the schedule.
    fn run_tick(&self) -> Result<()> {
        let Some(table) = self.table.read().clone() else {
            return Ok(());
        };
        let config = self.config.read().clone();

        let mut rng = rand::thread_rng();
        let batch = table.with_rows(|rows| select_updates(&mut rng, &config, rows));
        if batch.is_empty() {
            return Ok(());
        }

        let publisher = self.publisher.read().clone();
        match publisher {
            Some(publisher) => {
                trace!("Publishing batch of {} updates", batch.len());
                publisher.publish(batch)
            }
            None => {
                trace!("No publisher registered, dropping batch of {}", batch.len());
                Ok(())
            }
        }
    }
}

/// Compute one tick's candidate updates against a point-in-time view of
/// the rows. Indices are drawn with replacement, so duplicates are
/// possible; rows locked at this instant are skipped (the apply path
/// re-checks the lock again at mutation time).
pub(crate) fn select_updates(
    rng: &mut impl Rng,
    config: &EngineConfig,
    rows: &[Row],
) -> UpdateBatch {
    let n = rows.len();
    if n == 0 {
        return Vec::new();
    }

    let attempts = choose_batch_size(rng, config, n);
    let now = now_ms();
    let mut updates = Vec::with_capacity(attempts);

    for _ in 0..attempts {
        let index = rng.gen_range(0..n);
        let row = &rows[index];
        if row.is_locked_at(now) {
            continue;
        }
        updates.push(PriceUpdate {
            row_id: row.id,
            row_index: index,
            new_price: perturb_price(rng, row.price, config.max_fractional_change),
        });
    }

    updates
}

/// Batch size drawn uniformly from the configured range, clamped to the
/// collection size.
pub(crate) fn choose_batch_size(rng: &mut impl Rng, config: &EngineConfig, n: usize) -> usize {
    rng.gen_range(config.min_rows_per_tick..=config.max_rows_per_tick)
        .min(n)
}

/// New price: current perturbed by up to `max_fractional_change` in
/// either direction, floored at [`PRICE_FLOOR`], rounded to
/// [`PRICE_DECIMALS`] decimals.
pub(crate) fn perturb_price(rng: &mut impl Rng, current: f64, max_fractional_change: f64) -> f64 {
    let delta = current * max_fractional_change * rng.gen_range(-1.0..=1.0);
    round_price((current + delta).max(PRICE_FLOOR))
}

fn round_price(price: f64) -> f64 {
    let scale = 10f64.powi(PRICE_DECIMALS as i32);
    (price * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::publisher::ChannelPublisher;
    use crate::error::AppError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::AtomicUsize;

    fn rows(count: i32) -> Vec<Row> {
        (0..count)
            .map(|i| Row::new(i, format!("SYM{}", i), 100.0, 10, "NORMAL", ""))
            .collect()
    }

    fn table(count: i32) -> Arc<RowTable> {
        Arc::new(RowTable::from_rows(rows(count)))
    }

    fn config(min: usize, max: usize, change: f64) -> EngineConfig {
        EngineConfig::new(10, min, max, change).unwrap()
    }

    #[test]
    fn test_batch_size_clamps_to_collection() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = config(5, 5, 0.2);
        let rows = rows(3);

        for _ in 0..50 {
            let batch = select_updates(&mut rng, &config, &rows);
            assert!(batch.len() <= 3);
            // No locks, so every attempt produces an update.
            assert_eq!(batch.len(), 3);
        }
    }

    #[test]
    fn test_attempts_within_configured_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        let config = config(2, 8, 0.2);
        let rows = rows(100);

        for _ in 0..200 {
            let batch = select_updates(&mut rng, &config, &rows);
            assert!(batch.len() >= 2 && batch.len() <= 8);
        }
    }

    #[test]
    fn test_zero_change_keeps_price_but_still_updates() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = config(10, 10, 0.0);
        let rows = rows(10);

        let batch = select_updates(&mut rng, &config, &rows);
        assert!(!batch.is_empty());
        for update in &batch {
            assert_eq!(update.new_price, 100.0);
        }

        // A zero-delta update is still a mutation for bookkeeping.
        let table = RowTable::from_rows(rows);
        assert!(table.apply_batch(&batch) > 0);
        let row = table.get(batch[0].row_id).unwrap();
        assert_eq!(row.previous_price, 100.0);
        assert_eq!(row.price, 100.0);
    }

    #[test]
    fn test_locked_rows_are_skipped() {
        let mut rng = StdRng::seed_from_u64(5);
        let config = config(50, 50, 0.2);
        let mut rows = rows(10);
        rows[4].lock_for_edit();

        for _ in 0..20 {
            let batch = select_updates(&mut rng, &config, &rows);
            assert!(batch.iter().all(|u| u.row_id != 4));
        }
    }

    #[test]
    fn test_all_locked_produces_empty_batch() {
        let mut rng = StdRng::seed_from_u64(9);
        let config = config(5, 10, 0.2);
        let mut rows = rows(5);
        for row in rows.iter_mut() {
            row.lock_for_edit();
        }

        assert!(select_updates(&mut rng, &config, &rows).is_empty());
    }

    #[test]
    fn test_price_floor_holds_under_large_swings() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..10_000 {
            let price = perturb_price(&mut rng, 0.01, 10.0);
            assert!(price >= PRICE_FLOOR);
        }
    }

    #[test]
    fn test_prices_rounded_to_two_decimals() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..1_000 {
            let price = perturb_price(&mut rng, 123.456789, 0.3);
            let scaled = price * 100.0;
            assert!((scaled - scaled.round()).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_start_without_data_is_noop() {
        let engine = UpdateEngine::new();
        engine.start();
        assert!(!engine.is_running());

        engine.attach(Arc::new(RowTable::new()));
        engine.start();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_start_and_pause_are_idempotent() {
        let engine = UpdateEngine::new();
        engine.attach(table(10));

        engine.start();
        engine.start();
        assert!(engine.is_running());

        engine.pause();
        engine.pause();
        assert!(!engine.is_running());

        // Pausing is not terminal.
        engine.start();
        assert!(engine.is_running());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_terminal_and_idempotent() {
        let engine = UpdateEngine::new();
        engine.attach(table(10));
        engine.start();

        engine.shutdown().await;
        engine.shutdown().await;
        assert!(!engine.is_running());

        engine.start();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_ticks_deliver_batches_and_apply() {
        let table = table(10);
        let engine =
            UpdateEngine::with_config(EngineConfig::new(10, 4, 4, 0.2).unwrap()).unwrap();
        engine.attach(Arc::clone(&table));

        let (publisher, mut rx) = ChannelPublisher::new();
        engine.set_publisher(Arc::new(publisher));
        engine.start();

        for _ in 0..3 {
            let batch = rx.recv().await.expect("engine should publish batches");
            // With replacement and no locks, attempts == batch length.
            assert_eq!(batch.len(), 4);
            table.apply_batch(&batch);
        }
        engine.shutdown().await;

        for row in table.snapshot() {
            assert!(row.price >= PRICE_FLOOR);
        }
    }

    #[tokio::test]
    async fn test_publisher_errors_do_not_stop_engine() {
        let engine =
            UpdateEngine::with_config(EngineConfig::new(5, 1, 5, 0.2).unwrap()).unwrap();
        engine.attach(table(10));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        engine.set_publisher(Arc::new(move |_batch: UpdateBatch| -> Result<()> {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Publish("consumer rejected batch".into()))
        }));

        engine.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(engine.is_running());
        assert!(calls.load(Ordering::SeqCst) >= 2);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_locked_row_untouched_until_unlock() {
        let table = table(3);
        table.lock_for_edit(1).unwrap();

        let engine =
            UpdateEngine::with_config(EngineConfig::new(5, 3, 3, 0.5).unwrap()).unwrap();
        engine.attach(Arc::clone(&table));

        let apply_table = Arc::clone(&table);
        engine.set_publisher(Arc::new(move |batch: UpdateBatch| -> Result<()> {
            apply_table.apply_batch(&batch);
            Ok(())
        }));

        engine.start();
        tokio::time::sleep(Duration::from_millis(80)).await;
        engine.shutdown().await;

        let locked = table.get(1).unwrap();
        assert_eq!(locked.price, 100.0);
        assert_eq!(locked.previous_price, 100.0);
    }

    #[tokio::test]
    async fn test_attach_replaces_collection_while_running() {
        let engine =
            UpdateEngine::with_config(EngineConfig::new(5, 2, 2, 0.2).unwrap()).unwrap();
        engine.attach(table(5));

        let (publisher, mut rx) = ChannelPublisher::new();
        engine.set_publisher(Arc::new(publisher));
        engine.start();

        let replacement = Arc::new(RowTable::from_rows(
            (100..105)
                .map(|i| Row::new(i, "NEW", 50.0, 1, "NORMAL", ""))
                .collect(),
        ));
        engine.attach(Arc::clone(&replacement));

        // Drain until a batch computed against the new table shows up.
        let mut saw_new = false;
        for _ in 0..20 {
            let batch = rx.recv().await.expect("engine should keep publishing");
            if batch.iter().all(|u| u.row_id >= 100) {
                saw_new = true;
                break;
            }
        }
        assert!(saw_new);
        engine.shutdown().await;
    }
}
