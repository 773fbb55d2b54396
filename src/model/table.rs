//! Shared row collection and edit-lock arbitration

use crate::engine::publisher::UpdateBatch;
use crate::error::{AppError, Result};
use crate::model::row::{now_ms, Row};
use parking_lot::RwLock;

/// The shared, mutable row collection.
///
/// Handed around as `Arc<RowTable>`. The engine reads it under the read
/// lock when computing a tick and mutates it through [`apply_batch`], which
/// re-checks each row's edit lock at the instant of mutation. The
/// manual-edit path mutates it through [`commit_manual_edit`]. No lock is
/// held across a whole tick, only across a single read snapshot or a
/// single batch apply.
///
/// [`apply_batch`]: RowTable::apply_batch
/// [`commit_manual_edit`]: RowTable::commit_manual_edit
pub struct RowTable {
    rows: RwLock<Vec<Row>>,
}

impl RowTable {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Replace the collection wholesale, discarding the previous rows.
    /// Used on load/reload; legal while the engine is running.
    pub fn replace(&self, rows: Vec<Row>) {
        let count = rows.len();
        *self.rows.write() = rows;
        tracing::info!("Row table replaced with {} rows", count);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Clone of the current rows, for display or saving.
    pub fn snapshot(&self) -> Vec<Row> {
        self.rows.read().clone()
    }

    pub fn get(&self, id: i32) -> Option<Row> {
        self.rows.read().iter().find(|r| r.id == id).cloned()
    }

    /// Run `f` against the current rows without cloning them.
    pub fn with_rows<T>(&self, f: impl FnOnce(&[Row]) -> T) -> T {
        f(&self.rows.read())
    }

    /// Lock a row against engine updates for the standard edit-lock window.
    pub fn lock_for_edit(&self, id: i32) -> Result<()> {
        let mut rows = self.rows.write();
        let row = Self::find_mut(&mut rows, id)?;
        row.lock_for_edit();
        Ok(())
    }

    /// Clear a row's edit lock immediately.
    pub fn unlock(&self, id: i32) -> Result<()> {
        let mut rows = self.rows.write();
        let row = Self::find_mut(&mut rows, id)?;
        row.unlock();
        Ok(())
    }

    /// Clear every edit lock in the collection.
    pub fn unlock_all(&self) {
        let mut rows = self.rows.write();
        for row in rows.iter_mut() {
            row.unlock();
        }
        tracing::debug!("All {} rows unlocked", rows.len());
    }

    pub fn is_locked(&self, id: i32) -> bool {
        let now = now_ms();
        self.rows
            .read()
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.is_locked_at(now))
            .unwrap_or(false)
    }

    /// Commit a manual price edit: lock the row, then write the new price
    /// directly. This path is authoritative and is not gated by the
    /// engine's batch protocol; the lock keeps the engine from racing it.
    pub fn commit_manual_edit(&self, id: i32, new_price: f64) -> Result<()> {
        let mut rows = self.rows.write();
        let row = Self::find_mut(&mut rows, id)?;
        row.lock_for_edit();
        row.set_price(new_price);
        tracing::info!("Manual edit committed: row {} -> {:.2}", id, new_price);
        Ok(())
    }

    /// Apply a batch produced by the engine. Each update's lock is
    /// re-checked at the instant of mutation, and the row id must still
    /// match the recorded index (a wholesale `replace` may have raced the
    /// pending batch). Skipped updates are silent. Returns the number of
    /// rows actually mutated.
    pub fn apply_batch(&self, batch: &UpdateBatch) -> usize {
        let mut rows = self.rows.write();
        let now = now_ms();
        let mut applied = 0;

        for update in batch {
            let Some(row) = rows.get_mut(update.row_index) else {
                continue;
            };
            if row.id != update.row_id || row.is_locked_at(now) {
                continue;
            }
            row.set_price(update.new_price);
            applied += 1;
        }

        tracing::trace!("Applied {}/{} price updates", applied, batch.len());
        applied
    }

    fn find_mut(rows: &mut [Row], id: i32) -> Result<&mut Row> {
        rows.iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Row with id {} not found", id)))
    }
}

impl Default for RowTable {
    fn default() -> Self {
        Self::new()
    }
}
