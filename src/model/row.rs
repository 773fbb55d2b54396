//! Row model with edit-lock support

use chrono::Local;
use serde::{Deserialize, Serialize};

/// How long a manually edited row is protected from engine updates.
pub const LOCK_DURATION_MS: i64 = 5000;

/// Direction of the last price move, for up/down styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceDirection {
    Up,
    Down,
    Unchanged,
}

/// A single row of the monitored table.
///
/// Mutated in place by both the update engine (through
/// [`RowTable::apply_batch`](crate::model::RowTable::apply_batch)) and the
/// manual-edit path. `previous_price` always holds the value the row had
/// immediately before the latest mutation, so the presentation layer can
/// derive an up/down direction without keeping its own history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub id: i32,
    pub symbol: String,
    pub price: f64,
    pub previous_price: f64,
    pub qty: i64,
    pub status: String,
    pub last_update: String,
    /// Epoch millis until which the engine must not touch this row. 0 = unlocked.
    pub lock_until_ms: i64,
    /// Epoch millis of the last actual price change (flash highlighting).
    pub last_price_change_ms: i64,
}

/// Current wall clock in epoch milliseconds.
pub fn now_ms() -> i64 {
    Local::now().timestamp_millis()
}

/// Current wall clock formatted for the `lastUpdate` column.
pub fn now_display() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

impl Row {
    pub fn new(
        id: i32,
        symbol: impl Into<String>,
        price: f64,
        qty: i64,
        status: impl Into<String>,
        last_update: impl Into<String>,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            price,
            previous_price: price,
            qty,
            status: status.into(),
            last_update: last_update.into(),
            lock_until_ms: 0,
            last_price_change_ms: 0,
        }
    }

    /// Set a new price, rolling the old one into `previous_price` and
    /// refreshing the display timestamp.
    pub fn set_price(&mut self, value: f64) {
        self.previous_price = self.price;
        self.price = value;
        if self.price != self.previous_price {
            self.last_price_change_ms = now_ms();
        }
        self.last_update = now_display();
    }

    pub fn price_direction(&self) -> PriceDirection {
        if self.price > self.previous_price {
            PriceDirection::Up
        } else if self.price < self.previous_price {
            PriceDirection::Down
        } else {
            PriceDirection::Unchanged
        }
    }

    /// Lock this row from engine updates for [`LOCK_DURATION_MS`],
    /// measured from `now_ms`.
    pub fn lock_for_edit_at(&mut self, now_ms: i64) {
        self.lock_until_ms = now_ms + LOCK_DURATION_MS;
    }

    /// Lock this row from engine updates, starting now.
    pub fn lock_for_edit(&mut self) {
        self.lock_for_edit_at(now_ms());
    }

    /// Unlock immediately, regardless of remaining lock time.
    pub fn unlock(&mut self) {
        self.lock_until_ms = 0;
    }

    /// Pure lock check against an explicit clock reading.
    pub fn is_locked_at(&self, now_ms: i64) -> bool {
        now_ms < self.lock_until_ms
    }

    /// Lock check against the wall clock.
    pub fn is_locked(&self) -> bool {
        self.is_locked_at(now_ms())
    }
}
