//! CSV Monitor - real-time table update engine
//!
//! The headless core of a CSV monitoring tool: a shared row table with
//! time-boxed edit locks, a fixed-rate engine that perturbs a random
//! subset of prices each tick, and a publisher seam that delivers each
//! batch to whatever presentation layer consumes it.

pub mod engine;
pub mod error;
pub mod model;
pub mod repository;

pub use engine::{
    BatchPublisher, ChannelPublisher, EngineConfig, PriceUpdate, UpdateBatch, UpdateEngine,
};
pub use error::{AppError, Result};
pub use model::{Row, RowTable, LOCK_DURATION_MS};
