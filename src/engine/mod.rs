//! Update engine: fixed-rate scheduling, batch selection, publishing

mod config;
pub mod publisher;
mod update_engine;

pub use config::{EngineConfig, PRICE_DECIMALS, PRICE_FLOOR};
pub use publisher::{BatchPublisher, ChannelPublisher, PriceUpdate, UpdateBatch};
pub use update_engine::{UpdateEngine, SHUTDOWN_GRACE};
