//! Batch delivery seam between the engine and a presentation layer

use crate::error::{AppError, Result};
use serde::Serialize;
use tokio::sync::mpsc;

/// One pending price update produced by a tick.
///
/// Carries both the index the row was drawn at and its id so the apply
/// path can detect that the collection was replaced while the batch was
/// in flight.
#[derive(Debug, Clone, Serialize)]
pub struct PriceUpdate {
    pub row_id: i32,
    pub row_index: usize,
    pub new_price: f64,
}

/// The set of updates one tick produced, delivered together.
pub type UpdateBatch = Vec<PriceUpdate>;

/// Receives each non-empty batch the engine produces.
///
/// `publish` runs on the engine's tick task and must enqueue rather than
/// block; applying the batch (with its lock re-check) happens on the
/// consumer's own execution context. Errors are soft: the engine logs
/// them and keeps ticking.
pub trait BatchPublisher: Send + Sync {
    fn publish(&self, batch: UpdateBatch) -> Result<()>;
}

impl<F> BatchPublisher for F
where
    F: Fn(UpdateBatch) -> Result<()> + Send + Sync,
{
    fn publish(&self, batch: UpdateBatch) -> Result<()> {
        self(batch)
    }
}

/// Publisher backed by an unbounded channel. Batches arrive at the
/// receiver in production order, and a slow consumer never blocks the
/// engine's tick task.
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<UpdateBatch>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UpdateBatch>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl BatchPublisher for ChannelPublisher {
    fn publish(&self, batch: UpdateBatch) -> Result<()> {
        self.sender
            .send(batch)
            .map_err(|_| AppError::Publish("batch consumer has gone away".into()))
    }
}
