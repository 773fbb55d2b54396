//! Headless CSV monitor
//!
//! Loads a CSV table, runs the update engine against it, and applies
//! each published batch in delivery order until ctrl-c.

use anyhow::Context;
use csv_monitor::engine::{ChannelPublisher, EngineConfig, UpdateEngine};
use csv_monitor::model::RowTable;
use csv_monitor::repository;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "csv_monitor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let csv_path = args
        .next()
        .context("usage: csv-monitor <table.csv> [config.json]")?;
    let config = match args.next() {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config {}", path))?;
            let config: EngineConfig = serde_json::from_str(&raw)?;
            config.validate()?;
            config
        }
        None => EngineConfig::default(),
    };

    let loaded = repository::load_csv(&csv_path)?;
    if loaded.has_errors() {
        tracing::warn!("{} records could not be read", loaded.error_count);
    }
    let table = Arc::new(RowTable::from_rows(loaded.rows));

    let engine = UpdateEngine::with_config(config)?;
    engine.attach(Arc::clone(&table));

    let (publisher, mut batches) = ChannelPublisher::new();
    engine.set_publisher(Arc::new(publisher));

    // Consumer: applies batches in delivery order, the way a UI event
    // loop would, re-checking edit locks at the moment of mutation.
    let apply_table = Arc::clone(&table);
    let consumer = tokio::spawn(async move {
        while let Some(batch) = batches.recv().await {
            let applied = apply_table.apply_batch(&batch);
            tracing::info!("Applied {}/{} updates", applied, batch.len());
        }
    });

    engine.start();
    tracing::info!("Monitoring {} rows, ctrl-c to stop", table.len());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    engine.shutdown().await;
    consumer.abort();

    Ok(())
}
