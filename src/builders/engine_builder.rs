//! Builders to construct booking engines from configuration.

use std::sync::Arc;

use anyhow::anyhow;

use crate::config::{BookingConfig, StoreBackendConfig};
use crate::core::{AppResult, BookingEngine, BookingStore};
use crate::infra::notifier::BroadcastEventSink;
use crate::infra::store::{ConfiguredStore, InMemoryStore};

/// Build an engine from configuration using the provided store factory.
///
/// Policies and retry settings come from `cfg`; clock and event sink are
/// left at their defaults for the caller to override.
pub fn build_engine<S, F>(cfg: &BookingConfig, store_factory: F) -> AppResult<BookingEngine<S>>
where
    S: BookingStore,
    F: FnOnce(&StoreBackendConfig) -> AppResult<S>,
{
    cfg.validate()
        .map_err(|e| anyhow!("config invalid: {e}"))?;

    let store = store_factory(&cfg.store)?;
    Ok(BookingEngine::new(
        store,
        Arc::new(cfg.cancellation_policy()),
        cfg.waitlist_expiry(),
    )
    .with_retry_policy(cfg.retry_policy()))
}

/// Open the store backend named by `cfg`.
pub async fn connect_store(cfg: &StoreBackendConfig) -> AppResult<ConfiguredStore> {
    match cfg {
        StoreBackendConfig::InMemory => Ok(ConfiguredStore::InMemory(InMemoryStore::new())),
        #[cfg(feature = "postgres")]
        StoreBackendConfig::Postgres {
            url,
            max_connections,
        } => {
            use anyhow::Context as _;

            let store = crate::infra::store::PgBookingStore::connect(url, *max_connections)
                .await
                .context("connecting booking store")?;
            store.migrate().await.context("migrating booking schema")?;
            Ok(ConfiguredStore::Postgres(store))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackendConfig::Postgres { .. } => {
            anyhow::bail!("postgres store requested but the `postgres` feature is disabled")
        }
    }
}

/// Connect the configured store and assemble an engine publishing to a
/// broadcast sink. Returns the sink so the relay can subscribe to it.
pub async fn build_from_config(
    cfg: &BookingConfig,
) -> AppResult<(BookingEngine<ConfiguredStore>, BroadcastEventSink)> {
    cfg.validate()
        .map_err(|e| anyhow!("config invalid: {e}"))?;
    let store = connect_store(&cfg.store).await?;
    tracing::info!(backend = store.backend(), "booking store ready");

    let sink = BroadcastEventSink::new(cfg.event_buffer);
    let engine = build_engine(cfg, move |_| Ok(store))?.with_event_sink(Arc::new(sink.clone()));
    Ok((engine, sink))
}
