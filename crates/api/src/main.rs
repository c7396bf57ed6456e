use std::sync::Arc;

use anyhow::Context;
use stockledger_api::app::{self, services};
use stockledger_infra::config::LedgerSettings;
use stockledger_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = LedgerSettings::load().context("failed to load settings")?;

    let format = settings.log.format.parse::<LogFormat>();
    stockledger_observability::init_with(&settings.log.filter, format.as_ref().copied().unwrap_or_default());
    if let Err(err) = format {
        tracing::warn!(error = %err, "falling back to json logs");
    }

    let store = services::open_store(&settings).await?;
    let bus: services::SharedBus = Arc::new(Default::default());
    let catalog = services::catalog_from(&settings)?;

    let app_services = services::AppServices::new(store.clone(), bus.clone(), catalog, &settings)?;
    let workers = services::BackgroundWorkers::start(store, bus, &settings)?;
    let app = app::build_app(Arc::new(app_services));

    let listener = tokio::net::TcpListener::bind(&settings.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.listen_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    workers.shutdown().await;
    Ok(())
}
