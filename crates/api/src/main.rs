use std::sync::Arc;

use anyhow::Context;

use qrportal_infra::PortalConfig;
use qrportal_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    qrportal_observability::init(LogFormat::for_environment(PortalConfig::production_from_env()));

    let config = PortalConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr;
    let services = qrportal_api::app::build_services(config)
        .await
        .context("failed to start services")?;
    let app = qrportal_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
