use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryHolderStore, TracingAuditLog};
use crate::routes::with_card_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use beid_intake::beid::{CardReconciler, Client, ReconcilerConfig};
use beid_intake::config::AppConfig;
use beid_intake::error::AppError;
use beid_intake::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryHolderStore::default());
    let reconciler_config = ReconcilerConfig::from(&config.beid);
    if reconciler_config.simulate {
        warn!("BEID_SIMULATE is set: card changes are reported but never saved");
    }
    let reconciler: Arc<CardReconciler<Client, _, _, _>> = Arc::new(CardReconciler::new(
        store.clone(),
        store,
        Arc::new(TracingAuditLog),
        reconciler_config,
    ));

    let app = with_card_routes(reconciler)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        media_root = %config.beid.media_root.display(),
        "eID intake service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
