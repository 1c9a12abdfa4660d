//! 면접 시그널링 서버

use anyhow::Context;
use interview_signaling_rs::backend::SupabaseBackend;
use interview_signaling_rs::config::Config;
use interview_signaling_rs::room::{CaptureServices, RoomRegistry};
use interview_signaling_rs::server;
use interview_signaling_rs::state::AppState;
use interview_signaling_rs::upload::UploadPipeline;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env());

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let shutdown = CancellationToken::new();
    let (services, uploads) = capture_services(&config, shutdown.clone())?;
    let registry = RoomRegistry::new(config.clone(), services);
    let state = Arc::new(AppState::new(
        config.clone(),
        registry.clone(),
        uploads,
        shutdown.clone(),
    ));

    let app = server::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Interview signaling server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry, shutdown))
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// 캡처가 꺼져 있거나 백엔드 설정이 없으면 시그널링만 한다
fn capture_services(
    config: &Config,
    shutdown: CancellationToken,
) -> anyhow::Result<(Option<Arc<CaptureServices>>, Option<UploadPipeline>)> {
    if !config.capture.enabled {
        tracing::info!("Capture disabled");
        return Ok((None, None));
    }
    if !config.backend.is_configured() {
        tracing::warn!("SUPABASE_URL / SUPABASE_SERVICE_KEY not set, capture disabled");
        return Ok((None, None));
    }

    let backend =
        Arc::new(SupabaseBackend::new(&config.backend).context("failed to build backend client")?);
    let uploads = UploadPipeline::spawn(backend.clone(), &config.upload, shutdown);
    let services = CaptureServices::new(backend, uploads.clone(), &config.capture);

    tracing::info!(
        interval_ms = config.capture.interval_ms,
        bucket = %config.backend.storage_bucket,
        "Capture enabled"
    );
    Ok((Some(Arc::new(services)), Some(uploads)))
}

/// Ctrl-C를 받으면 방을 모두 닫고(이미지 URL 기록까지) 웹소켓을 끊는다
async fn shutdown_signal(registry: RoomRegistry, shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");

    registry.shutdown().await;
    shutdown.cancel();
}
