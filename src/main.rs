use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use emotion_lens::adapters::{
    gdrive::GoogleDriveWeights,
    http::{router, state::HttpState},
    onnx::{accelerators::OrtAccelerators, model_catalog::OnnxModelCatalog, yolo_engine::OnnxYoloEngine},
};
use emotion_lens::application::services::{ModelBootstrap, PredictionService};
use emotion_lens::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logs (RUST_LOG=info unless set)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = AppConfig::default();

    // 2. Weights + device. Any failure here stops the process before it serves.
    let bootstrap = ModelBootstrap::new(
        Arc::new(GoogleDriveWeights::new()?),
        Arc::new(OnnxModelCatalog::new()),
        Arc::new(OrtAccelerators::new()),
    );
    let weights = bootstrap
        .ensure_weights(&cfg.model)
        .await
        .context("preparing model weights")?;
    let device = bootstrap.select_device();

    // 3. Load once; the engine is shared by every request.
    let engine = tokio::task::spawn_blocking({
        let params = cfg.yolo.clone();
        move || OnnxYoloEngine::load(&weights, device, params)
    })
    .await
    .context("model loading task")??;

    let state = HttpState {
        prediction: Arc::new(PredictionService::new(Arc::new(engine))),
    };

    let app = router(state, &cfg.static_dir, cfg.body_limit, cfg.request_timeout);

    tracing::info!("Emotion detector listening on http://{}", cfg.addr);
    tracing::info!("Static files served from '{}'", cfg.static_dir.display());

    let listener = tokio::net::TcpListener::bind(cfg.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
