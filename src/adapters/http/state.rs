use std::sync::Arc;
use crate::application::services::PredictionService;

/// Shared state handed to the axum handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Decode + detect + summarize, backed by the model loaded at startup.
    pub prediction: Arc<PredictionService>,
}
