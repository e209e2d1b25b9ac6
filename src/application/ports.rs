use async_trait::async_trait;
use std::path::Path;

use crate::domain::{
    detection::RawDetection, device::AcceleratorReport, errors::DomainResult, frame::BgrFrame,
    model::ModelSource,
};

/// Runs the detector on one frame. Blocking; callers move it off the async
/// runtime.
pub trait DetectorPort: Send + Sync {
    fn detect(&self, frame: &BgrFrame) -> DomainResult<Vec<RawDetection>>;
}

#[async_trait]
pub trait WeightsSourcePort: Send + Sync {
    /// Downloads the file identified by `file_id` to `dest`, returning the
    /// number of bytes written. `dest` must only appear once complete.
    async fn fetch_to(&self, file_id: &str, dest: &Path) -> DomainResult<u64>;
}

#[async_trait]
pub trait ModelCatalogPort: Send + Sync {
    async fn validate_model(&self, model: &ModelSource) -> DomainResult<()>;
}

pub trait AcceleratorQueryPort: Send + Sync {
    fn query_accelerators(&self) -> Vec<AcceleratorReport>;
}
