use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::application::ports::ModelCatalogPort;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::ModelSource;

/// PyTorch checkpoints (`.pt`) are zip archives.
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

pub struct OnnxModelCatalog;

impl OnnxModelCatalog {
    pub fn new() -> Self { Self }
}

impl Default for OnnxModelCatalog {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl ModelCatalogPort for OnnxModelCatalog {
    async fn validate_model(&self, model: &ModelSource) -> DomainResult<()> {
        let path = &model.weights_path;
        if path.as_os_str().is_empty() {
            return Err(DomainError::InvalidInput("weights path empty".into()));
        }
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| DomainError::NotFound(format!("model file not found: {}", path.display())))?;
        if !meta.is_file() {
            return Err(DomainError::InvalidInput(format!("not a file: {}", path.display())));
        }
        if meta.len() == 0 {
            return Err(DomainError::InvalidInput(format!(
                "model file is empty: {}",
                path.display()
            )));
        }

        let unreadable =
            |e: std::io::Error| DomainError::OperationFailed(format!("cannot read {}: {e}", path.display()));
        let mut file = tokio::fs::File::open(path).await.map_err(unreadable)?;
        let mut head = [0u8; 4];
        let read = file.read(&mut head).await.map_err(unreadable)?;
        if head[..read] == ZIP_MAGIC[..] {
            return Err(DomainError::InvalidInput(format!(
                "{} is a PyTorch checkpoint, not an ONNX model; export it with \
                 `yolo export model=best.pt format=onnx` and replace the file",
                path.display()
            )));
        }
        Ok(())
    }
}
