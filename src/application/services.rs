use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::{
    application::ports::{AcceleratorQueryPort, DetectorPort, ModelCatalogPort, WeightsSourcePort},
    domain::{
        device::{select_device, DeviceKind},
        errors::{DomainError, DomainResult},
        frame::BgrFrame,
        model::ModelSource,
        prediction::{summarize_detections, PredictionSummary, CONFIDENCE_THRESHOLD},
    },
};

/// Startup sequence: make sure the weights are on disk and decide where the
/// model will run. Every error returned here is meant to abort the process.
#[derive(Clone)]
pub struct ModelBootstrap {
    source: Arc<dyn WeightsSourcePort>,
    catalog: Arc<dyn ModelCatalogPort>,
    accelerators: Arc<dyn AcceleratorQueryPort>,
}

impl ModelBootstrap {
    pub fn new(
        source: Arc<dyn WeightsSourcePort>,
        catalog: Arc<dyn ModelCatalogPort>,
        accelerators: Arc<dyn AcceleratorQueryPort>,
    ) -> Self {
        Self { source, catalog, accelerators }
    }

    /// Returns the local weights path, downloading the file first when it is
    /// not there yet. An existing file is reused as-is.
    pub async fn ensure_weights(&self, model: &ModelSource) -> DomainResult<PathBuf> {
        let path = &model.weights_path;
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| DomainError::OperationFailed(format!("cannot stat {}: {e}", path.display())))?;

        if exists {
            info!("Model already exists at {}", path.display());
        } else {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    DomainError::OperationFailed(format!("cannot create {}: {e}", dir.display()))
                })?;
            }
            info!("Downloading weights {} to {}...", model.remote_file_id, path.display());
            let written = self.source.fetch_to(&model.remote_file_id, path).await?;
            info!("Download complete: {} bytes saved to {}", written, path.display());
        }

        self.catalog.validate_model(model).await?;
        Ok(path.clone())
    }

    pub fn select_device(&self) -> DeviceKind {
        let reports = self.accelerators.query_accelerators();
        for r in &reports {
            debug!(
                "Accelerator {:?}: built={} available={}",
                r.accelerator, r.built, r.available
            );
        }
        let device = select_device(&reports);
        info!("Using {} for inference", device);
        device
    }
}

/// Image bytes in, filtered and labelled detections out.
#[derive(Clone)]
pub struct PredictionService {
    detector: Arc<dyn DetectorPort>,
    threshold: f32,
}

impl PredictionService {
    pub fn new(detector: Arc<dyn DetectorPort>) -> Self {
        Self {
            detector,
            threshold: CONFIDENCE_THRESHOLD,
        }
    }

    /// Decoding and inference are CPU bound, so both run on the blocking pool.
    pub async fn predict(&self, image_bytes: Vec<u8>) -> DomainResult<PredictionSummary> {
        let detector = self.detector.clone();
        let threshold = self.threshold;

        tokio::task::spawn_blocking(move || run_prediction(detector.as_ref(), &image_bytes, threshold))
            .await
            .map_err(|e| DomainError::Inference(format!("prediction task aborted: {e}")))?
    }
}

/// Decodes any format `image` understands into a BGR frame. Alpha is
/// dropped, not composited.
pub fn decode_frame(bytes: &[u8]) -> DomainResult<BgrFrame> {
    let rgb = image::load_from_memory(bytes)
        .map_err(|e| DomainError::Decode(e.to_string()))?
        .to_rgb8();
    BgrFrame::from_rgb_image(rgb)
}

fn run_prediction(
    detector: &dyn DetectorPort,
    image_bytes: &[u8],
    threshold: f32,
) -> DomainResult<PredictionSummary> {
    let frame = decode_frame(image_bytes)?;

    let started = Instant::now();
    let candidates = detector.detect(&frame)?;
    let infer_ms = started.elapsed().as_secs_f32() * 1000.0;

    let summary = PredictionSummary::from_candidates(&candidates, threshold)?;
    debug!(
        "{}x{} frame: {} candidates, kept [{}] in {:.1} ms, top {} ({:.2})",
        frame.width(),
        frame.height(),
        candidates.len(),
        summarize_detections(&summary.detections),
        infer_ms,
        summary.top_emotion,
        summary.top_conf
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::RawDetection;
    use crate::domain::device::{Accelerator, AcceleratorReport};
    use async_trait::async_trait;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedDetector {
        candidates: Vec<RawDetection>,
        seen: Mutex<Option<(u32, u32, [u8; 3])>>,
    }

    impl FixedDetector {
        fn new(candidates: Vec<RawDetection>) -> Self {
            Self { candidates, seen: Mutex::new(None) }
        }
    }

    impl DetectorPort for FixedDetector {
        fn detect(&self, frame: &BgrFrame) -> DomainResult<Vec<RawDetection>> {
            let px = frame.pixels();
            *self.seen.lock().unwrap() =
                Some((frame.width(), frame.height(), [px[[0, 0, 0]], px[[0, 0, 1]], px[[0, 0, 2]]]));
            Ok(self.candidates.clone())
        }
    }

    struct FakeSource {
        payload: Vec<u8>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WeightsSourcePort for FakeSource {
        async fn fetch_to(&self, _file_id: &str, dest: &Path) -> DomainResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(dest, &self.payload)
                .await
                .map_err(|e| DomainError::OperationFailed(e.to_string()))?;
            Ok(self.payload.len() as u64)
        }
    }

    struct FailingSource;

    #[async_trait]
    impl WeightsSourcePort for FailingSource {
        async fn fetch_to(&self, _file_id: &str, _dest: &Path) -> DomainResult<u64> {
            Err(DomainError::OperationFailed("network unreachable".into()))
        }
    }

    struct ExistsCatalog;

    #[async_trait]
    impl ModelCatalogPort for ExistsCatalog {
        async fn validate_model(&self, model: &ModelSource) -> DomainResult<()> {
            if model.weights_path.exists() {
                Ok(())
            } else {
                Err(DomainError::NotFound(model.weights_path.display().to_string()))
            }
        }
    }

    struct StaticAccelerators(Vec<AcceleratorReport>);

    impl AcceleratorQueryPort for StaticAccelerators {
        fn query_accelerators(&self) -> Vec<AcceleratorReport> {
            self.0.clone()
        }
    }

    fn bootstrap(source: Arc<dyn WeightsSourcePort>, reports: Vec<AcceleratorReport>) -> ModelBootstrap {
        ModelBootstrap::new(source, Arc::new(ExistsCatalog), Arc::new(StaticAccelerators(reports)))
    }

    fn png_bytes(image: RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn missing_weights_are_fetched_into_a_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelSource {
            weights_path: dir.path().join("models").join("best.onnx"),
            remote_file_id: "abc".into(),
        };
        let source = Arc::new(FakeSource { payload: vec![1, 2, 3], calls: AtomicUsize::new(0) });

        let path = bootstrap(source.clone(), vec![]).ensure_weights(&model).await.unwrap();

        assert_eq!(path, model.weights_path);
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn existing_weights_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let weights_path = dir.path().join("best.onnx");
        std::fs::write(&weights_path, b"cached").unwrap();
        let model = ModelSource { weights_path, remote_file_id: "abc".into() };
        let source = Arc::new(FakeSource { payload: vec![9], calls: AtomicUsize::new(0) });

        bootstrap(source.clone(), vec![]).ensure_weights(&model).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(&model.weights_path).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn fetch_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelSource {
            weights_path: dir.path().join("best.onnx"),
            remote_file_id: "abc".into(),
        };

        let err = bootstrap(Arc::new(FailingSource), vec![])
            .ensure_weights(&model)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::OperationFailed(_)));
        assert!(!model.weights_path.exists());
    }

    #[test]
    fn select_device_uses_accelerator_reports() {
        let source = Arc::new(FakeSource { payload: vec![], calls: AtomicUsize::new(0) });
        let reports = vec![AcceleratorReport {
            accelerator: Accelerator::CoreMl,
            built: true,
            available: true,
        }];
        assert_eq!(bootstrap(source.clone(), reports).select_device(), DeviceKind::CoreMl);
        assert_eq!(bootstrap(source, vec![]).select_device(), DeviceKind::Cpu);
    }

    #[tokio::test]
    async fn detector_receives_bgr_frame() {
        let mut image = RgbImage::new(4, 3);
        image.put_pixel(0, 0, image::Rgb([200, 100, 50]));
        let detector = Arc::new(FixedDetector::new(vec![]));
        let service = PredictionService::new(detector.clone());

        service.predict(png_bytes(image)).await.unwrap();

        assert_eq!(*detector.seen.lock().unwrap(), Some((4, 3, [50, 100, 200])));
    }

    #[tokio::test]
    async fn blank_image_yields_natural() {
        let service = PredictionService::new(Arc::new(FixedDetector::new(vec![])));
        let summary = service.predict(png_bytes(RgbImage::new(64, 48))).await.unwrap();
        assert_eq!(summary, PredictionSummary::empty());
    }

    #[tokio::test]
    async fn low_confidence_candidates_are_dropped() {
        let candidates = vec![
            RawDetection { x1: 1.0, y1: 1.0, x2: 9.0, y2: 9.0, class_id: 4, score: 0.1 },
            RawDetection { x1: 2.0, y1: 2.0, x2: 8.0, y2: 8.0, class_id: 0, score: 0.6 },
        ];
        let service = PredictionService::new(Arc::new(FixedDetector::new(candidates)));
        let summary = service.predict(png_bytes(RgbImage::new(16, 16))).await.unwrap();

        assert_eq!(summary.detections.len(), 1);
        assert_eq!(summary.top_emotion, "angry");
        assert_eq!(summary.top_conf, 0.6);
    }

    #[tokio::test]
    async fn undecodable_bytes_are_a_decode_error() {
        let service = PredictionService::new(Arc::new(FixedDetector::new(vec![])));
        let err = service.predict(b"definitely not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, DomainError::Decode(_)));
    }
}
