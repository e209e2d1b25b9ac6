use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::model::{ModelSource, YoloParams};

pub const HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const PORT: u16 = 5000;

pub const WEIGHTS_PATH: &str = "models/best.onnx";
/// Drive id of the trained checkpoint. It currently points at the PyTorch
/// `best.pt` archive, which ONNX Runtime cannot load; replace it with the id of
/// the ONNX export (`yolo export format=onnx`) before a fresh deployment.
pub const WEIGHTS_FILE_ID: &str = "1Hyfo-AXQjZQ8tRunf8xHV-XWbaWP0UFJ";

pub const STATIC_DIR: &str = "static";
pub const BODY_LIMIT: usize = 32 * 1024 * 1024;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Process settings. Everything is fixed at build time; tests build their own.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub model: ModelSource,
    pub yolo: YoloParams,
    pub static_dir: PathBuf,
    pub body_limit: usize,
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(HOST, PORT),
            model: ModelSource {
                weights_path: PathBuf::from(WEIGHTS_PATH),
                remote_file_id: WEIGHTS_FILE_ID.to_string(),
            },
            yolo: YoloParams::default(),
            static_dir: PathBuf::from(STATIC_DIR),
            body_limit: BODY_LIMIT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}
