pub mod gdrive;
pub mod http;
pub mod onnx;
