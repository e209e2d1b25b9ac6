pub mod detection;
pub mod device;
pub mod errors;
pub mod frame;
pub mod labels;
pub mod model;
pub mod prediction;
