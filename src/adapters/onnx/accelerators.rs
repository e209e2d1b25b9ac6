use ort::execution_providers::{CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider};
use ort::session::Session;
use tracing::{debug, warn};

use crate::application::ports::AcceleratorQueryPort;
use crate::domain::device::{Accelerator, AcceleratorReport};

/// Asks ONNX Runtime which execution providers this build and machine can use.
///
/// `is_available` only says the runtime was compiled with a provider, so a
/// provider counts as available once it also registers on a scratch session
/// builder (this is where missing driver libraries show up).
pub struct OrtAccelerators;

impl OrtAccelerators {
    pub fn new() -> Self { Self }
}

impl Default for OrtAccelerators {
    fn default() -> Self { Self::new() }
}

fn report<E: ExecutionProvider>(accelerator: Accelerator, ep: &E) -> AcceleratorReport {
    assess(
        accelerator,
        || {
            let compiled_in = ep.is_available().map_err(|e| e.to_string())?;
            Ok(ep.supported_by_platform() && compiled_in)
        },
        || {
            let mut scratch = Session::builder().map_err(|e| e.to_string())?;
            ep.register(&mut scratch).map_err(|e| e.to_string())
        },
    )
}

/// Combines the compile-time check with a trial registration. `register` is
/// only attempted when the provider is built in.
pub fn assess<B, R>(accelerator: Accelerator, built: B, register: R) -> AcceleratorReport
where
    B: FnOnce() -> Result<bool, String>,
    R: FnOnce() -> Result<(), String>,
{
    let built = built().unwrap_or_else(|e| {
        warn!("Could not query {:?} support: {}", accelerator, e);
        false
    });

    let available = built
        && match register() {
            Ok(()) => true,
            Err(e) => {
                debug!("{:?} is built in but cannot be registered: {}", accelerator, e);
                false
            }
        };

    AcceleratorReport { accelerator, built, available }
}

impl AcceleratorQueryPort for OrtAccelerators {
    fn query_accelerators(&self) -> Vec<AcceleratorReport> {
        vec![
            report(Accelerator::Cuda, &CUDAExecutionProvider::default()),
            report(Accelerator::CoreMl, &CoreMLExecutionProvider::default()),
        ]
    }
}
