use serde::{Deserialize, Serialize};
use std::fmt;

/// Compute target the detector session is bound to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceKind {
    Cuda,
    CoreMl,
    Cpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Cuda => "cuda",
            DeviceKind::CoreMl => "coreml",
            DeviceKind::Cpu => "cpu",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Accelerator {
    Cuda,
    CoreMl,
}

impl Accelerator {
    /// Most preferred first.
    pub const PREFERENCE: [Accelerator; 2] = [Accelerator::Cuda, Accelerator::CoreMl];

    pub fn device(self) -> DeviceKind {
        match self {
            Accelerator::Cuda => DeviceKind::Cuda,
            Accelerator::CoreMl => DeviceKind::CoreMl,
        }
    }
}

/// What the runtime says about one accelerator: whether support was compiled
/// in for this platform and whether it is usable right now.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcceleratorReport {
    pub accelerator: Accelerator,
    pub built: bool,
    pub available: bool,
}

impl AcceleratorReport {
    pub fn usable(&self) -> bool {
        self.built && self.available
    }
}

/// Picks the most preferred accelerator that is both built and available,
/// falling back to the CPU.
pub fn select_device(reports: &[AcceleratorReport]) -> DeviceKind {
    Accelerator::PREFERENCE
        .iter()
        .find(|acc| reports.iter().any(|r| r.accelerator == **acc && r.usable()))
        .map(|acc| acc.device())
        .unwrap_or(DeviceKind::Cpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(accelerator: Accelerator, built: bool, available: bool) -> AcceleratorReport {
        AcceleratorReport { accelerator, built, available }
    }

    #[test]
    fn no_reports_means_cpu() {
        assert_eq!(select_device(&[]), DeviceKind::Cpu);
    }

    #[test]
    fn available_but_not_built_is_ignored() {
        let reports = [report(Accelerator::CoreMl, false, true)];
        assert_eq!(select_device(&reports), DeviceKind::Cpu);
    }

    #[test]
    fn built_but_not_available_is_ignored() {
        let reports = [report(Accelerator::Cuda, true, false)];
        assert_eq!(select_device(&reports), DeviceKind::Cpu);
    }

    #[test]
    fn usable_coreml_is_selected() {
        let reports = [
            report(Accelerator::Cuda, false, false),
            report(Accelerator::CoreMl, true, true),
        ];
        assert_eq!(select_device(&reports), DeviceKind::CoreMl);
    }

    #[test]
    fn cuda_wins_over_coreml_regardless_of_report_order() {
        let reports = [
            report(Accelerator::CoreMl, true, true),
            report(Accelerator::Cuda, true, true),
        ];
        assert_eq!(select_device(&reports), DeviceKind::Cuda);
    }

    #[test]
    fn display_names() {
        assert_eq!(DeviceKind::Cpu.to_string(), "cpu");
        assert_eq!(DeviceKind::CoreMl.to_string(), "coreml");
    }
}
