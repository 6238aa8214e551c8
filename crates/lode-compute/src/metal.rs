// Metal accelerator backend (macOS only).
//
// Device discovery is wired into `SystemProbe`; the compute pipeline
// (shader compilation, buffer management, ComputeBackend impl) is not
// implemented yet, so `probe` reports no usable device and placement
// resolves to host execution.

use crate::device::AcceleratorInfo;

/// Probe for a usable Metal device.
pub fn probe() -> Option<AcceleratorInfo> {
    // TODO: query MTLCreateSystemDefaultDevice via objc2-metal and report
    // recommendedMaxWorkingSetSize as the memory budget.
    None
}
