/// Which physical device a backend executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Host CPU.
    Host,
    /// An accelerator device (GPU).
    Accelerator,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Host => write!(f, "host"),
            DeviceKind::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Description of a detected accelerator device.
#[derive(Debug, Clone)]
pub struct AcceleratorInfo {
    /// Human-readable device name.
    pub name: String,
    /// Bytes of device memory available for layer weights.
    pub free_memory: u64,
}

/// Reports what compute devices are present on this machine.
///
/// Placement resolution only ever consults a probe, so tests can inject
/// fake devices (e.g. an accelerator that reports zero free memory).
pub trait DeviceProbe: Send + Sync {
    /// Returns the accelerator device, if one is usable.
    fn accelerator(&self) -> Option<AcceleratorInfo>;
}

/// Probe for the devices actually present on the running system.
///
/// Without an accelerator feature compiled in, only the host CPU exists.
#[derive(Debug, Default)]
pub struct SystemProbe;

impl DeviceProbe for SystemProbe {
    fn accelerator(&self) -> Option<AcceleratorInfo> {
        #[cfg(feature = "metal")]
        {
            crate::metal::probe()
        }
        #[cfg(not(feature = "metal"))]
        {
            None
        }
    }
}
