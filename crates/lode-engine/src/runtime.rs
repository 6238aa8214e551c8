use once_cell::sync::OnceCell;
use tracing::info;

use lode_compute::DeviceProbe;

static RUNTIME: OnceCell<()> = OnceCell::new();

/// One-time process-wide startup: log the build and what the device probe
/// sees. Subsequent engine constructions are no-ops here, so constructing
/// several engines never re-runs device discovery side effects.
pub fn init(probe: &dyn DeviceProbe) {
    RUNTIME.get_or_init(|| {
        match probe.accelerator() {
            Some(accel) => info!(
                version = env!("CARGO_PKG_VERSION"),
                accelerator = %accel.name,
                free_memory = accel.free_memory,
                "runtime initialized"
            ),
            None => info!(
                version = env!("CARGO_PKG_VERSION"),
                "runtime initialized, no accelerator present"
            ),
        }
    });
}
