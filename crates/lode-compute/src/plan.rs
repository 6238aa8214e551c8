use tracing::{info, warn};

use crate::device::{DeviceKind, DeviceProbe};

/// How many transformer layers the caller wants resident on the accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuLayers {
    /// Offload as many layers as the accelerator's memory budget allows
    /// (the `-1` sentinel of the public API).
    Auto,
    /// Host-only execution (`0`).
    None,
    /// An exact layer count, clamped to the model's layer count (`> 0`).
    Count(usize),
}

impl GpuLayers {
    /// Map the raw integer convention (`-1` / `0` / `n`) onto a placement
    /// request. Any negative value means "use all available".
    pub fn from_raw(n: i32) -> Self {
        match n {
            n if n < 0 => GpuLayers::Auto,
            0 => GpuLayers::None,
            n => GpuLayers::Count(n as usize),
        }
    }
}

/// A resolved per-layer device assignment.
///
/// Resolution never fails: when the accelerator is absent or its memory
/// budget is too small, layers fall back to the host and the resolved plan
/// is reported, per the degrade-don't-abort policy.
#[derive(Debug, Clone)]
pub struct PlacementPlan {
    assignments: Vec<DeviceKind>,
    /// Name of the accelerator used, when any layer is offloaded.
    pub accelerator: Option<String>,
}

impl PlacementPlan {
    /// Resolve a placement request against the probed hardware.
    ///
    /// - `n_layers`: total transformer layer count.
    /// - `layer_bytes`: estimated resident size of one layer's weights,
    ///   used to pack layers into the accelerator's memory budget.
    ///
    /// Offloaded layers are the trailing ones, so the host->accelerator
    /// boundary is crossed at most once per forward pass.
    pub fn resolve(
        requested: GpuLayers,
        n_layers: usize,
        layer_bytes: u64,
        probe: &dyn DeviceProbe,
    ) -> PlacementPlan {
        let device = probe.accelerator();

        let n_accel = match (requested, &device) {
            (GpuLayers::None, _) => 0,
            (_, None) => {
                warn!("no accelerator available, running all layers on host");
                0
            }
            (GpuLayers::Auto, Some(info)) => {
                let fit = if layer_bytes == 0 {
                    n_layers
                } else {
                    (info.free_memory / layer_bytes) as usize
                };
                if fit < n_layers {
                    warn!(
                        budget = info.free_memory,
                        fit, n_layers, "accelerator memory holds only part of the model"
                    );
                }
                fit.min(n_layers)
            }
            (GpuLayers::Count(n), Some(_)) => {
                if n > n_layers {
                    warn!(requested = n, n_layers, "gpu layer count clamped to model size");
                }
                n.min(n_layers)
            }
        };

        let mut assignments = vec![DeviceKind::Host; n_layers];
        for slot in assignments.iter_mut().skip(n_layers - n_accel) {
            *slot = DeviceKind::Accelerator;
        }

        let accelerator = if n_accel > 0 {
            device.map(|d| d.name)
        } else {
            None
        };

        // The resolved-plan report: the observable side effect of fallback.
        info!(
            n_layers,
            n_accelerator = n_accel,
            n_host = n_layers - n_accel,
            accelerator = accelerator.as_deref().unwrap_or("none"),
            "resolved device placement"
        );

        PlacementPlan {
            assignments,
            accelerator,
        }
    }

    /// Device assigned to `layer`.
    pub fn device_for(&self, layer: usize) -> DeviceKind {
        self.assignments[layer]
    }

    /// Total layer count covered by this plan.
    pub fn n_layers(&self) -> usize {
        self.assignments.len()
    }

    /// Number of layers resident on the accelerator.
    pub fn n_accelerator(&self) -> usize {
        self.assignments
            .iter()
            .filter(|d| **d == DeviceKind::Accelerator)
            .count()
    }
}
