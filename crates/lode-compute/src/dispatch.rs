use std::sync::Arc;

use tracing::{trace, warn};

use crate::backend::ComputeBackend;
use crate::device::DeviceKind;
use crate::plan::PlacementPlan;

/// Per-layer backend routing, fixed at context-creation time.
///
/// The forward pass asks the dispatch for each layer's backend instead of
/// choosing a device per call, and hands every inter-layer activation to
/// [`LayerDispatch::carry`] so that crossing a device boundary happens in
/// exactly one place.
pub struct LayerDispatch {
    layers: Vec<Arc<dyn ComputeBackend>>,
    /// Backend for the embedding lookup, final norm, and LM head.
    head: Arc<dyn ComputeBackend>,
}

impl LayerDispatch {
    /// Bind one backend per layer according to the placement plan.
    ///
    /// If the plan asks for accelerator layers but no accelerator backend
    /// could be constructed (missing feature, bind-time failure, device
    /// out-of-memory), those layers degrade to the host backend rather
    /// than aborting.
    pub fn bind(
        plan: &PlacementPlan,
        host: Arc<dyn ComputeBackend>,
        accelerator: Option<Arc<dyn ComputeBackend>>,
    ) -> LayerDispatch {
        if accelerator.is_none() && plan.n_accelerator() > 0 {
            warn!(
                layers = plan.n_accelerator(),
                "accelerator backend unavailable at bind time, degrading to host"
            );
        }

        let layers = (0..plan.n_layers())
            .map(|i| match (plan.device_for(i), &accelerator) {
                (DeviceKind::Accelerator, Some(accel)) => Arc::clone(accel),
                _ => Arc::clone(&host),
            })
            .collect();

        LayerDispatch {
            layers,
            head: host,
        }
    }

    /// Convenience constructor: every layer on one host backend.
    pub fn host_only(n_layers: usize, host: Arc<dyn ComputeBackend>) -> LayerDispatch {
        LayerDispatch {
            layers: (0..n_layers).map(|_| Arc::clone(&host)).collect(),
            head: host,
        }
    }

    /// The backend bound to `layer`.
    pub fn layer(&self, layer: usize) -> &dyn ComputeBackend {
        self.layers[layer].as_ref()
    }

    /// The backend for the non-layer parts of the pass (embedding, final
    /// norm, logits).
    pub fn head(&self) -> &dyn ComputeBackend {
        self.head.as_ref()
    }

    /// Number of layers this dispatch covers.
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Move activations from the device of `from` to the device of `to`.
    ///
    /// Activations are host-resident vectors; backends on other devices
    /// stage their own uploads per operation, so the only work here is
    /// accounting for the boundary. This is still the single point any
    /// cross-device movement goes through, which keeps mixed plans correct
    /// if a resident-buffer accelerator backend is added.
    pub fn carry(&self, from: Option<usize>, to: usize, activations: Vec<f32>) -> Vec<f32> {
        let src = match from {
            Some(i) => self.layers[i].device(),
            None => self.head.device(),
        };
        let dst = self.layers[to].device();
        if src != dst {
            trace!(%src, %dst, layer = to, "activation crossed device boundary");
        }
        activations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;
    use crate::device::{AcceleratorInfo, DeviceProbe};
    use crate::plan::{GpuLayers, PlacementPlan};

    struct FakeProbe;

    impl DeviceProbe for FakeProbe {
        fn accelerator(&self) -> Option<AcceleratorInfo> {
            Some(AcceleratorInfo {
                name: "fake-gpu".to_string(),
                free_memory: u64::MAX,
            })
        }
    }

    #[test]
    fn missing_accelerator_backend_degrades_to_host() {
        // The plan wants all layers offloaded, but no accelerator backend
        // exists; every layer must still be routable.
        let plan = PlacementPlan::resolve(GpuLayers::Auto, 3, 0, &FakeProbe);
        assert_eq!(plan.n_accelerator(), 3);

        let host: Arc<dyn ComputeBackend> = Arc::new(CpuBackend::new());
        let dispatch = LayerDispatch::bind(&plan, host, None);
        for i in 0..3 {
            assert_eq!(dispatch.layer(i).device(), DeviceKind::Host);
        }
    }

    #[test]
    fn carry_passes_data_through() {
        let host: Arc<dyn ComputeBackend> = Arc::new(CpuBackend::new());
        let dispatch = LayerDispatch::host_only(2, host);
        let out = dispatch.carry(Some(0), 1, vec![1.0, 2.0]);
        assert_eq!(out, vec![1.0, 2.0]);
    }
}
