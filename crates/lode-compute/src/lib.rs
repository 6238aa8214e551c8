//! `lode-compute` - Compute backends and per-layer device dispatch for lode-runtime.
//!
//! This crate provides:
//! - A `ComputeBackend` trait over the tensor operations the forward pass needs
//! - A reference `CpuBackend` running matmuls on a rayon thread pool
//! - Device probing (`DeviceProbe`) and layer placement (`PlacementPlan`)
//! - `LayerDispatch`, which binds one backend per transformer layer at
//!   context-creation time and owns all cross-device activation movement

pub mod backend;
pub mod cpu;
pub mod device;
pub mod dispatch;
pub mod error;
#[cfg(feature = "metal")]
pub mod metal;
pub mod plan;

pub use backend::ComputeBackend;
pub use cpu::CpuBackend;
pub use device::{AcceleratorInfo, DeviceKind, DeviceProbe, SystemProbe};
pub use dispatch::LayerDispatch;
pub use error::{ComputeError, Result};
pub use plan::{GpuLayers, PlacementPlan};
