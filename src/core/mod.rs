//! Core calibration modules

pub mod cross_pol;
pub mod dem_swap;
pub mod lut;
pub mod lut_builder;
pub mod orchestrator;
pub mod pool;
pub mod postprocess;
pub mod smoothing;

// Re-export main types
pub use cross_pol::{CompositeParams, CrossPolCompositor};
pub use dem_swap::{with_flat_dem, DemSwap};
pub use lut::{CalibrationSurface, LutLocation, LOOK_BINS, SLOPE_BINS};
pub use lut_builder::{AccumulatorPair, LutBuilder, LutParams};
pub use orchestrator::{BatchParams, BatchReport, CalibrationOrchestrator, SceneReport, SceneState};
pub use pool::ScenePool;
pub use postprocess::{PostProcessStats, PostProcessor};
pub use smoothing::{
    ProfileSmoother, SmoothingMode, SmoothingOutput, SmoothingParams, SurfaceSmoother,
};
