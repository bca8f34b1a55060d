//! Boundaries to the world outside the calibration engine: annotation text,
//! raster files, scene naming and the native calibration programs.

pub mod annotation;
pub mod external;
pub mod raster;
pub mod scene;

pub use annotation::{Annotation, AnnotationReader};
pub use external::{run_checked, CommandRunner, Invocation, InvocationOutput, ProcessRunner};
pub use raster::{read_flat, write_flat, EnviHeader, FlatRasterEdit, GdalRasterStore, RasterStore};
pub use scene::{discover_scenes, SceneFiles};
