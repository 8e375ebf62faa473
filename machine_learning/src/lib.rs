pub mod arch;
pub mod checkpoint;
pub mod data;
pub mod optimization;
pub mod specs;
pub mod stats;
pub mod training;

pub use ml_core::{DensityModel, MlError, Mode, Result, Snapshot};
