// src/distro/mod.rs

//! Distribution lifecycle: list, import, export, unregister, and building a
//! distribution from a Dockerfile.

pub mod dockerfile;
pub mod import;
pub mod manager;

pub use dockerfile::DockerfileDistribution;
pub use import::{
    DUPLICATE_NAME_MESSAGE, DistributionTarFile, LOCATION_IN_USE_MESSAGE, translate_import_failure,
};
pub use manager::{DistributionInfo, DistributionManager, RegisteredDistribution, parse_list};

pub use crate::driver::nested_vm::DEFAULT_VM_TOOL as DEFAULT_DISTRO_TOOL;

/// Distribution the analysis tools are installed in.
pub const DEFAULT_DISTRIBUTION: &str = "ngstoolkitdist";
