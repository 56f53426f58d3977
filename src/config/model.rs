// src/config/model.rs

use semver::Version;
use serde::Deserialize;

use crate::analysis::AnalysisParameters;
use crate::distro::{DEFAULT_DISTRIBUTION, DEFAULT_DISTRO_TOOL};
use crate::driver::VolumeMount;
use crate::driver::container::DEFAULT_CONTAINER_EXECUTABLE;
use crate::types::DriverKind;

/// Run file as read from TOML, before validation.
///
/// ```toml
/// [driver]
/// kind = "wsl"
/// distribution = "ngstoolkitdist"
///
/// [run]
/// working_dir = 'C:\runs\2021-03-01'
/// mapping_file = 'C:\runs\2021-03-01\mapping.tab'
/// spikes = true
///
/// [analysis]
/// mode = "zotu"
/// minmergelen = 300
/// ```
///
/// `[driver]` and `[analysis]` are optional; `[run]` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub driver: RawDriverSection,

    pub run: RunSection,

    #[serde(default)]
    pub analysis: AnalysisParameters,
}

/// `[driver]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawDriverSection {
    pub kind: DriverKind,

    /// Distribution used by the `wsl` driver.
    pub distribution: String,

    pub user: Option<String>,

    /// Required VM generation of the `wsl` driver; `2` enables the kernel
    /// check, anything else disables it.
    pub vm_generation: Option<u8>,

    /// Host tool of the `wsl` driver.
    pub tool: String,

    /// Container engine of the `docker` driver (`docker` or `podman`).
    pub executable: String,

    /// Image a detached container is started from for each run.
    pub image: String,

    /// Exec into this running container instead of starting `image`.
    pub container: Option<String>,

    /// Mounted into the container started from `image`.
    pub volumes: Vec<VolumeMount>,

    /// Minimum toolkit version expected in the environment, e.g. `"2.1"`.
    pub min_version: Option<String>,
}

impl Default for RawDriverSection {
    fn default() -> Self {
        Self {
            kind: DriverKind::default(),
            distribution: DEFAULT_DISTRIBUTION.to_string(),
            user: None,
            vm_generation: Some(2),
            tool: DEFAULT_DISTRO_TOOL.to_string(),
            executable: DEFAULT_CONTAINER_EXECUTABLE.to_string(),
            image: "ngstoolkit".to_string(),
            container: None,
            volumes: Vec::new(),
            min_version: None,
        }
    }
}

/// `[run]` section: what to analyse and where results go.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RunSection {
    /// Host folder holding the `fastq/` reads.
    pub working_dir: String,

    #[serde(default)]
    pub mapping_file: Option<String>,

    /// Output folder; defaults to `<working_dir>/out_<MODE>_<timestamp>`.
    #[serde(default)]
    pub outpath: Option<String>,

    /// Remove spike-in reads before and normalize by them after the
    /// analysis. Needs a mapping file.
    #[serde(default)]
    pub spikes: bool,

    /// Keep the `.fastq.gz` archives next to the decompressed reads.
    #[serde(default)]
    pub keep_compressed: bool,
}

/// Validated `[driver]` section. Opened by [`DriverConfig::open`].
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub kind: DriverKind,
    pub distribution: String,
    pub user: Option<String>,
    pub vm_generation: Option<u8>,
    pub tool: String,
    pub executable: String,
    pub image: String,
    pub container: Option<String>,
    pub volumes: Vec<VolumeMount>,
    pub min_version: Option<Version>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let raw = RawDriverSection::default();
        Self {
            kind: raw.kind,
            distribution: raw.distribution,
            user: raw.user,
            vm_generation: raw.vm_generation,
            tool: raw.tool,
            executable: raw.executable,
            image: raw.image,
            container: raw.container,
            volumes: raw.volumes,
            min_version: None,
        }
    }
}

/// Validated run file.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub driver: DriverConfig,
    pub run: RunSection,
    pub analysis: AnalysisParameters,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(driver: DriverConfig, run: RunSection, analysis: AnalysisParameters) -> Self {
        Self { driver, run, analysis }
    }
}
