// src/config/validate.rs

use crate::config::model::{ConfigFile, DriverConfig, RawConfigFile, RawDriverSection, RunSection};
use crate::driver::version::parse_lenient;
use crate::errors::{NgspipeError, Result};
use crate::types::DriverKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = NgspipeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_run(&raw.run)?;
        raw.analysis
            .validate()
            .map_err(|e| NgspipeError::ConfigError(format!("[analysis]: {e}")))?;
        let driver = validate_driver(raw.driver)?;
        Ok(ConfigFile::new_unchecked(driver, raw.run, raw.analysis))
    }
}

fn validate_run(run: &RunSection) -> Result<()> {
    if run.working_dir.trim().is_empty() {
        return Err(NgspipeError::ConfigError(
            "[run].working_dir must not be empty".to_string(),
        ));
    }
    if run.spikes && run.mapping_file.is_none() {
        return Err(NgspipeError::ConfigError(
            "[run].spikes requires [run].mapping_file".to_string(),
        ));
    }
    Ok(())
}

fn validate_driver(raw: RawDriverSection) -> Result<DriverConfig> {
    match raw.kind {
        DriverKind::Wsl if raw.distribution.trim().is_empty() => {
            return Err(NgspipeError::ConfigError(
                "[driver].distribution must not be empty for kind = \"wsl\"".to_string(),
            ));
        }
        DriverKind::Docker if raw.container.is_none() && raw.image.trim().is_empty() => {
            return Err(NgspipeError::ConfigError(
                "[driver] needs an image or a container for kind = \"docker\"".to_string(),
            ));
        }
        _ => {}
    }

    if let Some(generation) = raw.vm_generation {
        if !(1..=2).contains(&generation) {
            return Err(NgspipeError::ConfigError(format!(
                "[driver].vm_generation must be 1 or 2 (got {generation})"
            )));
        }
    }

    let min_version = match raw.min_version.as_deref() {
        None => None,
        Some(raw_version) => Some(parse_lenient(raw_version).ok_or_else(|| {
            NgspipeError::ConfigError(format!(
                "[driver].min_version is not a version: '{raw_version}'"
            ))
        })?),
    };

    Ok(DriverConfig {
        kind: raw.kind,
        distribution: raw.distribution,
        user: raw.user,
        vm_generation: raw.vm_generation,
        tool: raw.tool,
        executable: raw.executable,
        image: raw.image,
        container: raw.container,
        volumes: raw.volumes,
        min_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn parse(text: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(text)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let cfg = parse("[run]\nworking_dir = '/data/run1'\n").unwrap();
        assert_eq!(cfg.run.working_dir, "/data/run1");
        assert!(!cfg.run.spikes);
        assert_eq!(cfg.driver.distribution, "ngstoolkitdist");
        assert_eq!(cfg.analysis.minmergelen, 300);
    }

    #[test]
    fn driver_section_is_typed() {
        let cfg = parse(
            r#"
            [driver]
            kind = "docker"
            executable = "podman"
            image = "ngstoolkit:2.1"
            min_version = "2.1"
            volumes = [{ host = "/data", guest = "/data" }]

            [run]
            working_dir = "/data/run1"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.driver.kind, DriverKind::Docker);
        assert_eq!(cfg.driver.executable, "podman");
        assert_eq!(cfg.driver.min_version, Some(Version::new(2, 1, 0)));
        assert_eq!(cfg.driver.volumes.len(), 1);
    }

    #[test]
    fn spikes_without_mapping_file_is_rejected() {
        let err = parse("[run]\nworking_dir = '/r'\nspikes = true\n").unwrap_err();
        assert!(matches!(err, NgspipeError::ConfigError(ref m) if m.contains("mapping_file")));
    }

    #[test]
    fn empty_working_dir_is_rejected() {
        assert!(matches!(
            parse("[run]\nworking_dir = ''\n"),
            Err(NgspipeError::ConfigError(_))
        ));
    }

    #[test]
    fn analysis_ranges_are_checked() {
        let err = parse("[run]\nworking_dir = '/r'\n[analysis]\nallow_barcode_mismatch = 3\n").unwrap_err();
        assert!(matches!(err, NgspipeError::ConfigError(ref m) if m.starts_with("[analysis]")));
    }

    #[test]
    fn bad_min_version_is_rejected() {
        let err = parse("[driver]\nmin_version = 'latest'\n[run]\nworking_dir = '/r'\n").unwrap_err();
        assert!(matches!(err, NgspipeError::ConfigError(ref m) if m.contains("min_version")));
    }

    #[test]
    fn unknown_driver_kind_fails_to_parse() {
        assert!(matches!(
            parse("[driver]\nkind = 'ssh'\n[run]\nworking_dir = '/r'\n"),
            Err(NgspipeError::TomlError(_))
        ));
    }

    #[test]
    fn vm_generation_range() {
        let err = parse("[driver]\nvm_generation = 3\n[run]\nworking_dir = '/r'\n").unwrap_err();
        assert!(matches!(err, NgspipeError::ConfigError(ref m) if m.contains("vm_generation")));
    }
}
