// src/driver/version.rs

//! Version checks used by `self_check`.

use regex::Regex;
use semver::Version;
use tracing::debug;

use crate::errors::DriverError;

use super::ExecutionDriver;

/// File inside a built environment holding the toolkit version it was built
/// with.
pub const VERSION_MARKER_PATH: &str = "/usr/local/bin/wsl_distro_version.txt";

/// Kernels of second-generation VMs are built with gcc 8 or newer; first
/// generation environments report an older toolchain (or none).
pub const MIN_GCC_MAJOR_FOR_GENERATION_2: u64 = 8;

/// Parse a version that may omit minor/patch (`"2"`, `"2.1"`, `"v2.1.0"`).
pub fn parse_lenient(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }
    let mut parts = trimmed.split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    if parts.next().is_some() {
        return None;
    }
    Some(Version::new(major, minor, patch))
}

/// Major gcc version from a `/proc/version` line.
pub fn gcc_major(proc_version: &str) -> Option<u64> {
    let re = Regex::new(r"gcc version (\d+)\.(\d+)\.(\d+)").ok()?;
    re.captures(proc_version)?.get(1)?.as_str().parse().ok()
}

/// Require a second-generation VM kernel.
pub async fn check_vm_generation(driver: &dyn ExecutionDriver) -> Result<(), DriverError> {
    let (result, output) = driver.run_captured("cat /proc/version").await?;
    if !result.success() {
        return Err(DriverError::IncompatibleVersion {
            found: "unknown (cannot read /proc/version)".to_string(),
            required: format!("gcc >= {MIN_GCC_MAJOR_FOR_GENERATION_2} kernel"),
        });
    }

    let text = output.stdout().text();
    match gcc_major(&text) {
        Some(major) if major < MIN_GCC_MAJOR_FOR_GENERATION_2 => {
            Err(DriverError::IncompatibleVersion {
                found: format!("gcc {major} kernel"),
                required: format!("gcc >= {MIN_GCC_MAJOR_FOR_GENERATION_2} kernel"),
            })
        }
        Some(major) => {
            debug!(gcc_major = major, "second generation VM kernel found");
            Ok(())
        }
        None => {
            debug!(proc_version = %text.trim(), "no gcc version in /proc/version; skipping generation check");
            Ok(())
        }
    }
}

/// Require the toolkit version marker to be at least `required`.
pub async fn check_version_marker(
    driver: &dyn ExecutionDriver,
    required: &Version,
) -> Result<(), DriverError> {
    let cmd = format!("cat {VERSION_MARKER_PATH}");
    let (result, output) = driver.run_captured(&cmd).await?;

    let raw = output.stdout().text();
    let found = if result.success() {
        parse_lenient(&raw)
    } else {
        None
    };

    match found {
        Some(found) if &found >= required => {
            debug!(%found, %required, "environment version ok");
            Ok(())
        }
        Some(found) => Err(DriverError::IncompatibleVersion {
            found: found.to_string(),
            required: required.to_string(),
        }),
        None => Err(DriverError::IncompatibleVersion {
            found: format!("unreadable marker {:?}", raw.trim()),
            required: required.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_versions() {
        assert_eq!(parse_lenient("2"), Some(Version::new(2, 0, 0)));
        assert_eq!(parse_lenient("2.1\n"), Some(Version::new(2, 1, 0)));
        assert_eq!(parse_lenient("v1.4.2"), Some(Version::new(1, 4, 2)));
        assert_eq!(parse_lenient("1.2.3.4"), None);
        assert_eq!(parse_lenient("latest"), None);
        assert_eq!(parse_lenient(""), None);
    }

    #[test]
    fn gcc_major_from_proc_version() {
        let wsl2 = "Linux version 5.10.16.3-microsoft-standard-WSL2 (oe-user@oe-host) \
                    (x86_64-msft-linux-gcc (GCC) 9.3.0, GNU ld (GNU Binutils) 2.34.0.20200220) \
                    #1 SMP Fri Apr 2 22:23:49 UTC 2021";
        assert_eq!(gcc_major(wsl2), None);

        let classic = "Linux version 4.19.84-microsoft-standard (oe-user@oe-host) \
                       (gcc version 8.2.0 (GCC)) #1 SMP Wed Nov 13 11:44:37 UTC 2019";
        assert_eq!(gcc_major(classic), Some(8));

        let old = "Linux version 4.4.0-19041-Microsoft (gcc version 5.4.0 (GCC) )";
        assert_eq!(gcc_major(old), Some(5));
    }
}
