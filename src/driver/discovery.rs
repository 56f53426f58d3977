// src/driver/discovery.rs

//! Locating host tools on `PATH`.

use std::env;
use std::path::{Path, PathBuf};

#[cfg(windows)]
const EXTENSIONS: &[&str] = &["", ".exe", ".cmd", ".bat"];
#[cfg(not(windows))]
const EXTENSIONS: &[&str] = &[""];

/// Resolve `name` the way a shell would.
///
/// Names containing a path separator are checked as given.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return with_extensions(candidate).find(|p| is_executable(p));
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .flat_map(|dir| with_extensions(&dir.join(name)).collect::<Vec<_>>())
        .find(|p| is_executable(p))
}

/// A regular file the current user may run.
fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn with_extensions(base: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    EXTENSIONS.iter().map(move |ext| {
        if ext.is_empty() {
            base.to_path_buf()
        } else {
            let mut s = base.as_os_str().to_owned();
            s.push(ext);
            PathBuf::from(s)
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn finds_sh() {
        assert!(find_executable("sh").is_some());
    }

    #[test]
    fn unknown_tool_is_none() {
        assert!(find_executable("no-such-tool-0f9a2c").is_none());
    }

    #[test]
    fn files_without_execute_bit_are_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("wsl");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(find_executable(tool.to_str().unwrap()).is_none());

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_executable(tool.to_str().unwrap()), Some(tool));
    }

    #[test]
    fn directories_are_not_tools() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_executable(dir.path().to_str().unwrap()).is_none());
    }

    #[test]
    fn explicit_path_is_checked_directly() {
        assert!(find_executable("/bin/sh").is_some());
        assert!(find_executable("/nonexistent/dir/sh").is_none());
    }
}
