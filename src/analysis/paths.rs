// src/analysis/paths.rs

//! Host → environment path rewriting.
//!
//! Windows drives appear inside the environment under `/mnt/<letter>`, so
//! `C:\data\x` becomes `/mnt/c/data/x`. POSIX paths pass through unchanged.

use std::collections::BTreeMap;

use tracing::debug;

/// Rewrite a host path to the environment's mount convention.
pub fn to_environment_path(host: &str) -> String {
    if host.is_empty() {
        return String::new();
    }
    if host.starts_with('/') {
        return host.to_string();
    }

    match split_drive(host) {
        Some((letter, rest)) => format!(
            "/mnt/{}{}",
            letter.to_ascii_lowercase(),
            rest.replace('\\', "/")
        ),
        None => host.replace('\\', "/"),
    }
}

/// `true` for `C:\...`-style host paths.
pub fn has_drive_letter(path: &str) -> bool {
    split_drive(path).is_some()
}

/// `C:\x` → `('C', "\x")`.
fn split_drive(path: &str) -> Option<(char, &str)> {
    let mut chars = path.chars();
    let letter = chars.next()?;
    if letter.is_ascii_alphabetic() && chars.next() == Some(':') {
        Some((letter, &path[2..]))
    } else {
        None
    }
}

/// One line of `mount` output: `<spec> on <file> type <vfstype> (<opts>)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub spec: String,
    pub target: String,
    pub vfs_type: String,
    pub options: BTreeMap<String, Option<String>>,
}

impl MountEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [spec, "on", target, "type", vfs_type, opts] = fields.as_slice() else {
            return None;
        };

        let opts = opts.trim_start_matches('(').trim_end_matches(')');
        let options = opts
            .split([',', ';'])
            .filter(|o| !o.is_empty())
            .map(|o| match o.split_once('=') {
                Some((k, v)) => (k.to_string(), Some(v.to_string())),
                None => (o.to_string(), None),
            })
            .collect();

        Some(Self {
            spec: spec.to_string(),
            target: target.to_string(),
            vfs_type: vfs_type.to_string(),
            options,
        })
    }

    /// A Windows drive surfaced through the 9p `drvfs` filesystem.
    pub fn is_drvfs(&self) -> bool {
        self.vfs_type == "9p"
            && self
                .options
                .get("aname")
                .is_some_and(|v| v.as_deref() == Some("drvfs"))
    }
}

/// Drive mappings read from the environment's mount table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    drives: BTreeMap<String, String>,
}

impl MountTable {
    /// Build from `mount` output. Lines that do not parse are skipped.
    pub fn parse(mount_output: &str) -> Self {
        let drives = mount_output
            .lines()
            .filter_map(|line| {
                let entry = MountEntry::parse(line);
                if entry.is_none() && !line.trim().is_empty() {
                    debug!(%line, "skipping unparsable mount line");
                }
                entry
            })
            .filter(MountEntry::is_drvfs)
            .map(|e| (e.spec, e.target))
            .collect();
        Self { drives }
    }

    pub fn is_mounted(&self, host_root: &str) -> bool {
        self.drives.contains_key(host_root)
    }

    /// True if some drive is mounted at `target` (e.g. `/mnt/c`).
    pub fn has_mount_point(&self, target: &str) -> bool {
        let target = target.trim_end_matches('/');
        self.drives.values().any(|t| t.trim_end_matches('/') == target)
    }

    pub fn len(&self) -> usize {
        self.drives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drives.is_empty()
    }

    /// Rewrite using the actual mounts; falls back to
    /// [`to_environment_path`] for drives that are not in the table.
    pub fn translate(&self, host: &str) -> String {
        for (spec, target) in &self.drives {
            if let Some(rest) = host.strip_prefix(spec.as_str()) {
                let joined = format!("{}/{}", target.trim_end_matches('/'), rest);
                return joined.replace('\\', "/");
            }
        }
        to_environment_path(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_paths_are_rewritten() {
        assert_eq!(to_environment_path(r"C:\data\x"), "/mnt/c/data/x");
        assert_eq!(to_environment_path(r"D:\Runs 2021\fastq"), "/mnt/d/Runs 2021/fastq");
        assert_eq!(to_environment_path("E:/mixed\\seps"), "/mnt/e/mixed/seps");
    }

    #[test]
    fn posix_and_empty_paths_pass_through() {
        assert_eq!(to_environment_path(""), "");
        assert_eq!(to_environment_path("/tmp/spikes_mapping_file.tab"), "/tmp/spikes_mapping_file.tab");
        assert_eq!(to_environment_path(r"relative\dir"), "relative/dir");
    }

    const MOUNT_OUTPUT: &str = "\
/dev/sdb on / type ext4 (rw,relatime,discard,errors=remount-ro,data=ordered)
C:\\ on /mnt/c type 9p (rw,noatime,dirsync,aname=drvfs;path=C:\\;uid=1000;gid=1000;symlinkroot=/mnt/,mmap,access=client,msize=65536,trans=fd,rfd=8,wfd=8)
Z:\\ on /mnt/z type 9p (rw,noatime,dirsync,aname=drvfs;path=Z:\\;uid=1000;gid=1000)
garbage line
";

    #[test]
    fn mount_table_keeps_only_drvfs() {
        let table = MountTable::parse(MOUNT_OUTPUT);
        assert_eq!(table.len(), 2);
        assert!(table.is_mounted("C:\\"));
        assert!(table.is_mounted("Z:\\"));
        assert!(!table.is_mounted("/dev/sdb"));
        assert!(table.has_mount_point("/mnt/z/"));
        assert!(!table.has_mount_point("/"));
    }

    #[test]
    fn mount_table_translates_mapped_and_unmapped_drives() {
        let table = MountTable::parse(MOUNT_OUTPUT);
        assert_eq!(table.translate(r"Z:\share\run1"), "/mnt/z/share/run1");
        assert_eq!(table.translate(r"D:\local"), "/mnt/d/local");
    }

    #[test]
    fn mount_entry_parses_options() {
        let e = MountEntry::parse("C:\\ on /mnt/c type 9p (rw,aname=drvfs;path=C:\\)").unwrap();
        assert_eq!(e.target, "/mnt/c");
        assert_eq!(e.options.get("rw"), Some(&None));
        assert_eq!(e.options.get("aname"), Some(&Some("drvfs".to_string())));
        assert!(e.is_drvfs());
    }
}
