// src/steps/fastq.rs

//! FASTQ file checks used by step prechecks.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use crate::fs::FileSystem;

/// `<sample>_S<n>_L<lane>_R<1|2>_001`, read files only (no `I1`/`I2`).
static ILLUMINA_READ_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(.*?)_(S[0-9]*)_(L[0-9]*)_(R[12])_001$").ok());

const FASTQ: &str = ".fastq";
const FASTQ_GZ: &str = ".fastq.gz";

/// Strip `.fastq` or `.fastq.gz`.
fn fastq_stem(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(FASTQ_GZ)
        .or_else(|| file_name.strip_suffix(FASTQ))
}

/// True for Illumina read files. A full host or environment path may be
/// given; only the file name is checked.
pub fn has_illumina_read_naming(path: &str) -> bool {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let Some(stem) = fastq_stem(file_name) else {
        return false;
    };
    ILLUMINA_READ_NAME
        .as_ref()
        .is_some_and(|re| re.is_match(stem))
}

/// Count Illumina read files in `dir` ending in `extension`.
pub fn count_read_files(fs: &dyn FileSystem, dir: &Path, extension: &str) -> Result<usize> {
    Ok(fs
        .file_names(dir)?
        .iter()
        .filter(|name| name.ends_with(extension) && has_illumina_read_naming(name))
        .count())
}

pub fn count_gzipped_read_files(fs: &dyn FileSystem, dir: &Path) -> Result<usize> {
    count_read_files(fs, dir, FASTQ_GZ)
}

pub fn count_plain_read_files(fs: &dyn FileSystem, dir: &Path) -> Result<usize> {
    count_read_files(fs, dir, FASTQ)
}

/// True when every `.fastq.gz` in `dir` has exactly one matching `.fastq`
/// (and vice versa), or when there are no compressed files at all.
pub fn each_file_has_decompressed_version(fs: &dyn FileSystem, dir: &Path) -> Result<bool> {
    let names = fs.file_names(dir)?;
    let mut compressed: Vec<&str> = names.iter().filter_map(|n| n.strip_suffix(FASTQ_GZ)).collect();
    let mut plain: Vec<&str> = names.iter().filter_map(|n| n.strip_suffix(FASTQ)).collect();

    if compressed.is_empty() {
        return Ok(true);
    }
    compressed.sort_unstable();
    plain.sort_unstable();
    Ok(compressed == plain)
}
