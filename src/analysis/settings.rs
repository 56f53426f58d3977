// src/analysis/settings.rs

//! The `settings.ini` file handed to the in-environment analysis runner.
//!
//! The file is written on the host and read inside the environment, so every
//! path field goes through [`to_environment_path`] on the way out. Reading
//! gives back those rewritten values and re-validates the same ranges the
//! analysis runner enforces.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::errors::SettingsError;
use crate::fs::FileSystem;
use crate::types::{AnalysisMode, PipelineReference};

use super::paths::to_environment_path;

pub const SETTINGS_SECTION: &str = "IMNGS_Settings";

/// File name of the artifact inside the run's working directory.
pub const SETTINGS_FILE_NAME: &str = "settings.ini";

/// Tunable analysis parameters. Defaults are the values the analysis is
/// normally run with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisParameters {
    /// `16S`, `18S` or a path to a reference `.fasta`.
    pub pipeline_reference: PipelineReference,
    pub mode: AnalysisMode,
    pub is_paired: bool,
    pub two_indexes: bool,
    pub run_demux: bool,
    /// Allowed barcode mismatches, at most 2.
    pub allow_barcode_mismatch: u8,
    pub minmergelen: u32,
    pub maxmergelen: u32,
    pub forward_trim: u32,
    pub reverse_trim: u32,
    pub trim_score: u32,
    pub expected_error_rate: f64,
    pub abundance: f64,
    pub maxdiffpct: u32,
    /// Samples with fewer reads are dropped; `-1` disables the cutoff.
    pub lowreadsamplecutoff: i64,
    pub cleanoutput: bool,
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self {
            pipeline_reference: PipelineReference::Bacteria16S,
            mode: AnalysisMode::Zotu,
            is_paired: true,
            two_indexes: false,
            run_demux: false,
            allow_barcode_mismatch: 1,
            minmergelen: 300,
            maxmergelen: 600,
            forward_trim: 17,
            reverse_trim: 21,
            trim_score: 20,
            expected_error_rate: 0.02,
            abundance: 0.0025,
            maxdiffpct: 10,
            lowreadsamplecutoff: -1,
            cleanoutput: true,
        }
    }
}

impl AnalysisParameters {
    /// Range checks mirrored from the analysis runner.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.allow_barcode_mismatch > 2 {
            return Err(invalid(
                "allow_barcode_mismatch",
                self.allow_barcode_mismatch,
                "must be between 0 and 2",
            ));
        }
        if !(0.0..=1.0).contains(&self.expected_error_rate) {
            return Err(invalid(
                "expected_error_rate",
                self.expected_error_rate,
                "must be between 0 and 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.abundance) {
            return Err(invalid("abundance", self.abundance, "must be between 0 and 1"));
        }
        if self.maxdiffpct > 100 {
            return Err(invalid("maxdiffpct", self.maxdiffpct, "must be between 0 and 100"));
        }
        if self.minmergelen > self.maxmergelen {
            return Err(invalid(
                "minmergelen",
                self.minmergelen,
                "must not exceed maxmergelen",
            ));
        }
        if let PipelineReference::Custom(path) = &self.pipeline_reference {
            if path.trim().is_empty() {
                return Err(invalid(
                    "pipeline_reference",
                    path,
                    "must be 16S, 18S or a reference path",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString, reason: &str) -> SettingsError {
    SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Everything that goes into the settings file.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    /// `None` writes the `0` sentinel.
    pub mapping_file: Option<String>,
    pub outpath: String,
    pub params: AnalysisParameters,
}

impl AnalysisSettings {
    pub fn new(outpath: impl Into<String>, params: AnalysisParameters) -> Self {
        Self {
            mapping_file: None,
            outpath: outpath.into(),
            params,
        }
    }

    /// Blank and `0` mean "no mapping file", as they do in the file.
    pub fn with_mapping_file(mut self, mapping_file: Option<String>) -> Self {
        self.mapping_file = mapping_file
            .map(|m| m.trim().to_string())
            .filter(|m| !is_no_mapping(m));
        self
    }

    /// The same settings as seen from inside the environment.
    pub fn for_environment(&self) -> AnalysisSettings {
        let mut params = self.params.clone();
        if let PipelineReference::Custom(path) = &params.pipeline_reference {
            params.pipeline_reference = PipelineReference::Custom(to_environment_path(path.trim()));
        }
        AnalysisSettings {
            mapping_file: self
                .mapping_file
                .as_deref()
                .map(|m| to_environment_path(m.trim()))
                .filter(|m| !is_no_mapping(m)),
            outpath: to_environment_path(&self.outpath),
            params,
        }
    }

    /// Render the INI text with all paths rewritten.
    pub fn render(&self) -> String {
        let env = self.for_environment();
        let p = &env.params;

        let entries: [(&str, String); 18] = [
            ("pipeline_reference", p.pipeline_reference.to_string()),
            (
                "mapping_file",
                env.mapping_file.clone().unwrap_or_else(|| "0".to_string()),
            ),
            ("outpath", env.outpath.clone()),
            ("mode", p.mode.to_string()),
            ("isPaired", flag(p.is_paired)),
            ("twoIndexes", flag(p.two_indexes)),
            ("runDemux", flag(p.run_demux)),
            ("allow_barcode_mismatch", p.allow_barcode_mismatch.to_string()),
            ("minmergelen", p.minmergelen.to_string()),
            ("maxmergelen", p.maxmergelen.to_string()),
            ("forward_trim", p.forward_trim.to_string()),
            ("reverse_trim", p.reverse_trim.to_string()),
            ("trim_score", p.trim_score.to_string()),
            ("expected_error_rate", p.expected_error_rate.to_string()),
            ("abundance", p.abundance.to_string()),
            ("maxdiffpct", p.maxdiffpct.to_string()),
            ("lowreadsamplecutoff", p.lowreadsamplecutoff.to_string()),
            ("cleanoutput", flag(p.cleanoutput)),
        ];

        let mut out = format!("[{SETTINGS_SECTION}]\n");
        for (key, value) in entries {
            let _ = writeln!(out, "{key} = {value}");
        }
        out.push('\n');
        out
    }

    /// Parse settings text as the analysis runner would.
    pub fn parse(text: &str) -> Result<AnalysisSettings, SettingsError> {
        let sections = parse_sections(text)?;
        let section = sections
            .get(&SETTINGS_SECTION.to_lowercase())
            .ok_or_else(|| SettingsError::MissingSection(SETTINGS_SECTION.to_string()))?;

        let mapping_file = Some(lookup(section, "mapping_file")?)
            .filter(|m| !is_no_mapping(m))
            .map(str::to_string);

        let mode_raw = lookup(section, "mode")?;
        let mode = AnalysisMode::from_str(mode_raw).map_err(|reason| invalid("mode", mode_raw, &reason))?;

        let params = AnalysisParameters {
            pipeline_reference: PipelineReference::from(lookup(section, "pipeline_reference")?),
            mode,
            is_paired: parse_flag(section, "isPaired")?,
            two_indexes: parse_flag(section, "twoIndexes")?,
            run_demux: parse_flag(section, "runDemux")?,
            allow_barcode_mismatch: parse_value(section, "allow_barcode_mismatch")?,
            minmergelen: parse_value(section, "minmergelen")?,
            maxmergelen: parse_value(section, "maxmergelen")?,
            forward_trim: parse_value(section, "forward_trim")?,
            reverse_trim: parse_value(section, "reverse_trim")?,
            trim_score: parse_value(section, "trim_score")?,
            expected_error_rate: parse_value(section, "expected_error_rate")?,
            abundance: parse_value(section, "abundance")?,
            maxdiffpct: parse_value(section, "maxdiffpct")?,
            lowreadsamplecutoff: parse_value(section, "lowreadsamplecutoff")?,
            cleanoutput: parse_flag(section, "cleanoutput")?,
        };
        params.validate()?;

        Ok(AnalysisSettings {
            mapping_file,
            outpath: lookup(section, "outpath")?.to_string(),
            params,
        })
    }

    pub fn write_to(&self, fs: &dyn FileSystem, path: &Path) -> Result<(), SettingsError> {
        debug!(?path, "writing analysis settings");
        fs.write(path, self.render().as_bytes())?;
        Ok(())
    }

    pub fn read_from(fs: &dyn FileSystem, path: &Path) -> Result<AnalysisSettings, SettingsError> {
        let text = fs.read_to_string(path)?;
        Self::parse(&text)
    }
}

fn is_no_mapping(value: &str) -> bool {
    matches!(value.trim(), "" | "0")
}

fn lookup<'a>(section: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, SettingsError> {
    section
        .get(&key.to_lowercase())
        .map(String::as_str)
        .ok_or_else(|| SettingsError::MissingKey(key.to_string()))
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn parse_flag(section: &BTreeMap<String, String>, key: &str) -> Result<bool, SettingsError> {
    match lookup(section, key)? {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(invalid(key, other, "must be 0 or 1")),
    }
}

fn parse_value<T>(section: &BTreeMap<String, String>, key: &str) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(section, key)?;
    raw.parse::<T>()
        .map_err(|e| invalid(key, raw, &e.to_string()))
}

/// Minimal INI reader: `[section]` headers, `key = value` or `key: value`
/// pairs, `#`/`;` comments. Section and key names are case-insensitive.
fn parse_sections(text: &str) -> Result<BTreeMap<String, BTreeMap<String, String>>, SettingsError> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_lowercase();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let malformed = || SettingsError::Malformed {
            line: idx + 1,
            content: raw_line.to_string(),
        };
        let section = current.as_ref().ok_or_else(malformed)?;
        let split_at = line.find(['=', ':']).ok_or_else(malformed)?;
        let key = line[..split_at].trim().to_lowercase();
        let value = line[split_at + 1..].trim().to_string();
        if key.is_empty() {
            return Err(malformed());
        }

        sections.entry(section.clone()).or_default().insert(key, value);
    }

    Ok(sections)
}
