use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Which execution driver a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Commands run directly in the host shell (Linux hosts).
    Shell,
    /// Commands run inside a nested VM distribution (Windows hosts).
    Wsl,
    /// Commands run inside a container.
    Docker,
}

impl Default for DriverKind {
    fn default() -> Self {
        if cfg!(windows) {
            DriverKind::Wsl
        } else {
            DriverKind::Shell
        }
    }
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shell" => Ok(DriverKind::Shell),
            "wsl" => Ok(DriverKind::Wsl),
            "docker" => Ok(DriverKind::Docker),
            other => Err(format!(
                "invalid driver kind: {other} (expected \"shell\", \"wsl\" or \"docker\")"
            )),
        }
    }
}

/// Clustering mode of the analysis: classic OTUs or zero-radius OTUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Otu,
    #[default]
    Zotu,
}

impl AnalysisMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisMode::Otu => "otu",
            AnalysisMode::Zotu => "zotu",
        }
    }

    /// Name of the OTU table the analysis writes into its output folder.
    pub fn otu_table_name(self) -> &'static str {
        match self {
            AnalysisMode::Otu => "OTUs-Table.tab",
            AnalysisMode::Zotu => "zOTUs-Table.tab",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "otu" => Ok(AnalysisMode::Otu),
            "zotu" => Ok(AnalysisMode::Zotu),
            other => Err(format!("unknown mode: {other} (expected \"otu\" or \"zotu\")")),
        }
    }
}

/// Reference database the analysis classifies against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineReference {
    /// Built-in 16S rRNA preset.
    Bacteria16S,
    /// Built-in 18S rRNA preset.
    Eukaryote18S,
    /// Path to a custom reference `.fasta` file.
    Custom(String),
}

impl Default for PipelineReference {
    fn default() -> Self {
        PipelineReference::Bacteria16S
    }
}

impl From<&str> for PipelineReference {
    fn from(s: &str) -> Self {
        match s.trim() {
            "16S" => PipelineReference::Bacteria16S,
            "18S" => PipelineReference::Eukaryote18S,
            path => PipelineReference::Custom(path.to_string()),
        }
    }
}

impl fmt::Display for PipelineReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineReference::Bacteria16S => f.write_str("16S"),
            PipelineReference::Eukaryote18S => f.write_str("18S"),
            PipelineReference::Custom(path) => f.write_str(path),
        }
    }
}

impl<'de> Deserialize<'de> for PipelineReference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(PipelineReference::from(raw.as_str()))
    }
}
