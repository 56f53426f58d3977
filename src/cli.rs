// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `ngspipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ngspipe",
    version,
    about = "Run amplicon analyses of Illumina reads inside a toolkit environment.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the run file (TOML).
    ///
    /// Default: `Ngspipe.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value = "Ngspipe.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NGSPIPE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check the environment, then run the whole analysis.
    Run {
        /// Print the planned steps and settings without executing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Only check that the configured environment is usable.
    Check,

    /// Write the analysis settings file the run would use.
    Settings {
        /// Destination file.
        out: PathBuf,
    },

    /// Manage distributions of the host tool.
    #[command(subcommand)]
    Distro(DistroCommand),
}

#[derive(Debug, Clone, Subcommand)]
pub enum DistroCommand {
    /// List registered distributions.
    List,

    /// Register a distribution from a root filesystem tarball.
    Import {
        name: String,
        tar: PathBuf,
        /// Install folder; defaults to `./<name>`.
        #[arg(long)]
        location: Option<PathBuf>,
        /// Replace an existing distribution of the same name.
        #[arg(long)]
        force: bool,
        /// VM generation to register the distribution as.
        #[arg(long = "vm-version", value_name = "N")]
        vm_version: Option<u8>,
    },

    /// Export a registered distribution to a tarball.
    Export { name: String, path: PathBuf },

    /// Remove a registered distribution and its disk.
    Unregister { name: String },

    /// Build a distribution from a Dockerfile and register it.
    Build {
        dockerfile: PathBuf,
        name: String,
        /// Build context; defaults to the Dockerfile's folder.
        #[arg(long)]
        context: Option<PathBuf>,
        /// Install folder; defaults to `./<name>`.
        #[arg(long)]
        location: Option<PathBuf>,
        /// `KEY=VALUE` passed to the image build.
        #[arg(long = "build-arg", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        build_args: Vec<(String, String)>,
        /// Stop after writing the tarball.
        #[arg(long)]
        tar_only: bool,
        #[arg(long)]
        force: bool,
        #[arg(long = "vm-version", value_name = "N", default_value_t = 2)]
        vm_version: u8,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((key.to_string(), value.to_string()))
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
