// tests/config_errors.rs

mod common;
use crate::common::run_file;

use ngspipe::config::load_and_validate;
use ngspipe::errors::NgspipeError;
use ngspipe::types::{AnalysisMode, DriverKind};

#[test]
fn complete_run_file_loads() {
    let file = run_file(
        r#"
[driver]
kind = "wsl"
distribution = "ngstoolkitdist"
user = "root"
min_version = "2"

[run]
working_dir = 'C:\runs\r1'
mapping_file = 'C:\runs\r1\mapping.tab'
spikes = true

[analysis]
mode = "otu"
pipeline_reference = "18S"
maxdiffpct = 5
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.driver.kind, DriverKind::Wsl);
    assert_eq!(cfg.driver.user.as_deref(), Some("root"));
    assert!(cfg.run.spikes);
    assert_eq!(cfg.analysis.mode, AnalysisMode::Otu);
    assert_eq!(cfg.analysis.maxdiffpct, 5);
}

#[test]
fn missing_run_section_is_a_toml_error() {
    let file = run_file("[driver]\nkind = \"shell\"\n");
    assert!(matches!(load_and_validate(file.path()), Err(NgspipeError::TomlError(_))));
}

#[test]
fn unknown_analysis_key_is_a_toml_error() {
    let file = run_file("[run]\nworking_dir = '/r'\n[analysis]\nminmergelength = 3\n");
    assert!(matches!(load_and_validate(file.path()), Err(NgspipeError::TomlError(_))));
}

#[test]
fn inverted_merge_lengths_are_a_config_error() {
    let file = run_file("[run]\nworking_dir = '/r'\n[analysis]\nminmergelen = 700\nmaxmergelen = 600\n");
    match load_and_validate(file.path()) {
        Err(NgspipeError::ConfigError(msg)) => assert!(msg.contains("minmergelen")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(matches!(
        load_and_validate("/definitely/not/here/Ngspipe.toml"),
        Err(NgspipeError::IoError(_))
    ));
}
