// tests/process_output.rs

#![cfg(unix)]

mod common;
use crate::common::init_tracing;

use std::time::Duration;

use ngspipe::driver::{DirectShell, ExecutionDriver};
use ngspipe::exec::{ProcessHandle, Source};

#[tokio::test]
async fn driver_output_keeps_line_boundaries() {
    init_tracing();
    let shell = DirectShell::new();
    let (result, output) = shell.run_captured("printf 'a\\nb'").await.unwrap();

    assert!(result.success());
    assert_eq!(output.contents(), vec!["a\n", "b"]);
    assert_eq!(shell.last_output().unwrap().contents(), vec!["a\n", "b"]);
}

#[tokio::test]
async fn exit_code_is_kept_by_the_driver() {
    let shell = DirectShell::new();
    let result = shell.run_logged("exit 123").await.unwrap();

    assert_eq!(result.exit_code, Some(123));
    assert!(!result.success());
    assert_eq!(shell.last_result().exit_code, Some(123));
    assert_eq!(shell.run_count(), 1);
}

#[tokio::test]
async fn both_streams_are_collected() {
    let shell = DirectShell::new();
    let (_, output) = shell.run_captured("echo out; echo err >&2").await.unwrap();

    assert_eq!(output.stdout().contents(), vec!["out\n"]);
    assert_eq!(output.stderr().contents(), vec!["err\n"]);
    assert!(output.iter().any(|l| l.source() == Source::Stderr));
}

#[tokio::test]
async fn polling_never_blocks_and_is_empty_after_drain() {
    let mut handle = ProcessHandle::new("sh", ["-c", "echo one; echo two"]);
    handle.start().unwrap();
    handle.follow(Duration::from_millis(10)).await.unwrap();

    // `follow` consumed everything through the handle's own cursor.
    assert!(handle.read_available().is_empty());
    assert!(handle.read_available().is_empty());

    // A fresh cursor still sees the whole log.
    let mut cursor = handle.cursor();
    assert_eq!(cursor.next_batch().len(), 2);
    assert!(cursor.next_batch().is_empty());
}

#[tokio::test]
async fn long_output_does_not_deadlock() {
    let shell = DirectShell::new();
    let (result, output) = shell
        .run_captured("i=0; while [ $i -lt 5000 ]; do echo line $i; echo err $i >&2; i=$((i+1)); done")
        .await
        .unwrap();
    assert!(result.success());
    assert_eq!(output.stdout().len(), 5000);
    assert_eq!(output.stderr().len(), 5000);

    let expected_out: Vec<String> = (0..5000).map(|i| format!("line {i}\n")).collect();
    let expected_err: Vec<String> = (0..5000).map(|i| format!("err {i}\n")).collect();
    assert_eq!(output.stdout().contents(), expected_out);
    assert_eq!(output.stderr().contents(), expected_err);
}
