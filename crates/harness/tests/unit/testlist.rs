//! Testlist Unit Tests.
//!
//! Verifies JSON loading, descriptor defaults, and the error paths for
//! missing or malformed files.

use std::fs;

use pretty_assertions::assert_eq;

use simrun_core::error::HarnessError;
use simrun_core::testlist::Testlist;

use crate::common::builders::DescriptorBuilder;
use crate::common::harness::TestContext;

#[test]
fn load_minimal_list() {
    let ctx = TestContext::new();
    let path = ctx.path().join("smoke.json");
    fs::write(
        &path,
        r#"{ "runs": [ { "elf": "sw/build/alive.elf" } ] }"#,
    )
    .unwrap();

    let list = Testlist::load(&path).unwrap();
    assert_eq!(list.runs.len(), 1);
    assert_eq!(list.runs[0].elf.to_string_lossy(), "sw/build/alive.elf");
    assert!(list.runs[0].name.is_none());
    assert!(list.runs[0].cmd.is_none());
}

#[test]
fn load_full_descriptor() {
    let ctx = TestContext::new();
    let path = ctx.path().join("full.json");
    fs::write(
        &path,
        r#"{
            "runs": [
                {
                    "elf": "sw/build/dma.elf",
                    "name": "dma_verify",
                    "retcode": 3,
                    "cmd": ["./verify.sh", "{elf}", "{run_dir}"],
                    "simulators": ["questa", "vcs"],
                    "run_dir": "work/dma"
                }
            ]
        }"#,
    )
    .unwrap();

    let list = Testlist::load(&path).unwrap();
    let test = &list.runs[0];
    assert_eq!(test.display_name(), "dma_verify");
    assert_eq!(test.expected_retcode(), 3);
    assert_eq!(test.cmd.as_ref().unwrap().len(), 3);
    assert_eq!(test.simulators.as_ref().unwrap().len(), 2);
    assert_eq!(test.run_dir.as_ref().unwrap().to_string_lossy(), "work/dma");
}

#[test]
fn load_preserves_order() {
    let ctx = TestContext::new();
    let path = ctx.path().join("ordered.json");
    fs::write(
        &path,
        r#"{ "runs": [ { "elf": "a.elf" }, { "elf": "b.elf" }, { "elf": "c.elf" } ] }"#,
    )
    .unwrap();

    let list = Testlist::load(&path).unwrap();
    let names: Vec<String> = list.runs.iter().map(|t| t.display_name()).collect();
    assert_eq!(names, ["a", "b", "c"]);
}

#[test]
fn missing_file_is_io_error() {
    let ctx = TestContext::new();
    let err = Testlist::load(&ctx.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, HarnessError::Testlist { .. }), "{err}");
}

#[test]
fn malformed_json_is_parse_error() {
    let ctx = TestContext::new();
    let path = ctx.path().join("broken.json");
    fs::write(&path, r#"{ "runs": [ { "elf" } ] }"#).unwrap();
    let err = Testlist::load(&path).unwrap_err();
    assert!(matches!(err, HarnessError::TestlistParse { .. }), "{err}");
}

#[test]
fn descriptor_without_elf_is_parse_error() {
    let ctx = TestContext::new();
    let path = ctx.path().join("noelf.json");
    fs::write(&path, r#"{ "runs": [ { "name": "nameless" } ] }"#).unwrap();
    let err = Testlist::load(&path).unwrap_err();
    assert!(matches!(err, HarnessError::TestlistParse { .. }), "{err}");
}

#[test]
fn parse_error_names_the_file() {
    let ctx = TestContext::new();
    let path = ctx.path().join("named.json");
    fs::write(&path, "not json").unwrap();
    let err = Testlist::load(&path).unwrap_err();
    assert!(err.to_string().contains("named.json"), "{err}");
}

#[test]
fn display_name_prefers_explicit_name() {
    let test = DescriptorBuilder::new("sw/build/alive.elf")
        .name("smoke_alive")
        .build();
    assert_eq!(test.display_name(), "smoke_alive");
}

#[test]
fn display_name_falls_back_to_file_stem() {
    let test = DescriptorBuilder::new("sw/build/multi_cluster.elf").build();
    assert_eq!(test.display_name(), "multi_cluster");
}

#[test]
fn expected_retcode_defaults_to_zero() {
    let test = DescriptorBuilder::new("a.elf").build();
    assert_eq!(test.expected_retcode(), 0);
    let test = DescriptorBuilder::new("a.elf").retcode(7).build();
    assert_eq!(test.expected_retcode(), 7);
}
