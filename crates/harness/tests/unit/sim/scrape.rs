//! Log Scraping Unit Tests.
//!
//! Covers the sentinel and timing-line parsers and the verdict rules of the
//! log-scraping backend family, including the external-verification and
//! simulator-crash cases.

use std::time::Duration;

use rstest::rstest;

use simrun_core::error::FailReason;
use simrun_core::sim::TimeFormat;
use simrun_core::sim::simulation::{
    parse_cpu_seconds, parse_elapsed_seconds, parse_sentinel, parse_time_ns,
};

use crate::common::harness::{TestContext, wait_completed};

fn close(value: f64, expected: f64) -> bool {
    (value - expected).abs() < 1e-6
}

#[rstest]
#[case::plain_success("[SUCCESS]", 0)]
#[case::embedded_success("UVM_INFO @ 1200ns [SUCCESS] test passed", 0)]
#[case::failure_code("[FAILURE] watchdog fired, exit code 7", 7)]
#[case::failure_negative("[FAILURE] exit code -1", -1)]
#[case::failure_trailing("[FAILURE] exit code 12 (see log)", 12)]
fn sentinel_resolves(#[case] line: &str, #[case] expected: i32) {
    assert_eq!(parse_sentinel(line), Some(expected));
}

#[rstest]
#[case::no_markers("all quiet on the scoreboard")]
#[case::failure_without_code("[FAILURE] no code reported")]
#[case::failure_bad_code("[FAILURE] exit code banana")]
fn sentinel_rejects(#[case] line: &str) {
    assert_eq!(parse_sentinel(line), None);
}

#[rstest]
#[case::nanoseconds("Time: 100 ns", 100.0)]
#[case::picoseconds("Time: 2500 ps", 2.5)]
#[case::microseconds("Time: 3 us", 3000.0)]
#[case::embedded("# Time: 42 ns  Iteration: 0", 42.0)]
fn time_line_scales_to_nanoseconds(#[case] line: &str, #[case] expected: f64) {
    let value = parse_time_ns(line).unwrap();
    assert!(close(value, expected), "{line} -> {value}");
}

#[rstest]
#[case::seconds_unit("Time: 5 s")]
#[case::cpu_line_is_not_sim_time("CPU Time: 12.4 seconds")]
#[case::missing_unit("Time: 77")]
#[case::no_marker("nothing here")]
fn time_line_rejects(#[case] line: &str) {
    assert_eq!(parse_time_ns(line), None);
}

#[rstest]
#[case::minutes("Elapsed time: 0:1:30", 90.0)]
#[case::hours("Elapsed time: 2:0:0", 7200.0)]
#[case::mixed("Elapsed time: 1:1:1", 3661.0)]
fn elapsed_clock_converts_to_seconds(#[case] line: &str, #[case] expected: f64) {
    let value = parse_elapsed_seconds(line).unwrap();
    assert!(close(value, expected), "{line} -> {value}");
}

#[rstest]
#[case::too_many_fields("Elapsed time: 1:2:3:4")]
#[case::not_a_clock("Elapsed time: soon")]
#[case::no_marker("Time: 100 ns")]
fn elapsed_clock_rejects(#[case] line: &str) {
    assert_eq!(parse_elapsed_seconds(line), None);
}

#[rstest]
#[case::fractional("CPU Time: 12.400 seconds", 12.4)]
#[case::integer("CPU Time: 3 seconds", 3.0)]
fn cpu_time_converts_to_seconds(#[case] line: &str, #[case] expected: f64) {
    let value = parse_cpu_seconds(line).unwrap();
    assert!(close(value, expected), "{line} -> {value}");
}

#[rstest]
#[case::not_numeric("CPU Time: fast seconds")]
#[case::no_marker("Elapsed time: 0:0:1")]
fn cpu_time_rejects(#[case] line: &str) {
    assert_eq!(parse_cpu_seconds(line), None);
}

#[test]
fn success_sentinel_with_clean_exit_passes() {
    let ctx = TestContext::new();
    let sim = ctx.run_scrape("scrape-ok", "echo '[SUCCESS]'; exit 0", 0);
    assert_eq!(sim.retcode(), Some(0));
    assert!(sim.successful());
}

#[test]
fn failure_sentinel_carries_the_application_code() {
    let ctx = TestContext::new();
    let sim = ctx.run_scrape(
        "scrape-seven",
        "echo '[FAILURE] tb timeout, exit code 7'; exit 0",
        7,
    );
    assert_eq!(sim.retcode(), Some(7));
    assert!(sim.successful());
}

#[test]
fn failure_sentinel_against_wrong_expectation_fails() {
    let ctx = TestContext::new();
    let sim = ctx.run_scrape(
        "scrape-wrong",
        "echo '[FAILURE] tb timeout, exit code 7'; exit 0",
        0,
    );
    assert!(!sim.successful());
    assert_eq!(
        sim.failure_reason(),
        FailReason::Retcode {
            got: Some(7),
            expected: 0,
        }
    );
}

#[test]
fn missing_sentinel_yields_no_retcode() {
    let ctx = TestContext::new();
    let sim = ctx.run_scrape("scrape-silent", "echo 'no verdict here'; exit 0", 0);
    assert_eq!(sim.retcode(), None);
    assert!(!sim.successful());
    assert_eq!(
        sim.failure_reason(),
        FailReason::Retcode {
            got: None,
            expected: 0,
        }
    );
}

#[test]
fn first_sentinel_wins() {
    let ctx = TestContext::new();
    let sim = ctx.run_scrape(
        "scrape-first",
        "echo '[FAILURE] exit code 5'; echo '[SUCCESS]'; exit 0",
        5,
    );
    assert_eq!(sim.retcode(), Some(5));
    assert!(sim.successful());
}

#[test]
fn simulator_crash_overrides_the_sentinel() {
    let ctx = TestContext::new();
    let sim = ctx.run_scrape("scrape-crash", "echo '[SUCCESS]'; exit 2", 0);
    assert_eq!(sim.retcode(), Some(2));
    assert!(!sim.successful());
}

#[test]
fn crash_with_matching_code_reports_the_simulator_exit() {
    let ctx = TestContext::new();
    // The override makes the resolved code match the expectation, but a
    // crashed simulator is still a failure; the reason says why.
    let sim = ctx.run_scrape("scrape-crash-match", "echo '[SUCCESS]'; exit 2", 2);
    assert!(!sim.successful());
    assert_eq!(sim.failure_reason(), FailReason::SimulatorExit { status: 2 });
}

#[test]
fn external_verification_trusts_the_process_exit() {
    let ctx = TestContext::new();
    let mut sim = ctx
        .scrape_sim(
            "external-ok",
            "echo '[FAILURE] ignored, exit code 9'; exit 0",
            0,
        )
        .with_external_verification();
    sim.launch(false).unwrap();
    assert!(wait_completed(&mut sim, Duration::from_secs(5)));
    assert_eq!(sim.retcode(), Some(0));
    assert!(sim.successful());
}

#[test]
fn external_verification_accepts_nonzero_expectations() {
    let ctx = TestContext::new();
    let mut sim = ctx
        .scrape_sim("external-four", "echo '[SUCCESS]'; exit 4", 4)
        .with_external_verification();
    sim.launch(false).unwrap();
    assert!(wait_completed(&mut sim, Duration::from_secs(5)));
    assert_eq!(sim.retcode(), Some(4));
    assert!(sim.successful());
}

#[test]
fn last_time_line_in_the_log_wins() {
    let ctx = TestContext::new();
    let body = "echo 'Time: 100 ns'; echo 'Time: 2 us'; echo 'CPU Time: 12.500 seconds'; echo '[SUCCESS]'; exit 0";
    let mut sim = ctx
        .scrape_sim("vcs-times", body, 0)
        .with_time_format(TimeFormat::Vcs);
    sim.launch(false).unwrap();
    assert!(wait_completed(&mut sim, Duration::from_secs(5)));
    assert!(close(sim.simulation_time().unwrap(), 2000.0));
    assert!(close(sim.cpu_time().unwrap(), 12.5));
}

#[test]
fn questa_cpu_time_comes_from_the_elapsed_line() {
    let ctx = TestContext::new();
    let body = "echo 'Time: 900 ps'; echo 'Elapsed time: 0:2:5'; echo '[SUCCESS]'; exit 0";
    let mut sim = ctx
        .scrape_sim("questa-times", body, 0)
        .with_time_format(TimeFormat::Questa);
    sim.launch(false).unwrap();
    assert!(wait_completed(&mut sim, Duration::from_secs(5)));
    assert!(close(sim.simulation_time().unwrap(), 0.9));
    assert!(close(sim.cpu_time().unwrap(), 125.0));
}

#[test]
fn timing_is_not_scraped_without_a_format() {
    let ctx = TestContext::new();
    let sim = ctx.run_script("no-format", "echo 'Time: 5 ns'; exit 0", 0);
    assert_eq!(sim.simulation_time(), None);
    assert_eq!(sim.cpu_time(), None);
}
