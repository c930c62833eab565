//! Configuration Unit Tests.
//!
//! Verifies default values, partial JSON deserialization, and the
//! millisecond-to-`Duration` accessors.

use std::time::Duration;

use simrun_core::config::{ChannelConfig, HarnessConfig, SchedulerConfig};

#[test]
fn harness_defaults() {
    let config = HarnessConfig::default();
    assert_eq!(config.run_root.to_string_lossy(), "runs");
    assert_eq!(config.scheduler.parallelism, 1);
    assert!(!config.scheduler.early_exit);
    assert!(!config.scheduler.dry_run);
    assert!(!config.scheduler.verbose);
    assert!(config.scheduler.sweep_process_group);
}

#[test]
fn empty_json_equals_defaults() {
    let config: HarnessConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.run_root.to_string_lossy(), "runs");
    assert_eq!(config.scheduler.parallelism, 1);
    assert_eq!(config.channel.kill_grace_ms, 2000);
}

#[test]
fn partial_scheduler_override() {
    let json = r#"{ "scheduler": { "parallelism": 8, "early_exit": true } }"#;
    let config: HarnessConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.scheduler.parallelism, 8);
    assert!(config.scheduler.early_exit);
    // Untouched fields keep their defaults.
    assert_eq!(config.scheduler.poll_interval_ms, 50);
    assert!(config.scheduler.sweep_process_group);
}

#[test]
fn partial_channel_override() {
    let json = r#"{ "channel": { "io_retry_interval_ms": 1 } }"#;
    let config: HarnessConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.channel.io_retry_interval_ms, 1);
    assert_eq!(config.channel.monitor_interval_ms, 50);
    assert_eq!(config.channel.kill_grace_ms, 2000);
}

#[test]
fn run_root_override() {
    let json = r#"{ "run_root": "work/regress" }"#;
    let config: HarnessConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.run_root.to_string_lossy(), "work/regress");
}

#[test]
fn bound_floors_at_one() {
    let config = SchedulerConfig {
        parallelism: 0,
        ..SchedulerConfig::default()
    };
    assert_eq!(config.bound(), 1);
}

#[test]
fn bound_passes_through() {
    let config = SchedulerConfig {
        parallelism: 16,
        ..SchedulerConfig::default()
    };
    assert_eq!(config.bound(), 16);
}

#[test]
fn scheduler_duration_accessor() {
    let config = SchedulerConfig {
        poll_interval_ms: 120,
        ..SchedulerConfig::default()
    };
    assert_eq!(config.poll_interval(), Duration::from_millis(120));
}

#[test]
fn channel_duration_accessors() {
    let config = ChannelConfig {
        monitor_interval_ms: 7,
        io_retry_interval_ms: 3,
        kill_grace_ms: 900,
    };
    assert_eq!(config.monitor_interval(), Duration::from_millis(7));
    assert_eq!(config.io_retry_interval(), Duration::from_millis(3));
    assert_eq!(config.kill_grace(), Duration::from_millis(900));
}
