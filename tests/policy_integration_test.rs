// Integration tests for update policies
//
// These tests verify update decisions across all policy types with
// real-world version scenarios.

use slipstream::policy::{Options, Policy};

fn should_update(policy: &str, current: &str, candidate: &str) -> bool {
    Policy::parse(policy, &Options::default())
        .should_update(current, candidate)
        .unwrap_or(false)
}

#[test]
fn test_patch_policy_integration() {
    assert!(should_update("patch", "1.2.3", "1.2.4"));
    assert!(should_update("patch", "v1.2.3", "v1.2.4"));

    // minor and major bumps stay put
    assert!(!should_update("patch", "1.2.3", "1.3.0"));
    assert!(!should_update("patch", "1.2.3", "2.0.0"));

    // same version and downgrades
    assert!(!should_update("patch", "1.2.3", "1.2.3"));
    assert!(!should_update("patch", "1.2.4", "1.2.3"));
}

#[test]
fn test_minor_policy_integration() {
    assert!(should_update("minor", "1.2.3", "1.3.0"));
    assert!(should_update("minor", "1.2.3", "1.2.4"));

    assert!(!should_update("minor", "1.2.3", "2.0.0"));
    assert!(!should_update("minor", "1.3.0", "1.3.0"));
}

#[test]
fn test_major_policy_integration() {
    assert!(should_update("major", "1.2.3", "2.0.0"));
    assert!(should_update("major", "1.2.3", "1.3.0"));
    assert!(should_update("major", "1.2.3", "1.2.4"));

    assert!(!should_update("major", "2.0.0", "2.0.0"));
    assert!(!should_update("major", "2.0.0", "1.9.9"));
}

#[test]
fn test_all_policy_integration() {
    assert!(should_update("all", "1.2.3", "1.2.4"));
    assert!(should_update("all", "1.2.3", "2.0.0"));
    // all is pure ordering, pre-releases included
    assert!(should_update("all", "1.2.3", "1.2.4-rc.1"));

    assert!(!should_update("all", "1.2.4", "1.2.3"));
}

#[test]
fn test_pre_release_channels() {
    // scoped policies keep pre-release channels separate
    assert!(!should_update("minor", "1.4.5", "1.4.6-alpha"));
    assert!(should_update("minor", "1.4.5-alpha", "1.4.6-alpha"));
    assert!(!should_update("patch", "1.4.5-alpha", "1.4.6-beta"));
}

#[test]
fn test_latest_baseline() {
    // moving off the latest tag accepts any valid version
    assert!(should_update("patch", "latest", "1.0.0"));
    assert!(should_update("all", "latest", "0.0.1"));
}

#[test]
fn test_two_part_versions() {
    assert!(should_update("minor", "1.2", "1.3"));
    assert!(should_update("patch", "1.2", "1.2.1"));
    assert!(!should_update("minor", "1.3", "1.3.0"));
}

#[test]
fn test_force_policy_integration() {
    assert!(should_update("force", "1.2.3", "whatever"));
    assert!(should_update("force", "latest", "latest"));
}

#[test]
fn test_never_policy_integration() {
    assert!(!should_update("never", "1.0.0", "99.0.0"));
    assert!(!should_update("", "1.0.0", "99.0.0"));
    // unknown declarations fall back to never
    assert!(!should_update("weekly", "1.0.0", "99.0.0"));
}

#[test]
fn test_glob_policy_integration() {
    assert!(should_update("glob:build-*", "build-1", "build-2"));
    assert!(!should_update("glob:build-*", "build-2", "build-1"));
    assert!(!should_update("glob:build-*", "build-1", "release-2"));
}

#[test]
fn test_regexp_policy_integration() {
    assert!(should_update("regexp:^main-[0-9a-f]+$", "main-aaa", "main-fff"));
    assert!(!should_update("regexp:^main-[0-9a-f]+$", "main-aaa", "dev-fff"));
}

#[test]
fn test_filter_ranks_candidates() {
    let policy = Policy::parse("all", &Options::default());
    let tags: Vec<String> = ["0.9.0", "1.2.0", "latest", "1.10.0", "1.3.0-rc.1"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let ranked = policy.filter(&tags);
    assert_eq!(ranked.first().map(String::as_str), Some("1.10.0"));
    // non-semver tags are dropped entirely
    assert!(!ranked.contains(&"latest".to_string()));
}
