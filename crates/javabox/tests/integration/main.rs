//! Integration tests for javabox
//!
//! These tests require a JDK with `javac` and `java` on PATH.
//! Run with: cargo test -p javabox --features integration-tests

#![cfg(feature = "integration-tests")]

use std::fs;
use std::path::Path;

use javabox::{Config, Runner};
use tempfile::TempDir;

mod batch_execution;
mod config_loading;
mod interactive_sessions;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Create a test config whose working directories live under `root`
pub(crate) fn test_config(root: &TempDir) -> Config {
    Config {
        work_root: Some(root.path().to_path_buf()),
        ..Config::default()
    }
}

/// Create a runner with a private working root
pub(crate) fn test_runner() -> (Runner, TempDir) {
    let root = tempfile::tempdir().expect("Failed to create working root");
    let runner = Runner::new(test_config(&root));
    (runner, root)
}

/// Number of entries left under a working root
pub(crate) fn leftover_entries(root: &Path) -> usize {
    fs::read_dir(root).expect("Failed to list working root").count()
}

/// Live processes whose command line mentions `root`
pub(crate) fn processes_under(root: &Path) -> Vec<u32> {
    let needle = root.to_string_lossy().into_owned();
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<u32>().ok())
        .filter(|pid| {
            fs::read(format!("/proc/{pid}/cmdline"))
                .is_ok_and(|cmdline| String::from_utf8_lossy(&cmdline).contains(&needle))
        })
        .collect()
}
