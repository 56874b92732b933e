use javabox::Config;

use super::FIXTURES_PATH;

#[test]
fn test_load_valid_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_full.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.temp_prefix, "jb-test-");
    assert_eq!(config.max_concurrent_runs, 4);
    assert_eq!(config.toolchain.run_args, vec!["-Xmx128m", "-Xss8m"]);
    assert_eq!(config.limits.batch_timeout, Some(3.0));
    assert_eq!(config.limits.output_chunk_size(), 512);
}

#[test]
fn test_load_minimal_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.max_concurrent_runs, 2);
    assert_eq!(config.toolchain.javac, "javac");
    assert_eq!(config.limits.batch_timeout(), std::time::Duration::from_secs(5));
}

#[test]
fn test_load_invalid_zero_workers() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_zero_workers.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_empty_java() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_empty_java.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_negative_timeout() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_negative_timeout.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_missing_file() {
    let path = format!("{FIXTURES_PATH}/configs/does_not_exist.toml");
    assert!(matches!(
        Config::from_file(&path),
        Err(javabox::ConfigError::ReadFile { .. })
    ));
}
