use std::time::{Duration, Instant};

use javabox::runner::TIMEOUT_MESSAGE;
use javabox::{BatchRequest, RunLimits};

use super::{fixture_source, leftover_entries, processes_under, test_runner};

fn request(fixture: &str, input: &str) -> BatchRequest {
    BatchRequest {
        code: fixture_source(fixture),
        input: input.to_string(),
    }
}

#[tokio::test]
async fn test_hello() {
    let (runner, root) = test_runner();

    let result = runner.execute(&request("Hello.java", "")).await;

    assert!(result.is_success(), "unexpected failure: {result:?}");
    assert_eq!(result.output, "hello\n");
    assert_eq!(result.error, None);
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_input_is_fed_with_trailing_newline() {
    let (runner, _root) = test_runner();

    let result = runner.execute(&request("Echo.java", "first\nsecond")).await;

    assert!(result.is_success(), "unexpected failure: {result:?}");
    assert_eq!(result.output, "echo: first\necho: second\n");
}

#[tokio::test]
async fn test_scanner_reads_all_input() {
    let (runner, _root) = test_runner();

    let result = runner.execute(&request("Sum.java", "2 40")).await;

    assert!(result.is_success());
    assert_eq!(result.output.trim(), "42");
}

#[tokio::test]
async fn test_no_public_class() {
    let (runner, root) = test_runner();

    let result = runner.execute(&request("NoPublic.java", "")).await;

    assert!(!result.success);
    assert!(result.output.is_empty());
    assert_eq!(result.error.as_deref(), Some("No public class found in code"));
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_compile_error_lists_lines() {
    let (runner, root) = test_runner();

    let result = runner.execute(&request("Broken.java", "")).await;

    assert!(!result.success);
    assert!(result.output.is_empty());
    let error = result.error.expect("Expected compile error");
    assert!(error.starts_with("Compilation errors:\nLine 3:"), "{error}");
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_timeout_kills_program() {
    let (runner, root) = test_runner();
    let limits = RunLimits::unset().with_batch_timeout(1.0);

    // Compile and JVM startup are outside the limit, so measure them first
    let started = Instant::now();
    let warmup = runner.execute(&request("Hello.java", "")).await;
    assert!(warmup.is_success(), "unexpected failure: {warmup:?}");
    let overhead = started.elapsed();

    let started = Instant::now();
    let result = runner
        .execute_with_limits(&request("Forever.java", ""), Some(&limits))
        .await;
    let elapsed = started.elapsed();

    assert!(!result.success);
    assert!(result.output.is_empty());
    assert_eq!(result.error.as_deref(), Some(TIMEOUT_MESSAGE));
    assert!(
        elapsed < overhead + Duration::from_secs(4),
        "took {elapsed:?} with {overhead:?} overhead"
    );
    assert_eq!(processes_under(root.path()), Vec::<u32>::new());
    assert_eq!(leftover_entries(root.path()), 0);
}

#[tokio::test]
async fn test_empty_input_closes_stdin() {
    let (runner, _root) = test_runner();
    let limits = RunLimits::unset().with_batch_timeout(1.0);

    // Echo reads until EOF, so an open stdin would hit the time limit
    let result = runner
        .execute_with_limits(&request("Echo.java", ""), Some(&limits))
        .await;

    assert!(result.is_success(), "unexpected failure: {result:?}");
    assert!(result.output.is_empty());
}

#[tokio::test]
async fn test_input_exhaustion_hint() {
    let (runner, _root) = test_runner();

    let result = runner.execute(&request("Sum.java", "1")).await;

    assert!(!result.success);
    assert!(result.output.contains("NoSuchElementException"));
    let error = result.error.expect("Expected runtime error");
    assert!(error.starts_with(&result.output));
    assert!(error.ends_with(
        "[Hint]: You used Scanner but didn't provide enough input in the Input box."
    ));
}

#[tokio::test]
async fn test_nonzero_exit_merges_streams() {
    let (runner, _root) = test_runner();

    let result = runner.execute(&request("Fail.java", "")).await;

    assert!(!result.success);
    assert_eq!(result.output, "before failure\nsomething went wrong\n");
    assert_eq!(result.error.as_deref(), Some(result.output.as_str()));
}

#[tokio::test]
async fn test_stdout_and_stderr_keep_write_order() {
    let (runner, _root) = test_runner();

    let result = runner.execute(&request("Interleave.java", "")).await;

    assert!(result.is_success(), "unexpected failure: {result:?}");
    let expected: String = (0..500).map(|i| format!("o{i} e{i} ")).collect();
    assert_eq!(result.output, expected);
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let (runner, root) = test_runner();

    let first = request("Echo.java", "one");
    let second = request("Echo.java", "two");
    let (a, b) = tokio::join!(runner.execute(&first), runner.execute(&second));

    assert_eq!(a.output, "echo: one\n");
    assert_eq!(b.output, "echo: two\n");
    assert_eq!(leftover_entries(root.path()), 0);
}
