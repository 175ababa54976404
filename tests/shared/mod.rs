#![allow(dead_code)]

pub use sadness_generator::SadnessFlavor;

use std::{os::unix::process::ExitStatusExt, path::PathBuf, process::Command};

/// Set in the re-executed child so the test function takes the crashing
/// branch instead of spawning another child
const CHILD_VAR: &str = "CRASH_REPORT_TEST_CHILD";
/// Tells the child where the parent expects the report to be written
const PATH_VAR: &str = "CRASH_REPORT_TEST_PATH";

/// Runs `test_name` again in a child process which installs the crash
/// handler and then runs `raiser`. Asserts the child was killed by `signum`
/// and that the report names `expected`, then returns the full report text
/// for scenario-specific assertions.
///
/// The handler terminates the process it runs in, so unlike an in-process
/// longjmp-style harness the crash has to happen in a child. Adapted from
/// <https://github.com/rust-lang/cargo/blob/485670b3983b52289a2f353d589c57fae2f60f82/tests/testsuite/support/mod.rs#L507>
/// style self-re-execution: the child is this same test binary, filtered
/// down to the one test with `--exact`.
pub fn expect_report(test_name: &str, signum: i32, expected: &str, raiser: impl FnOnce()) -> String {
    if let Some(path) = child_report_path() {
        crash_report::install_crash_handler(path).expect("failed to install crash handler");
        raiser();
        unreachable!("the raised signal should have terminated the process");
    }

    let (status, report) = run_child(test_name);

    assert_eq!(status.signal(), Some(signum), "unexpected exit: {status:?}");

    let report = report.expect("no crash report was written");
    let mut lines = report.lines().filter(|line| !line.is_empty());

    assert_eq!(
        lines.next().unwrap(),
        format!("Crash due to signal: {expected}")
    );
    assert!(lines
        .next()
        .unwrap()
        .starts_with("Current thread name: "));

    // bionic and musl have no execinfo, so only expect frames elsewhere
    #[cfg(not(any(target_env = "musl", target_os = "android")))]
    assert!(lines.next().is_some(), "expected backtrace frames:\n{report}");

    report
}

/// Like [`expect_report`], but the child never installs the handler: the
/// process must die through the default disposition and no report file may
/// appear.
pub fn expect_no_report(test_name: &str, signum: i32, raiser: impl FnOnce()) {
    if child_report_path().is_some() {
        raiser();
        unreachable!("the raised signal should have terminated the process");
    }

    let (status, report) = run_child(test_name);

    assert_eq!(status.signal(), Some(signum), "unexpected exit: {status:?}");
    assert!(report.is_none(), "a report was written with no handler installed");
}

fn child_report_path() -> Option<PathBuf> {
    std::env::var_os(CHILD_VAR)?;
    Some(std::env::var_os(PATH_VAR).expect("child is missing the report path").into())
}

fn run_child(test_name: &str) -> (std::process::ExitStatus, Option<String>) {
    let exe = std::env::current_exe().expect("failed to get test exe path");

    let report_path = std::env::temp_dir().join(format!(
        "crash-report-{test_name}-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&report_path);

    let output = Command::new(exe)
        .args([test_name, "--exact", "--nocapture"])
        .env(CHILD_VAR, "1")
        .env(PATH_VAR, &report_path)
        .output()
        .expect("failed to run child test process");

    let report = crash_report::take_pending_report(&report_path)
        .expect("failed to collect the child's report");

    (output.status, report)
}
