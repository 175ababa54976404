use std::{io, path::Path};

/// Collects the crash report left behind by a previous run of the process.
///
/// Reads the file at `path`, deletes it, and returns its contents, so a
/// report is surfaced (eg. uploaded or logged) exactly once. Returns
/// `Ok(None)` when no report exists, which is the common case.
pub fn take_pending_report(path: impl AsRef<Path>) -> io::Result<Option<String>> {
    let path = path.as_ref();

    match std::fs::read_to_string(path) {
        Ok(contents) => {
            std::fs::remove_file(path)?;
            Ok(Some(contents))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod test {
    use super::take_pending_report;

    #[test]
    fn consumes_a_pending_report() {
        let path = std::env::temp_dir().join(format!("pending-report-{}", std::process::id()));
        std::fs::write(&path, "Crash due to signal: SIGABRT\n").unwrap();

        let report = take_pending_report(&path).unwrap();
        assert_eq!(report.as_deref(), Some("Crash due to signal: SIGABRT\n"));

        // The report is deleted once collected
        assert!(!path.exists());
        assert!(take_pending_report(&path).unwrap().is_none());
    }

    #[test]
    fn missing_report_is_not_an_error() {
        let path = std::env::temp_dir().join("pending-report-that-does-not-exist");
        assert!(take_pending_report(path).unwrap().is_none());
    }
}
