#![cfg(unix)]

mod shared;

#[test]
fn writes_report_on_bus_error() {
    // Raised directly rather than via a real unaligned/truncated mapping;
    // the handler path is identical for a queued signal
    shared::expect_report("writes_report_on_bus_error", libc::SIGBUS, "SIGBUS", || unsafe {
        libc::raise(libc::SIGBUS);
    });
}
