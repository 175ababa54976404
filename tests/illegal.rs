#![cfg(unix)]

mod shared;

#[test]
fn writes_report_on_illegal_instruction() {
    shared::expect_report(
        "writes_report_on_illegal_instruction",
        libc::SIGILL,
        "SIGILL",
        || unsafe {
            shared::SadnessFlavor::Illegal.make_sad();
        },
    );
}
