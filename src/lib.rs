//! Installs handlers for fatal Unix signals that write a small textual crash
//! report to a preconfigured file before letting the process die, along with
//! a helper to stop `SIGPIPE` from terminating the process at all.
//!
//! The handled signals are
//!
//! ## `SIGSEGV`
//!
//! Signal sent to a process when it makes an invalid virtual memory reference,
//! a [segmentation fault](https://en.wikipedia.org/wiki/Segmentation_fault).
//! This covers infamous `null` pointer access, out of bounds access, use after
//! free, stack overflows, etc.
//!
//! ## `SIGILL`
//!
//! Signal sent to a process when it attempts to execute an **illegal**,
//! malformed, unknown, or privileged, instruction.
//!
//! ## `SIGBUS`
//!
//! Signal sent to a process when it causes a [bus error](https://en.wikipedia.org/wiki/Bus_error).
//!
//! ## `SIGABRT`
//!
//! Signal sent to a process to tell it to abort, i.e. to terminate. The signal
//! is usually initiated by the process itself when it calls
//! `std::process::abort` or `libc::abort`, but it can be sent to the process
//! from outside like any other signal.
//!
//! `SIGPIPE` is never handled, only ignored: [`suppress_sigpipe`] switches
//! its disposition to `SIG_IGN` so writes on closed sockets and pipes surface
//! as `EPIPE` instead of killing the process.
//!
//! The report written by the handler is plain text:
//!
//! ```text
//! Crash due to signal: SIGSEGV
//!
//! Current thread name: worker-1
//!
//! <raw backtrace symbol lines>
//! ```
//!
//! After writing the report the handler restores the default disposition for
//! the delivered signal and re-raises it, so the exit status and core dump
//! behavior seen by supervising tools is the one the kernel would have
//! produced without us in the way. A previous run's report can be collected
//! at the next startup with [`take_pending_report`].

#![allow(unsafe_code)]

mod error;
mod report;

pub use error::Error;
pub use report::take_pending_report;

#[cfg(feature = "debug-print")]
#[macro_export]
macro_rules! debug_print {
    ($s:literal) => {
        let cstr = concat!($s, "\n");
        $crate::write_stderr(cstr);
    };
}

#[cfg(not(feature = "debug-print"))]
#[macro_export]
macro_rules! debug_print {
    ($s:literal) => {};
}

/// Writes the specified string directly to stderr.
///
/// This is safe to be called from within a compromised context.
#[inline]
pub fn write_stderr(s: &'static str) {
    unsafe {
        #[cfg(target_os = "windows")]
        libc::write(2, s.as_ptr().cast(), s.len() as u32);

        #[cfg(not(target_os = "windows"))]
        libc::write(2, s.as_ptr().cast(), s.len());
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;

        pub use unix::{install_crash_handler, suppress_sigpipe, Signal};
    }
}
