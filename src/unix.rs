mod state;

use crate::Error;
use std::path::Path;

/// The signals this crate knows by name
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum Signal {
    Abort = libc::SIGABRT,
    Bus = libc::SIGBUS,
    Illegal = libc::SIGILL,
    Pipe = libc::SIGPIPE,
    Segv = libc::SIGSEGV,
}

impl Signal {
    /// Maps a raw signal number back to a [`Signal`], if it is one we name.
    #[inline]
    pub fn from_raw(signum: i32) -> Option<Self> {
        Some(match signum {
            libc::SIGABRT => Self::Abort,
            libc::SIGBUS => Self::Bus,
            libc::SIGILL => Self::Illegal,
            libc::SIGPIPE => Self::Pipe,
            libc::SIGSEGV => Self::Segv,
            _ => return None,
        })
    }

    /// The literal name written into a crash report.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Abort => "SIGABRT",
            Self::Bus => "SIGBUS",
            Self::Illegal => "SIGILL",
            Self::Pipe => "SIGPIPE",
            Self::Segv => "SIGSEGV",
        }
    }
}

/// Changes the process-wide disposition for `SIGPIPE` to ignore.
///
/// Without this, a write on a socket or pipe whose other end has gone away
/// terminates the whole process; with it, the write fails with `EPIPE` like
/// any other I/O error. Call once at startup, before any network I/O.
/// Idempotent, and failure is reasonable to treat as non-fatal since the
/// only consequence is keeping the default termination behavior.
pub fn suppress_sigpipe() -> Result<(), Error> {
    // SAFETY: syscall
    unsafe {
        if libc::signal(libc::SIGPIPE, libc::SIG_IGN) == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error().into());
        }
    }

    Ok(())
}

/// Installs a shared handler for `SIGSEGV`, `SIGILL`, `SIGBUS` and `SIGABRT`
/// that writes a crash report to `path` before the process terminates.
///
/// `path` is copied into statically allocated storage before any handler is
/// installed, so the handler never allocates; it must fit in 1023 bytes and
/// contain no interior NUL. The file is created with mode `0o700` and
/// truncated on each crash. Collect a report from an earlier run with
/// [`crate::take_pending_report`] before calling this.
///
/// Installation is best-effort: if registering one of the four handlers
/// fails, the first OS error is returned and any handlers already installed
/// stay installed. There is no way to uninstall; the path storage and the
/// handlers live for the remainder of the process.
pub fn install_crash_handler(path: impl AsRef<Path>) -> Result<(), Error> {
    state::install(path.as_ref())
}
