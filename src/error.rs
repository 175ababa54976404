use std::fmt;

/// An error that can occur when changing a signal disposition or installing
/// the crash handler
#[derive(Debug)]
pub enum Error {
    /// Unable to `mmap` memory for the alternate signal stack
    OutOfMemory,
    /// The crash handler can only be installed once per process, since the
    /// report path is stored in process-wide state that the handler reads
    /// without synchronization.
    AlreadyInstalled,
    /// The report path was empty or contained an interior NUL byte
    InvalidPath,
    /// The report path did not fit in the statically allocated buffer the
    /// signal handler reads it from
    PathTooLong,
    /// An I/O or other syscall failed
    Io(std::io::Error),
}

impl Error {
    /// The underlying OS error code, if this error came from a failed
    /// syscall.
    #[inline]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(inner) => inner.raw_os_error(),
            _ => None,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("unable to allocate memory"),
            Self::AlreadyInstalled => f.write_str("a crash handler is already installed"),
            Self::InvalidPath => f.write_str("the report path is empty or contains a NUL byte"),
            Self::PathTooLong => f.write_str("the report path is too long"),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
