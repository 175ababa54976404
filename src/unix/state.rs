use super::Signal;
use crate::Error;
use std::{mem, path::Path, ptr};

// std::cmp::max is not const :(
const fn get_stack_size() -> usize {
    if libc::SIGSTKSZ > 16 * 1024 {
        libc::SIGSTKSZ
    } else {
        16 * 1024
    }
}

/// The size of the alternate stack that is mapped for the installing thread.
///
/// This has a minimum size of 16k, which might seem a bit large, but this
/// memory will only ever be committed in case we actually get a stack overflow,
/// which is (hopefully) exceedingly rare
const SIG_STACK_SIZE: usize = get_stack_size();

/// Room for the report path plus its NUL terminator
const MAX_PATH_LEN: usize = 1024;

/// The most stack frames a report will ever contain; deeper stacks are
/// silently truncated
const MAX_FRAMES: usize = 128;

/// Fixed buffer for the reporting thread's name, matching the 64 byte cap
/// the pthread APIs use
const THREAD_NAME_LEN: usize = 64;

/// Where the handler writes its report. Written exactly once, under
/// [`INSTALLED`], before any handler that reads it exists; the handler then
/// reads it with no synchronization, which is the only access pattern that
/// is legal in signal context.
static mut REPORT_PATH: [u8; MAX_PATH_LEN] = [0; MAX_PATH_LEN];

static INSTALLED: parking_lot::Mutex<bool> = parking_lot::const_mutex(false);

/// The signals we write a report for
const FATAL_SIGNALS: [Signal; 4] = [Signal::Abort, Signal::Bus, Signal::Illegal, Signal::Segv];

pub(super) fn install(path: &Path) -> Result<(), Error> {
    use std::os::unix::ffi::OsStrExt;

    let mut installed = INSTALLED.lock();

    if *installed {
        return Err(Error::AlreadyInstalled);
    }

    let bytes = path.as_os_str().as_bytes();
    if bytes.is_empty() || bytes.contains(&0) {
        return Err(Error::InvalidPath);
    }
    // One byte is reserved for the NUL terminator
    if bytes.len() >= MAX_PATH_LEN {
        return Err(Error::PathTooLong);
    }

    // The path buffer is write-once for the life of the process, even when a
    // later installation step fails, so a failed install cannot be retried.
    *installed = true;

    // SAFETY: the single write to REPORT_PATH this process ever performs,
    // made before any handler that reads it is registered; the rest is
    // syscalls
    unsafe {
        let dst = ptr::addr_of_mut!(REPORT_PATH).cast::<u8>();
        ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        dst.add(bytes.len()).write(0);

        install_sigaltstack()?;
        install_handlers()?;
    }

    Ok(())
}

/// Create an alternative stack to run the signal handler on. This is done
/// since the signal might have been caused by a stack overflow.
unsafe fn install_sigaltstack() -> Result<(), Error> {
    unsafe {
        // Check to see if the existing sigaltstack, and if it exists, is it
        // big enough. If so we don't need to allocate our own.
        let mut old_stack = mem::zeroed();
        if libc::sigaltstack(ptr::null(), &mut old_stack) == -1 {
            return Err(std::io::Error::last_os_error().into());
        }

        if old_stack.ss_flags & libc::SS_DISABLE == 0 && old_stack.ss_size >= SIG_STACK_SIZE {
            return Ok(());
        }

        // ... but failing that we need to allocate our own, so do all that
        // here.
        let guard_size = libc::sysconf(libc::_SC_PAGESIZE) as usize;
        let alloc_size = guard_size + SIG_STACK_SIZE;

        let alloc = libc::mmap(
            ptr::null_mut(),
            alloc_size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        );
        if alloc == libc::MAP_FAILED {
            return Err(Error::OutOfMemory);
        }

        // Prepare the stack with readable/writable memory and then register
        // it with `sigaltstack`, leaving the first page as a guard.
        let stack_ptr = alloc.cast::<u8>().add(guard_size).cast::<libc::c_void>();
        if libc::mprotect(
            stack_ptr,
            SIG_STACK_SIZE,
            libc::PROT_READ | libc::PROT_WRITE,
        ) == -1
        {
            return Err(std::io::Error::last_os_error().into());
        }

        let new_stack = libc::stack_t {
            ss_sp: stack_ptr,
            ss_flags: 0,
            ss_size: SIG_STACK_SIZE,
        };
        if libc::sigaltstack(&new_stack, ptr::null_mut()) == -1 {
            return Err(std::io::Error::last_os_error().into());
        }

        Ok(())
    }
}

unsafe fn install_handlers() -> Result<(), Error> {
    unsafe {
        let mut sa: libc::sigaction = mem::zeroed();
        libc::sigemptyset(&mut sa.sa_mask);

        // Mask all fatal signals when we're handling one of them.
        for sig in FATAL_SIGNALS {
            libc::sigaddset(&mut sa.sa_mask, sig as i32);
        }

        sa.sa_sigaction = signal_handler as usize;
        sa.sa_flags = libc::SA_ONSTACK;

        for sig in FATAL_SIGNALS {
            // On failure the handlers registered so far stay in place; the
            // caller gets the first error and best-effort reporting.
            if libc::sigaction(sig as i32, &sa, ptr::null_mut()) == -1 {
                return Err(std::io::Error::last_os_error().into());
            }
        }

        Ok(())
    }
}

/// Restores the signal handler for the specified signal back to its default
/// handler, which _should_ perform the default signal action as seen in
/// <https://man7.org/linux/man-pages/man7/signal.7.html>
#[inline]
unsafe fn install_default_handler(signum: i32) {
    unsafe { set_handler(signum, libc::SIG_DFL) };
}

unsafe fn set_handler(signum: i32, action: usize) {
    // Android L+ expose signal and sigaction symbols that override the system
    // ones. There is a bug in these functions where a request to set the
    // handler to SIG_DFL is ignored. In that case, an infinite loop is
    // entered as the signal is repeatedly sent to our signal handler.
    // To work around this, directly call the system's sigaction.
    unsafe {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "android")] {
                let mut sa: libc::sigaction = mem::zeroed();
                libc::sigemptyset(&mut sa.sa_mask);
                sa.sa_sigaction = action;
                sa.sa_flags = libc::SA_RESTART;
                libc::syscall(
                    libc::SYS_rt_sigaction,
                    signum,
                    &sa,
                    ptr::null::<libc::sigaction>(),
                    mem::size_of::<libc::sigset_t>(),
                );
            } else {
                libc::signal(signum, action);
            }
        }
    }
}

/// This is the actual function installed for each fatal signal, invoked by
/// the kernel.
///
/// Everything it reaches must stay async-signal-safe: fixed stack buffers,
/// raw syscalls, no allocation, no locks.
unsafe extern "C" fn signal_handler(signum: i32) {
    unsafe {
        debug_print!("entered signal handler");

        let path = ptr::addr_of!(REPORT_PATH).cast::<libc::c_char>();
        if *path == 0 {
            crate::write_stderr("crash handler: no report path configured\n");
        } else {
            write_report(signum, path);
        }

        debug_print!("re-raising signal");

        // Hand the termination decision back to the kernel: restore the
        // default disposition and deliver the signal again, so the exit
        // status and core dump behavior are the ones a supervisor expects.
        // Restoring first also means a second delivery of this signal can
        // never re-enter this handler.
        install_default_handler(signum);
        libc::raise(signum);
    }
}

unsafe fn write_report(signum: i32, path: *const libc::c_char) {
    unsafe {
        // Walk the stack before touching the filesystem, while it is as
        // close to the crash as it gets
        let mut frames = [ptr::null_mut::<libc::c_void>(); MAX_FRAMES];
        let depth = capture_stack(&mut frames);

        let name = Signal::from_raw(signum).map_or("UNKNOWN", Signal::name);

        let fd = libc::open(
            path,
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o700 as libc::c_uint,
        );
        if fd < 0 {
            crate::write_stderr("crash handler: unable to create the report file\n");
            return;
        }

        write_all(fd, b"Crash due to signal: ");
        write_all(fd, name.as_bytes());
        write_all(fd, b"\n\nCurrent thread name: ");
        write_thread_name(fd);
        write_all(fd, b"\n\n");
        dump_frames(&frames, depth, fd);

        libc::close(fd);
    }
}

/// Writes all of `buf` to `fd` with raw `write` calls, retrying on EINTR.
///
/// Any other failure simply truncates the report; a partial report is an
/// accepted outcome, wedging the handler is not.
unsafe fn write_all(fd: libc::c_int, mut buf: &[u8]) {
    unsafe {
        while !buf.is_empty() {
            let written = libc::write(fd, buf.as_ptr().cast(), buf.len());

            if written > 0 {
                buf = &buf[written as usize..];
            } else if written < 0
                && std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR)
            {
                continue;
            } else {
                return;
            }
        }
    }
}

/// Length of the NUL-terminated thread name in `buf`, or `None` when the
/// query failed or the name is empty and the `<no name>` placeholder should
/// be written instead.
fn named_len(rc: libc::c_int, buf: &[libc::c_char; THREAD_NAME_LEN]) -> Option<usize> {
    if rc != 0 || buf[0] == 0 {
        return None;
    }

    Some(buf.iter().position(|&c| c == 0).unwrap_or(THREAD_NAME_LEN))
}

cfg_if::cfg_if! {
    if #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios"
    ))] {
        unsafe fn write_thread_name(fd: libc::c_int) {
            unsafe {
                let mut name = [0 as libc::c_char; THREAD_NAME_LEN];
                let rc = libc::pthread_getname_np(
                    libc::pthread_self(),
                    name.as_mut_ptr(),
                    THREAD_NAME_LEN,
                );

                match named_len(rc, &name) {
                    Some(len) => {
                        write_all(fd, std::slice::from_raw_parts(name.as_ptr().cast::<u8>(), len));
                    }
                    None => write_all(fd, b"<no name>"),
                }
            }
        }
    } else {
        unsafe fn write_thread_name(fd: libc::c_int) {
            unsafe { write_all(fd, b"<no name>") }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_env = "musl", target_os = "android"))] {
        // No execinfo on bionic or musl; the report keeps its header but
        // carries no frames
        unsafe fn capture_stack(_frames: &mut [*mut libc::c_void; MAX_FRAMES]) -> libc::c_int {
            0
        }

        unsafe fn dump_frames(
            _frames: &[*mut libc::c_void; MAX_FRAMES],
            _depth: libc::c_int,
            _fd: libc::c_int,
        ) {
        }
    } else {
        extern "C" {
            // This is present in the libc crate on apple targets, but not on
            // linux
            fn backtrace_symbols_fd(
                buffer: *const *mut libc::c_void,
                size: libc::c_int,
                fd: libc::c_int,
            );
        }

        unsafe fn capture_stack(frames: &mut [*mut libc::c_void; MAX_FRAMES]) -> libc::c_int {
            unsafe { libc::backtrace(frames.as_mut_ptr(), MAX_FRAMES as libc::c_int) }
        }

        unsafe fn dump_frames(
            frames: &[*mut libc::c_void; MAX_FRAMES],
            depth: libc::c_int,
            fd: libc::c_int,
        ) {
            unsafe { backtrace_symbols_fd(frames.as_ptr(), depth, fd) }
        }
    }
}
