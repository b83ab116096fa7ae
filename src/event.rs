//! Process-local notification and readiness primitives.
//!
//! Thin owned wrappers around `eventfd(2)` and `epoll(7)` so the transport
//! bridge can block on two descriptors at once and any thread — including a
//! signal handler — can wake it with a single write.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// Signal-safe wake-up handle for a blocked event loop.
///
/// The counter value written is informational (it is logged by whoever reads
/// it); waking the waiter is the only load-bearing effect.
pub struct EventFd {
    fd: RawFd,
}

impl EventFd {
    pub fn new() -> io::Result<Self> {
        // SAFETY: eventfd takes no pointers; a negative return signals an error.
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Add `code` to the counter and wake any waiter. Performs a single
    /// `write(2)`, so this is safe to call from a signal handler.
    pub fn signal(&self, code: u64) -> io::Result<()> {
        signal_raw(self.fd, code)
    }

    /// Read and reset the accumulated counter value.
    pub fn take(&self) -> io::Result<u64> {
        let mut val: u64 = 0;
        // SAFETY: `val` is a valid 8-byte buffer for the duration of the call.
        let n = unsafe { libc::read(self.fd, &mut val as *mut u64 as *mut libc::c_void, 8) };
        if n != 8 {
            return Err(io::Error::last_os_error());
        }
        Ok(val)
    }
}

impl AsRawFd for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for EventFd {
    fn drop(&mut self) {
        // SAFETY: fd is owned by this value and closed exactly once.
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Write `code` to an eventfd addressed by raw descriptor.
///
/// Split out from [`EventFd::signal`] so a signal handler can reach the
/// descriptor through a stored integer without touching the owning value.
pub fn signal_raw(fd: RawFd, code: u64) -> io::Result<()> {
    let val: u64 = code;
    // SAFETY: `val` lives across the call; write(2) is async-signal-safe.
    let n = unsafe { libc::write(fd, &val as *const u64 as *const libc::c_void, 8) };
    if n != 8 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Level-triggered readiness multiplexer over a small fixed set of fds.
pub struct Epoll {
    fd: RawFd,
}

impl Epoll {
    pub fn new() -> io::Result<Self> {
        // SAFETY: epoll_create1 takes no pointers.
        let fd = unsafe { libc::epoll_create1(0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Register `fd` for read readiness.
    pub fn add(&self, fd: RawFd) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: fd as u64,
        };
        // SAFETY: `ev` is a valid epoll_event for the duration of the call.
        let rc = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_ADD, fd, &mut ev) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Block until at least one registered fd is readable and return the set.
    /// A wait interrupted by a signal returns an empty set; the caller's loop
    /// re-enters and observes whatever the handler left behind.
    pub fn wait(&self, timeout_ms: i32) -> io::Result<Vec<RawFd>> {
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 8];
        // SAFETY: `events` is a valid buffer of 8 epoll_event slots.
        let n = unsafe { libc::epoll_wait(self.fd, events.as_mut_ptr(), 8, timeout_ms) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }
        Ok(events[..n as usize].iter().map(|ev| ev.u64 as RawFd).collect())
    }
}

impl AsRawFd for Epoll {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        // SAFETY: fd is owned by this value and closed exactly once.
        unsafe {
            libc::close(self.fd);
        }
    }
}
