//! Line input that can be abandoned from another thread.
//!
//! A blocking `read` on a terminal cannot be interrupted portably, and closing
//! the descriptor under a reader is a race. Instead every read first polls two
//! descriptors: the input and the read end of a private pipe. Raising the
//! [`CancelSignal`] writes one byte into that pipe, which makes every pending
//! and future read report end of input.

#![allow(unsafe_code)]

use std::io::{self, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Create an anonymous pipe, returning `(read_end, write_end)`.
pub fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe(2) succeeded, both descriptors are open and owned by nobody else.
    let (r, w) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    Ok((r, w))
}

// ---------------------------------------------------------------------------
// CancelSignal
// ---------------------------------------------------------------------------

/// One-shot cancellation observable through a file descriptor.
pub struct CancelSignal {
    read:   OwnedFd,
    write:  OwnedFd,
    raised: AtomicBool,
}

impl CancelSignal {
    pub fn new() -> io::Result<Self> {
        let (read, write) = pipe()?;
        Ok(Self {
            read,
            write,
            raised: AtomicBool::new(false),
        })
    }

    /// Raise the signal. Only the first call has any effect.
    pub fn raise(&self) {
        if self.raised.swap(true, Ordering::AcqRel) {
            return;
        }
        let byte = [1u8];
        // SAFETY: writing one byte from a live buffer to a descriptor we own.
        let n = unsafe { libc::write(self.write.as_raw_fd(), byte.as_ptr().cast(), 1) };
        if n != 1 {
            // The pipe is empty and private, so this only fails if the
            // descriptor itself is broken; readers would then block until
            // their own input ends.
            debug!(error = %io::Error::last_os_error(), "failed to raise cancel signal");
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

impl AsRawFd for CancelSignal {
    /// The descriptor that becomes readable once the signal is raised.
    fn as_raw_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }
}

// ---------------------------------------------------------------------------
// InterruptibleInput
// ---------------------------------------------------------------------------

/// A [`Read`] over a borrowed descriptor that returns end of input as soon as
/// a [`CancelSignal`] is raised.
///
/// The source descriptor is not owned: the caller keeps it open for as long as
/// the reader exists. Wrap it in a `BufReader` for line input.
pub struct InterruptibleInput<'a> {
    source: RawFd,
    cancel: &'a CancelSignal,
}

impl<'a> InterruptibleInput<'a> {
    pub fn new(source: RawFd, cancel: &'a CancelSignal) -> Self {
        Self { source, cancel }
    }

    /// Block until the source or the cancel pipe is ready.
    ///
    /// Returns `true` if the source can be read.
    fn wait(&self) -> io::Result<bool> {
        let mut fds = [
            libc::pollfd { fd: self.source, events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: self.cancel.as_raw_fd(), events: libc::POLLIN, revents: 0 },
        ];
        loop {
            // SAFETY: `fds` is a live array of two initialised pollfd structs.
            let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if ret >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
        if fds[1].revents != 0 {
            return Ok(false);
        }
        // Hang-up and errors are left for read(2) to report.
        Ok(fds[0].revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0)
    }
}

impl Read for InterruptibleInput<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || !self.wait()? {
            return Ok(0);
        }
        loop {
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
            let n = unsafe { libc::read(self.source, buf.as_mut_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}
