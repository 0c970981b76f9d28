//! The FIFO primitive: create, open non-blocking, read-until-EOF, and on EOF
//! destroy-and-recreate so that the next writer sees a readable pipe.
//!
//! An external writer opens the FIFO, writes, and closes. Without tearing the FIFO
//! down and recreating it, every subsequent read would return zero forever. Because
//! the daemon is single-threaded and owns the descriptor exclusively, reset-on-EOF is
//! race-free.

use std::io;
use std::os::fd::{IntoRawFd, RawFd};
use std::path::{Path, PathBuf};

use libc::{c_void, size_t};
use log::error;
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

/// Result of a single non-blocking read attempt on a FIFO.
pub enum FifoRead {
    /// `n` bytes were read into the caller's buffer.
    Data(usize),
    /// Nothing was available right now (`EWOULDBLOCK`) or the writer just closed and
    /// the FIFO was reset; the caller should not treat this as an error.
    NoData,
}

/// A named pipe at a fixed path on disk.
pub struct Fifo {
    path: PathBuf,
    flags: OFlag,
    fd: Option<RawFd>,
}

impl Fifo {
    /// Creates the FIFO (if absent) and opens it, without destroying an existing one.
    /// Used when accepting a pending receive by opening `file_out` for writing.
    pub fn open_existing(path: impl Into<PathBuf>, flags: OFlag) -> io::Result<Fifo> {
        let path = path.into();
        mkfifo_ignoring_eexist(&path)?;
        let fd = open_ignoring_enxio(&path, flags)?;
        Ok(Fifo { path, flags, fd })
    }

    /// Unlinks any existing entry at `path`, closes the previously held descriptor if
    /// any, creates a fresh FIFO with mode 0666, and opens it non-blocking.
    pub fn reset(path: impl Into<PathBuf>, flags: OFlag) -> io::Result<Fifo> {
        let mut fifo = Fifo {
            path: path.into(),
            flags,
            fd: None,
        };
        fifo.do_reset()?;
        Ok(fifo)
    }

    /// Forces a reset even though nothing signalled EOF, used when a logical error
    /// (e.g. the transport rejected a send announcement) requires discarding whatever
    /// is queued in the pipe.
    pub fn force_reset(&mut self) -> io::Result<()> {
        self.do_reset()
    }

    fn do_reset(&mut self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        if let Some(fd) = self.fd.take() {
            close_raw(fd);
        }
        mkfifo_ignoring_eexist(&self.path)?;
        self.fd = open_ignoring_enxio(&self.path, self.flags | OFlag::O_NONBLOCK)?;
        Ok(())
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.fd
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempts one non-blocking read. Retries on `EINTR`. On `EWOULDBLOCK` returns
    /// `NoData`. On zero bytes (writer closed) resets the FIFO and returns `NoData`.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<FifoRead> {
        let Some(fd) = self.fd else {
            self.do_reset()?;
            return Ok(FifoRead::NoData);
        };
        loop {
            let rc = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len() as size_t) };
            if rc > 0 {
                return Ok(FifoRead::Data(rc as usize));
            } else if rc == 0 {
                self.do_reset()?;
                return Ok(FifoRead::NoData);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EWOULDBLOCK) => return Ok(FifoRead::NoData),
                _ => return Err(err),
            }
        }
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            close_raw(fd);
        }
    }
}

fn close_raw(fd: RawFd) {
    if unsafe { libc::close(fd) } < 0 {
        error!("failed to close fifo fd {fd}: {}", io::Error::last_os_error());
    }
}

fn mkfifo_ignoring_eexist(path: &Path) -> io::Result<()> {
    match mkfifo(path, Mode::from_bits_truncate(0o666)) {
        Ok(()) | Err(Errno::EEXIST) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

fn open_ignoring_enxio(path: &Path, flags: OFlag) -> io::Result<Option<RawFd>> {
    match open(path, flags | OFlag::O_NONBLOCK, Mode::from_bits_truncate(0o666)) {
        Ok(owned) => Ok(Some(owned.into_raw_fd())),
        Err(Errno::ENXIO) => Ok(None),
        Err(e) => Err(io::Error::from(e)),
    }
}
