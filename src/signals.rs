//! Lifecycle signal handling (spec.md §4.10, §5): `HUP`/`INT`/`QUIT`/`TERM` clear a
//! `running` flag the event loop polls once per iteration; `PIPE` is ignored so a
//! reader closing `file_out` mid-transfer surfaces as `EPIPE` on write instead of
//! killing the process.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SigHandler, Signal};

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn request_shutdown(_signum: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

/// Installs the shutdown handlers and ignores `SIGPIPE`. Must be called once during
/// startup, before the event loop begins.
pub fn install() -> nix::Result<()> {
    unsafe {
        signal::signal(Signal::SIGHUP, SigHandler::Handler(request_shutdown))?;
        signal::signal(Signal::SIGINT, SigHandler::Handler(request_shutdown))?;
        signal::signal(Signal::SIGQUIT, SigHandler::Handler(request_shutdown))?;
        signal::signal(Signal::SIGTERM, SigHandler::Handler(request_shutdown))?;
        signal::signal(Signal::SIGPIPE, SigHandler::SigIgn)?;
    }
    Ok(())
}

pub fn is_running() -> bool {
    RUNNING.load(Ordering::SeqCst)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn running_starts_true() {
        assert!(is_running());
    }
}
