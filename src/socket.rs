//! Readiness waits over the engine-owned descriptor.

use std::os::unix::io::RawFd;

use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use crate::error::Result;

/// Non-owning readiness watcher for a descriptor owned by the protocol
/// engine.
///
/// `RawFd` carries no destructor, so dropping the watcher deregisters the
/// descriptor from the reactor without closing it; closing stays the
/// engine's job.
pub(crate) struct Watcher {
    fd: AsyncFd<RawFd>,
}

impl Watcher {
    /// Register the externally-owned descriptor with the reactor.
    pub(crate) fn attach(fd: RawFd) -> Result<Self> {
        let fd = AsyncFd::with_interest(fd, Interest::READABLE | Interest::WRITABLE)?;
        Ok(Self { fd })
    }

    /// Wait until the descriptor is readable. Cancel-safe.
    ///
    /// Readiness is cleared before returning, so the caller must perform its
    /// read immediately and drain the socket; a wait armed after the clear
    /// observes every later arrival.
    pub(crate) async fn wait_readable(&self) -> Result<()> {
        let mut guard = self.fd.readable().await?;
        guard.clear_ready();
        Ok(())
    }

    /// Wait until the descriptor is writable. Cancel-safe.
    pub(crate) async fn wait_writable(&self) -> Result<()> {
        let mut guard = self.fd.writable().await?;
        guard.clear_ready();
        Ok(())
    }
}
