//! Signal handling for graceful shutdown
//!
//! Handlers are installed once at startup, before registration, so a signal
//! that arrives while the companion service is being contacted is not lost.

use std::fmt;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

/// Signal that ended the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Terminate,
    Interrupt,
    Hangup,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShutdownReason::Terminate => "SIGTERM",
            ShutdownReason::Interrupt => "SIGINT",
            ShutdownReason::Hangup => "SIGHUP",
        };
        f.write_str(name)
    }
}

/// Installed SIGTERM/SIGINT/SIGHUP streams
pub struct ShutdownSignal {
    terminate: Signal,
    interrupt: Signal,
    hangup: Signal,
}

impl ShutdownSignal {
    /// Register the handlers; fails if the runtime cannot install them
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for the next shutdown signal
    pub async fn wait(&mut self) -> ShutdownReason {
        let reason = tokio::select! {
            _ = self.terminate.recv() => ShutdownReason::Terminate,
            _ = self.interrupt.recv() => ShutdownReason::Interrupt,
            _ = self.hangup.recv() => ShutdownReason::Hangup,
        };
        debug!(%reason, "shutdown signal received");
        reason
    }
}
