//! Process signals.
//!
//! The bar pauses and resumes its status command with the two signals
//! announced in the status header; those are only handled when running as
//! status. `SIGINT` and `SIGTERM` always shut the hub down gracefully.

// ============================================================================
// Imports
// ============================================================================

use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Result;
use crate::hub::HubHandle;

// ============================================================================
// SignalConfig
// ============================================================================

/// Signal numbers used for suspend and resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalConfig {
    /// Suspends status output.
    pub stop: i32,
    /// Resumes status output.
    pub cont: i32,
}

impl SignalConfig {
    /// Creates a signal configuration.
    #[inline]
    #[must_use]
    pub const fn new(stop: i32, cont: i32) -> Self {
        Self { stop, cont }
    }
}

impl Default for SignalConfig {
    /// `SIGRTMAX` stops, `SIGRTMAX - 1` continues.
    fn default() -> Self {
        let max = libc::SIGRTMAX();
        Self::new(max, max - 1)
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Installs the signal handlers and forwards signals to `hub`.
///
/// Suspend and resume signals are handled only when `status` is given.
/// The task ends once the hub stops accepting requests.
///
/// # Errors
///
/// Returns [`Error::Io`](crate::Error::Io) if a handler cannot be
/// installed.
pub fn spawn_listener(hub: HubHandle, status: Option<SignalConfig>) -> Result<JoinHandle<()>> {
    let (mut stop, mut cont) = match status {
        Some(config) => {
            debug!(stop = config.stop, cont = config.cont, "Status signal handlers installed");
            (
                Some(signal(SignalKind::from_raw(config.stop))?),
                Some(signal(SignalKind::from_raw(config.cont))?),
            )
        }
        None => (None, None),
    };
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let forwarded = tokio::select! {
                Some(()) = recv(&mut stop) => {
                    debug!("Stop signal received");
                    hub.suspend()
                }
                Some(()) = recv(&mut cont) => {
                    debug!("Continue signal received");
                    hub.resume()
                }
                Some(()) = interrupt.recv() => {
                    info!("Interrupted");
                    hub.close()
                }
                Some(()) = terminate.recv() => {
                    info!("Terminated");
                    hub.close()
                }
                else => break,
            };

            if forwarded.is_err() {
                break;
            }
        }
        debug!("Signal listener stopped");
    }))
}

/// Waits for `signal`; pending forever when it is not handled.
async fn recv(handler: &mut Option<Signal>) -> Option<()> {
    match handler {
        Some(handler) => handler.recv().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
