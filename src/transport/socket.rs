//! Control socket discovery.
//!
//! # Lookup Order
//!
//! 1. An explicit path (command line)
//! 2. `I3SOCK`, then `SWAYSOCK` from the environment
//! 3. The output of `i3 --get-socketpath`

// ============================================================================
// Imports
// ============================================================================

use std::ffi::OsString;
use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Environment variables naming the socket, in priority order.
const SOCKET_ENV_VARS: [&str; 2] = ["I3SOCK", "SWAYSOCK"];

// ============================================================================
// Discovery
// ============================================================================

/// Resolves the control socket path.
///
/// # Errors
///
/// Returns [`Error::Connection`] if no source yields a path.
pub async fn resolve_socket_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    if let Some(path) = socket_path_from_env(|key| std::env::var_os(key)) {
        debug!(path = %path.display(), "Socket path from environment");
        return Ok(path);
    }

    socket_path_from_wm().await
}

/// Looks up the socket path in the environment through `lookup`.
fn socket_path_from_env(lookup: impl Fn(&str) -> Option<OsString>) -> Option<PathBuf> {
    SOCKET_ENV_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Asks the window manager binary for its socket path.
async fn socket_path_from_wm() -> Result<PathBuf> {
    let output = Command::new("i3")
        .arg("--get-socketpath")
        .output()
        .await
        .map_err(|e| Error::connection(format!("failed to run i3 --get-socketpath: {e}")))?;

    if !output.status.success() {
        return Err(Error::connection(format!(
            "i3 --get-socketpath exited with {}",
            output.status
        )));
    }

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        return Err(Error::connection("i3 --get-socketpath printed nothing"));
    }

    debug!(%path, "Socket path from i3");
    Ok(PathBuf::from(path))
}

// ============================================================================
// Tests
// ============================================================================
