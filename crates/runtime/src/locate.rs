//! Bridge script and Node executable discovery.
//!
//! Resolution order:
//! 1. `WATIFY_NODE_EXE` and `WATIFY_BRIDGE_JS` environment variables
//!    (explicit runtime override)
//! 2. `WATIFY_BRIDGE_PATH` pointing at a directory containing the bridge
//! 3. a `bridge/` directory next to the current working directory
//!    (repository checkout layout)
//! 4. global npm installation (`npm root -g`)
//! 5. local npm installation (`npm root`)
//!
//! Explicit environment variables take precedence so deployments can pin a
//! specific Node build (e.g. on NixOS, where a discovered binary may not
//! be runnable).

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::warn;

use crate::error::{Error, Result};

const BRIDGE_SCRIPT: &str = "watify-bridge.cjs";

/// Locate the Node executable and the bridge script.
///
/// Returns `(node_executable, bridge_script)`.
///
/// # Errors
///
/// Returns [`Error::BridgeNotFound`] when no candidate in the search
/// order yields a runnable pair.
pub fn locate_bridge() -> Result<(PathBuf, PathBuf)> {
    if let Some((node, script)) = try_env_pair() {
        if node_is_usable(&node) {
            return Ok((node, script));
        }
        warn!(
            target = "watify.bridge",
            node = %node.display(),
            "WATIFY_NODE_EXE is set but node is not runnable; falling back"
        );
    }

    if let Some(script) = try_bridge_path_env() {
        if let Ok(node) = find_node_executable() {
            return Ok((node, script));
        }
    }

    if let Some(script) = try_local_checkout() {
        if let Ok(node) = find_node_executable() {
            return Ok((node, script));
        }
    }

    for npm_args in [&["root", "-g"][..], &["root"][..]] {
        if let Some(script) = try_npm_root(npm_args) {
            if let Ok(node) = find_node_executable() {
                return Ok((node, script));
            }
        }
    }

    Err(Error::BridgeNotFound)
}

fn try_env_pair() -> Option<(PathBuf, PathBuf)> {
    let node = PathBuf::from(std::env::var("WATIFY_NODE_EXE").ok()?);
    let script = PathBuf::from(std::env::var("WATIFY_BRIDGE_JS").ok()?);
    (node.exists() && script.exists()).then_some((node, script))
}

fn try_bridge_path_env() -> Option<PathBuf> {
    let dir = PathBuf::from(std::env::var("WATIFY_BRIDGE_PATH").ok()?);
    let script = dir.join(BRIDGE_SCRIPT);
    script.exists().then_some(script)
}

fn try_local_checkout() -> Option<PathBuf> {
    let script = Path::new("bridge").join(BRIDGE_SCRIPT);
    script.exists().then(|| script.to_path_buf())
}

fn try_npm_root(args: &[&str]) -> Option<PathBuf> {
    let output = Command::new("npm").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let npm_root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let script = PathBuf::from(npm_root).join("watify-bridge").join(BRIDGE_SCRIPT);
    script.exists().then_some(script)
}

fn node_is_usable(node: &Path) -> bool {
    Command::new(node)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Find the node executable in PATH or common install locations.
pub(crate) fn find_node_executable() -> Result<PathBuf> {
    #[cfg(not(windows))]
    let which_cmd = "which";
    #[cfg(windows)]
    let which_cmd = "where";

    if let Ok(output) = Command::new(which_cmd).arg("node").output() {
        if output.status.success() {
            let node_path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !node_path.is_empty() {
                let path = PathBuf::from(node_path.lines().next().unwrap_or(&node_path));
                if path.exists() {
                    return Ok(path);
                }
            }
        }
    }

    #[cfg(not(windows))]
    let common_locations = [
        "/usr/local/bin/node",
        "/usr/bin/node",
        "/opt/homebrew/bin/node",
        "/opt/local/bin/node",
    ];

    #[cfg(windows)]
    let common_locations = [
        "C:\\Program Files\\nodejs\\node.exe",
        "C:\\Program Files (x86)\\nodejs\\node.exe",
    ];

    for location in &common_locations {
        let path = PathBuf::from(location);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(Error::LaunchFailed(
        "Node.js executable not found. Install Node.js or set WATIFY_NODE_EXE.".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_path_env_requires_existing_script() {
        let dir = tempfile::tempdir().unwrap();

        // No script yet: resolution must not invent a path.
        unsafe { std::env::set_var("WATIFY_BRIDGE_PATH", dir.path()) };
        assert!(try_bridge_path_env().is_none());

        std::fs::write(dir.path().join(BRIDGE_SCRIPT), "// stub").unwrap();
        let found = try_bridge_path_env().unwrap();
        assert_eq!(found, dir.path().join(BRIDGE_SCRIPT));

        unsafe { std::env::remove_var("WATIFY_BRIDGE_PATH") };
    }

    #[test]
    fn find_node_executable_reports_missing_cleanly() {
        match find_node_executable() {
            Ok(path) => assert!(path.exists()),
            Err(Error::LaunchFailed(msg)) => assert!(msg.contains("WATIFY_NODE_EXE")),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
