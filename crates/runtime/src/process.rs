//! Bridge process lifecycle.

use std::path::Path;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::{Error, Result};
use crate::locate::locate_bridge;

/// Launch options for the bridge process.
#[derive(Debug, Clone, Default)]
pub struct BridgeLaunch<'a> {
    /// Client id used by the bridge's credential store.
    pub client_id: &'a str,
    /// Directory for persisted session credentials.
    pub data_dir: Option<&'a Path>,
}

/// A running bridge child process.
///
/// Communication happens over the stdio pipes; callers take the handles
/// with [`take_stdio`](Self::take_stdio) and feed them to the transport.
#[derive(Debug)]
pub struct BridgeProcess {
    process: Child,
}

impl BridgeProcess {
    /// Spawn the bridge with the resolved Node executable and script.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BridgeNotFound`] when resolution fails and
    /// [`Error::LaunchFailed`] when the process does not survive startup.
    pub async fn launch(options: BridgeLaunch<'_>) -> Result<Self> {
        let (node_exe, bridge_js) = locate_bridge()?;

        let mut cmd = Command::new(&node_exe);
        cmd.arg(&bridge_js)
            .arg("--client-id")
            .arg(options.client_id)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit());

        if let Some(data_dir) = options.data_dir {
            cmd.arg("--data-dir").arg(data_dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::LaunchFailed(format!("Failed to spawn process: {e}")))?;

        // Give a misconfigured bridge the chance to exit before we commit.
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(Error::LaunchFailed(format!(
                    "Bridge process exited immediately with status: {status}"
                )));
            }
            Ok(None) => {}
            Err(e) => {
                return Err(Error::LaunchFailed(format!(
                    "Failed to check process status: {e}"
                )));
            }
        }

        Ok(Self { process: child })
    }

    /// Takes the stdio pipe handles for the transport layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LaunchFailed`] if the pipes were already taken or
    /// were not requested at spawn time.
    pub fn take_stdio(&mut self) -> Result<(ChildStdin, ChildStdout)> {
        let stdin = self
            .process
            .stdin
            .take()
            .ok_or_else(|| Error::LaunchFailed("bridge stdin unavailable".to_string()))?;
        let stdout = self
            .process
            .stdout
            .take()
            .ok_or_else(|| Error::LaunchFailed("bridge stdout unavailable".to_string()))?;
        Ok((stdin, stdout))
    }

    /// Shut the bridge down, waiting for the process to exit.
    ///
    /// On Windows the stdio pipes are dropped before the kill because
    /// tokio services child stdio on a blocking threadpool there, and a
    /// live pipe can hang the reap indefinitely.
    pub async fn shutdown(mut self) -> Result<()> {
        #[cfg(windows)]
        {
            drop(self.process.stdin.take());
            drop(self.process.stdout.take());
            drop(self.process.stderr.take());

            self.process
                .kill()
                .await
                .map_err(|e| Error::LaunchFailed(format!("Failed to kill process: {e}")))?;

            match tokio::time::timeout(std::time::Duration::from_secs(5), self.process.wait()).await
            {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(Error::LaunchFailed(format!(
                    "Failed to wait for process: {e}"
                ))),
                Err(_) => {
                    let _ = self.process.start_kill();
                    Err(Error::LaunchFailed(
                        "Bridge shutdown timeout after 5 seconds".to_string(),
                    ))
                }
            }
        }

        #[cfg(not(windows))]
        {
            self.process
                .kill()
                .await
                .map_err(|e| Error::LaunchFailed(format!("Failed to kill process: {e}")))?;

            let _ = self.process.wait().await;

            Ok(())
        }
    }
}
