use crate::config::HostConfiguration;
use crate::error::PublishError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// An authenticated connection to one host. Remote paths are relative to
/// the host's remote root; implementations resolve them.
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// Upload one local file, creating missing remote directories. A failed
    /// upload may leave a partial remote file behind.
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), PublishError>;

    /// Run `command` in the remote default shell and return its exit status.
    async fn run_command(&self, command: &str, use_pty: bool) -> Result<u32, PublishError>;

    /// Remove everything inside `remote_dir`, keeping the directory itself.
    async fn clean(&self, remote_dir: &str) -> Result<(), PublishError>;

    /// Release the connection, aborting in-flight work. Safe to call again.
    async fn close(&self);

    /// [`run_command`](Self::run_command) bounded by `timeout_ms` (0 = no
    /// limit). On expiry the session is closed.
    async fn exec(&self, command: &str, timeout_ms: u64, use_pty: bool) -> Result<u32, PublishError> {
        if timeout_ms == 0 {
            return self.run_command(command, use_pty).await;
        }
        let limit = Duration::from_millis(timeout_ms);
        match tokio::time::timeout(limit, self.run_command(command, use_pty)).await {
            Ok(res) => res,
            Err(_) => {
                warn!("command `{command}` exceeded {timeout_ms}ms, closing session");
                self.close().await;
                Err(PublishError::Timeout {
                    command: command.to_string(),
                    timeout_ms,
                })
            }
        }
    }
}

/// Opens sessions for host configurations.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: RemoteSession;

    async fn connect(&self, host: &HostConfiguration) -> Result<Self::Session, PublishError>;
}
