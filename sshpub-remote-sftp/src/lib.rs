mod ssh_client;
mod utils;

use crate::utils::{create_dir_all, parent_of, remote_target, remove_dir_contents, Lifecycle};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use russh::client::{self, AuthResult};
use russh::keys::PrivateKeyWithHashAlg;
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use ssh_client::Client;
use sshpub_core::{Connector, Credential, HostConfiguration, PublishError, RemoteSession};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Opens [`SshSession`]s with russh.
#[derive(Debug, Default, Clone, Copy)]
pub struct SftpConnector;

#[async_trait]
impl Connector for SftpConnector {
    type Session = SshSession;

    async fn connect(&self, host: &HostConfiguration) -> Result<SshSession, PublishError> {
        let attempt = SshSession::connect(host);
        let res = if host.timeout_ms == 0 {
            attempt.await
        } else {
            tokio::time::timeout(Duration::from_millis(host.timeout_ms), attempt)
                .await
                .unwrap_or_else(|_| Err(anyhow!("timed out after {}ms", host.timeout_ms)))
        };
        res.map_err(|e| PublishError::Connection {
            host: host.address(),
            reason: format!("{e:#}"),
        })
    }
}

/// One SSH connection carrying an SFTP channel for uploads; commands get
/// their own exec channel.
pub struct SshSession {
    name: String,
    root: String,
    handle: client::Handle<Client>,
    sftp: SftpSession,
    life: Lifecycle,
}

impl SshSession {
    pub async fn connect(host: &HostConfiguration) -> Result<Self> {
        let config = client::Config {
            keepalive_interval: (host.keepalive_ms > 0).then(|| Duration::from_millis(host.keepalive_ms)),
            ..Default::default()
        };
        let handler = Client {
            host: host.name.clone(),
            allowed_fingerprints: host.fingerprints.clone(),
        };
        let mut handle = client::connect(Arc::new(config), (host.hostname.as_str(), host.port), handler)
            .await
            .with_context(|| format!("connect to {}", host.address()))?;

        let res = match &host.credential {
            Credential::Password { password } => {
                handle.authenticate_password(host.username.as_str(), password.as_str()).await?
            }
            Credential::KeyFile { path, passphrase } => {
                let key = russh::keys::load_secret_key(path, passphrase.as_deref())
                    .with_context(|| format!("load private key {}", path.display()))?;
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(
                        host.username.as_str(),
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await?
            }
        };
        if let AuthResult::Failure {
            remaining_methods,
            partial_success,
        } = res
        {
            return Err(anyhow!(
                "authentication failed for {}, remaining_methods: {:?}, partial_success: {}",
                host.username,
                remaining_methods,
                partial_success
            ));
        }

        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        info!("connected to {} as {}", host.address(), host.username);
        debug!("remote login directory: {:?}", sftp.canonicalize(".").await);

        Ok(Self {
            name: host.name.clone(),
            root: host.remote_root_dir.trim().to_string(),
            handle,
            sftp,
            life: Lifecycle::default(),
        })
    }

    fn remote_path(&self, remote: &str) -> String {
        remote_target(&self.root, remote)
    }

    fn cancelled(&self) -> PublishError {
        PublishError::Cancelled {
            host: self.name.clone(),
        }
    }

    fn ensure_open(&self) -> Result<(), PublishError> {
        if self.life.is_open() {
            Ok(())
        } else {
            Err(self.cancelled())
        }
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<()> {
        if let Some(parent) = parent_of(remote) {
            create_dir_all(&self.sftp, parent)
                .await
                .with_context(|| format!("create remote directory {parent}"))?;
        }
        let mut reader = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("open {}", local.display()))?;
        let mut remote_file = self.sftp.create(remote).await?;
        tokio::io::copy(&mut reader, &mut remote_file).await?;
        remote_file.shutdown().await?;
        Ok(())
    }

    async fn exec_channel(&self, command: &str, use_pty: bool) -> Result<u32> {
        let mut channel = self.handle.channel_open_session().await?;
        if use_pty {
            channel.request_pty(false, "vt100", 80, 24, 0, 0, &[]).await?;
        }
        channel.exec(true, command).await?;

        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => {
                    info!(target: "sshpub::remote", "{}", String::from_utf8_lossy(&data).trim_end());
                }
                ChannelMsg::ExtendedData { data, ext: 1 } => {
                    warn!(target: "sshpub::remote", "{}", String::from_utf8_lossy(&data).trim_end());
                }
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                _ => {}
            }
        }
        exit_status.ok_or_else(|| anyhow!("channel closed without an exit status"))
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), PublishError> {
        self.ensure_open()?;
        let full = self.remote_path(remote);
        tokio::select! {
            _ = self.life.token().cancelled() => Err(self.cancelled()),
            res = self.put(local, &full) => res.map_err(|e| PublishError::Transfer {
                local: local.to_path_buf(),
                remote: full.clone(),
                reason: format!("{e:#}"),
            }),
        }
    }

    async fn run_command(&self, command: &str, use_pty: bool) -> Result<u32, PublishError> {
        self.ensure_open()?;
        tokio::select! {
            _ = self.life.token().cancelled() => Err(self.cancelled()),
            res = self.exec_channel(command, use_pty) => res.map_err(|e| PublishError::Exec {
                command: command.to_string(),
                reason: format!("{e:#}"),
            }),
        }
    }

    async fn clean(&self, remote_dir: &str) -> Result<(), PublishError> {
        self.ensure_open()?;
        let full = self.remote_path(remote_dir);
        tokio::select! {
            _ = self.life.token().cancelled() => Err(self.cancelled()),
            res = remove_dir_contents(&self.sftp, &full) => res.map_err(|e| PublishError::Clean {
                remote: full.clone(),
                reason: e.to_string(),
            }),
        }
    }

    async fn close(&self) {
        if !self.life.close() {
            return;
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("disconnect from {} failed: {e}", self.name);
        }
        info!("closed session to {}", self.name);
    }
}
