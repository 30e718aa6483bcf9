#![allow(dead_code)]

use async_trait::async_trait;
use sshpub_core::{Connector, Credential, HostConfiguration, PublishError, RemoteSession};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Everything the mock sessions did, shared with the test body.
#[derive(Debug, Default)]
pub struct Recorder {
    pub uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
    pub commands: Mutex<Vec<String>>,
    pub cleaned: Mutex<Vec<String>>,
    pub connects: Mutex<Vec<String>>,
    pub closes: AtomicUsize,
    /// Zero-based index of the upload that fails.
    pub fail_upload_at: Mutex<Option<usize>>,
    pub upload_delay: Mutex<Duration>,
    pub command_delay: Mutex<Duration>,
    pub exit_status: Mutex<u32>,
    pub unreachable: Mutex<Vec<String>>,
    /// Hosts whose connect attempt panics.
    pub crashing: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn remote_paths(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(_, remote, _)| remote.clone())
            .collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct MockSession {
    host: String,
    rec: Arc<Recorder>,
    closed: AtomicBool,
}

impl MockSession {
    pub fn new(host: &str, rec: Arc<Recorder>) -> Self {
        Self {
            host: host.to_string(),
            rec,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), PublishError> {
        if self.is_closed() {
            Err(PublishError::Cancelled {
                host: self.host.clone(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), PublishError> {
        self.check_open()?;
        let delay = *self.rec.upload_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            self.check_open()?;
        }
        let idx = self.rec.uploads.lock().unwrap().len();
        if *self.rec.fail_upload_at.lock().unwrap() == Some(idx) {
            return Err(PublishError::Transfer {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                reason: "connection reset by peer".into(),
            });
        }
        let data = fs::read(local).map_err(|e| PublishError::Transfer {
            local: local.to_path_buf(),
            remote: remote.to_string(),
            reason: e.to_string(),
        })?;
        self.rec.uploads.lock().unwrap().push((
            local.to_string_lossy().to_string(),
            remote.to_string(),
            data,
        ));
        Ok(())
    }

    async fn run_command(&self, command: &str, _use_pty: bool) -> Result<u32, PublishError> {
        self.check_open()?;
        self.rec.commands.lock().unwrap().push(command.to_string());
        let delay = *self.rec.command_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_open()?;
        Ok(*self.rec.exit_status.lock().unwrap())
    }

    async fn clean(&self, remote_dir: &str) -> Result<(), PublishError> {
        self.check_open()?;
        self.rec.cleaned.lock().unwrap().push(remote_dir.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.rec.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out sessions sharing one recorder.
pub struct MockConnector {
    pub rec: Arc<Recorder>,
}

#[async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self, host: &HostConfiguration) -> Result<MockSession, PublishError> {
        if self.rec.unreachable.lock().unwrap().contains(&host.name) {
            return Err(PublishError::Connection {
                host: host.address(),
                reason: "no route to host".into(),
            });
        }
        if self.rec.crashing.lock().unwrap().contains(&host.name) {
            panic!("connector crashed for {}", host.name);
        }
        self.rec.connects.lock().unwrap().push(host.name.clone());
        Ok(MockSession::new(&host.name, self.rec.clone()))
    }
}

pub fn host(name: &str) -> HostConfiguration {
    HostConfiguration {
        name: name.into(),
        hostname: format!("{name}.example.org"),
        port: 22,
        username: "ci".into(),
        credential: Credential::Password {
            password: "secret".into(),
        },
        remote_root_dir: "/srv".into(),
        disable_exec: false,
        timeout_ms: 1_000,
        keepalive_ms: 0,
        fingerprints: None,
    }
}

/// A temp directory holding `paths`, each file containing its own path.
pub fn workspace(paths: &[&str]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");
    for p in paths {
        let full: PathBuf = dir.path().join(p);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(&full, p.as_bytes()).unwrap();
    }
    dir
}
