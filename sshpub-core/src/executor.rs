use crate::{
    config::{HostConfiguration, TransferSpec},
    error::PublishError,
    filter::{resolve, ResolveOptions},
    remote::RemoteSession,
    remote_path::RemotePathBuilder,
    utils::expand_vars,
};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Progress of one transfer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Idle,
    Resolving,
    Uploading,
    Executing,
    Done,
    Failed,
}

/// A local file matched by a transfer and where it goes remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub local: PathBuf,
    pub relative: String,
    pub remote: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Uploaded,
    Failed(PublishError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub local: PathBuf,
    pub remote: String,
    pub status: FileStatus,
}

/// Outcome of one transfer step, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub files: Vec<FileOutcome>,
    /// Set when the exec command ran to completion.
    pub exit_status: Option<u32>,
    pub state: StepState,
    pub error: Option<PublishError>,
}

impl TransferResult {
    fn new() -> Self {
        Self {
            files: Vec::new(),
            exit_status: None,
            state: StepState::Idle,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == StepState::Done
    }

    pub fn uploaded(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Uploaded)
            .count()
    }
}

/// Drives one [`TransferSpec`]: resolve, upload each file in order, then
/// run the optional command. The first failure ends the step; nothing is
/// retried or rolled back.
#[derive(Debug)]
pub struct TransferExecutor {
    root: PathBuf,
    env: HashMap<String, String>,
    state_tx: Option<watch::Sender<StepState>>,
}

impl TransferExecutor {
    /// `root` is the local directory source patterns are resolved against.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            env: HashMap::new(),
            state_tx: None,
        }
    }

    /// Variables substituted into pattern, directory, prefix and command.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Publish state transitions to a watch channel.
    pub fn with_state(mut self, tx: watch::Sender<StepState>) -> Self {
        self.state_tx = Some(tx);
        self
    }

    fn set_state(&self, state: StepState) {
        if let Some(tx) = &self.state_tx {
            let _ = tx.send(state);
        }
    }

    fn expanded(&self, spec: &TransferSpec) -> TransferSpec {
        TransferSpec {
            source_files: expand_vars(&spec.source_files, &self.env),
            excludes: expand_vars(&spec.excludes, &self.env),
            remote_directory: expand_vars(&spec.remote_directory, &self.env),
            remove_prefix: expand_vars(&spec.remove_prefix, &self.env),
            exec_command: expand_vars(&spec.exec_command, &self.env),
            ..spec.clone()
        }
    }

    /// Resolve the files of `spec` and compute their remote paths without
    /// touching the network.
    pub fn plan(&self, spec: &TransferSpec, now: &DateTime<Local>) -> Result<Vec<ResolvedFile>, PublishError> {
        self.plan_expanded(&self.expanded(spec), now)
    }

    fn plan_expanded(&self, spec: &TransferSpec, now: &DateTime<Local>) -> Result<Vec<ResolvedFile>, PublishError> {
        let opts = ResolveOptions {
            separator: spec.pattern_separator.clone(),
            case_insensitive: spec.case_insensitive,
            default_excludes: !spec.no_default_excludes,
        };
        let files = resolve(&self.root, &spec.source_files, &spec.excludes, &opts)?;
        let builder = RemotePathBuilder::new(
            &spec.remote_directory,
            spec.remote_directory_sdf,
            &spec.remove_prefix,
            spec.flatten,
            now,
        )?;
        let mut targets: HashMap<String, String> = HashMap::with_capacity(files.len());
        let mut planned = Vec::with_capacity(files.len());
        for rel in files {
            let remote = builder.build(&rel)?;
            if let Some(prev) = targets.insert(remote.clone(), rel.clone()) {
                return Err(PublishError::Config(format!(
                    "`{prev}` and `{rel}` would both be uploaded to `{remote}`"
                )));
            }
            planned.push(ResolvedFile {
                local: self.root.join(&rel),
                relative: rel,
                remote,
            });
        }
        Ok(planned)
    }

    pub async fn execute<S>(
        &self,
        spec: &TransferSpec,
        host: &HostConfiguration,
        session: &S,
        now: &DateTime<Local>,
    ) -> TransferResult
    where
        S: RemoteSession + ?Sized,
    {
        let mut result = TransferResult::new();
        match self.run(&self.expanded(spec), host, session, now, &mut result).await {
            Ok(()) => {
                result.state = StepState::Done;
                info!(
                    "transfer to {} done: {} file(s) uploaded",
                    host.name,
                    result.uploaded()
                );
            }
            Err(e) => {
                error!("transfer to {} failed: {e}", host.name);
                result.state = StepState::Failed;
                result.error = Some(e);
            }
        }
        self.set_state(result.state);
        result
    }

    async fn run<S>(
        &self,
        spec: &TransferSpec,
        host: &HostConfiguration,
        session: &S,
        now: &DateTime<Local>,
        result: &mut TransferResult,
    ) -> Result<(), PublishError>
    where
        S: RemoteSession + ?Sized,
    {
        let nothing = || PublishError::NothingToTransfer {
            pattern: spec.source_files.clone(),
        };
        spec.validate().map_err(|_| nothing())?;

        let run_exec = spec.has_exec_command() && !host.is_effective_disable_exec();
        if spec.has_exec_command() && !run_exec {
            warn!(
                "exec is disabled for {}, skipping `{}`",
                host.name, spec.exec_command
            );
        }

        self.set_state(StepState::Resolving);
        let planned = self.plan_expanded(spec, now)?;
        if planned.is_empty() && !run_exec {
            return Err(nothing());
        }

        self.set_state(StepState::Uploading);
        if spec.clean_remote && spec.has_source_files() {
            let dir = RemotePathBuilder::new(
                &spec.remote_directory,
                spec.remote_directory_sdf,
                &spec.remove_prefix,
                spec.flatten,
                now,
            )?
            .directory()?;
            info!("cleaning remote directory `{dir}` on {}", host.name);
            session.clean(&dir).await?;
        }
        for file in planned {
            info!("{} -> {}:{}", file.relative, host.name, file.remote);
            match session.upload(&file.local, &file.remote).await {
                Ok(()) => result.files.push(FileOutcome {
                    local: file.local,
                    remote: file.remote,
                    status: FileStatus::Uploaded,
                }),
                Err(e) => {
                    result.files.push(FileOutcome {
                        local: file.local,
                        remote: file.remote,
                        status: FileStatus::Failed(e.clone()),
                    });
                    return Err(e);
                }
            }
        }

        if run_exec {
            self.set_state(StepState::Executing);
            info!("running `{}` on {}", spec.exec_command, host.name);
            let status = session
                .exec(&spec.exec_command, spec.exec_timeout, spec.use_pty)
                .await?;
            result.exit_status = Some(status);
            if status != 0 {
                return Err(PublishError::NonZeroExit {
                    command: spec.exec_command.clone(),
                    status,
                });
            }
        }
        Ok(())
    }
}
