use crate::{
    config::{HostConfiguration, PublishJob},
    error::PublishError,
    executor::{StepState, TransferExecutor, TransferResult},
    registry::HostRegistry,
    remote::{Connector, RemoteSession},
};
use chrono::Local;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub type JobResult = Result<Vec<TransferResult>, PublishError>;

#[derive(Debug, Clone)]
pub enum TaskCommand {
    Stop,
}

/// Cloneable stop switch for a spawned job.
#[derive(Debug, Clone)]
pub struct StopHandle(mpsc::Sender<TaskCommand>);

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.0.try_send(TaskCommand::Stop);
    }
}

/// Handle to a job running on its own task.
#[derive(Debug)]
pub struct PublishHandle {
    host: String,
    stopper: StopHandle,
    state_rx: watch::Receiver<StepState>,
    join: JoinHandle<JobResult>,
}

impl PublishHandle {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Close the job's session; in-flight uploads and commands fail.
    pub fn stop(&self) {
        self.stopper.stop();
    }

    pub fn stopper(&self) -> StopHandle {
        self.stopper.clone()
    }

    pub fn state(&self) -> StepState {
        *self.state_rx.borrow()
    }

    /// Wait for the job. A panic inside the job is resumed on the caller.
    pub async fn join(self) -> JobResult {
        match self.join.await {
            Ok(res) => res,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                warn!("publish task for {} ended abnormally: {e}", self.host);
                Err(PublishError::Cancelled { host: self.host })
            }
        }
    }
}

/// Runs publish jobs. Each job gets its own session; sessions are never
/// shared between jobs.
pub struct PublishManager<C: Connector> {
    registry: Arc<HostRegistry>,
    connector: Arc<C>,
    root: PathBuf,
    env: HashMap<String, String>,
}

impl<C: Connector> PublishManager<C> {
    pub fn new(registry: Arc<HostRegistry>, connector: C, root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            connector: Arc::new(connector),
            root: root.into(),
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn executor(&self) -> TransferExecutor {
        TransferExecutor::new(self.root.clone()).with_env(self.env.clone())
    }

    /// Run `job` on the current task: connect once, run every transfer on
    /// that session, then close it.
    pub async fn publish(&self, job: &PublishJob) -> JobResult {
        let host = self.registry.require(&job.host)?;
        let session = self.connector.connect(&host).await?;
        let results = run_transfers(&self.executor(), job, &host, &session).await;
        session.close().await;
        Ok(results)
    }

    pub fn spawn(&self, job: PublishJob) -> PublishHandle {
        let (ctrl_tx, ctrl_rx) = mpsc::channel(4);
        let (state_tx, state_rx) = watch::channel(StepState::Idle);
        let host = job.host.clone();
        let executor = self.executor().with_state(state_tx);
        let lookup = self.registry.require(&job.host);
        let connector = self.connector.clone();
        let join = tokio::spawn(async move {
            let host = lookup?;
            run_spawned(connector, executor, job, host, ctrl_rx).await
        });
        PublishHandle {
            host,
            stopper: StopHandle(ctrl_tx),
            state_rx,
            join,
        }
    }

    pub fn spawn_all(&self, jobs: Vec<PublishJob>) -> Vec<PublishHandle> {
        jobs.into_iter().map(|job| self.spawn(job)).collect()
    }

    /// Run all jobs concurrently. Results come back in job order.
    pub async fn publish_all(&self, jobs: Vec<PublishJob>) -> Vec<JobResult> {
        join_all(self.spawn_all(jobs)).await
    }
}

pub async fn join_all(handles: Vec<PublishHandle>) -> Vec<JobResult> {
    futures::future::join_all(handles.into_iter().map(PublishHandle::join)).await
}

async fn run_spawned<C: Connector>(
    connector: Arc<C>,
    executor: TransferExecutor,
    job: PublishJob,
    host: HostConfiguration,
    mut ctrl_rx: mpsc::Receiver<TaskCommand>,
) -> JobResult {
    let session = tokio::select! {
        res = connector.connect(&host) => Arc::new(res?),
        Some(TaskCommand::Stop) = ctrl_rx.recv() => {
            return Err(PublishError::Cancelled { host: host.name.clone() });
        }
    };

    let stopper = {
        let session = session.clone();
        let name = host.name.clone();
        tokio::spawn(async move {
            if let Some(TaskCommand::Stop) = ctrl_rx.recv().await {
                info!("stop requested for {name}, closing session");
                session.close().await;
            }
        })
    };
    let results = run_transfers(&executor, &job, &host, &*session).await;
    stopper.abort();
    session.close().await;
    Ok(results)
}

async fn run_transfers<S: RemoteSession + ?Sized>(
    executor: &TransferExecutor,
    job: &PublishJob,
    host: &HostConfiguration,
    session: &S,
) -> Vec<TransferResult> {
    let now = Local::now();
    let mut results = Vec::with_capacity(job.transfers.len());
    for (idx, spec) in job.transfers.iter().enumerate() {
        let result = executor.execute(spec, host, session, &now).await;
        let failed = !result.succeeded();
        results.push(result);
        if failed {
            let skipped = job.transfers.len() - idx - 1;
            if skipped > 0 {
                warn!("skipping {skipped} remaining transfer(s) for {}", host.name);
            }
            break;
        }
    }
    results
}
