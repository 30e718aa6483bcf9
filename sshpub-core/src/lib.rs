//! Core library for sshpub: publishes build artifacts to SSH hosts and runs
//! a remote command afterwards.

mod config;
mod error;
mod executor;
mod filter;
mod manager;
mod registry;
mod remote;
mod remote_path;
mod utils;
pub mod validate;

pub use config::{Credential, HostConfiguration, PublishConfig, PublishJob, TransferSpec};
pub use error::{PublishError, ValidationError};
pub use executor::{FileOutcome, FileStatus, ResolvedFile, StepState, TransferExecutor, TransferResult};
pub use filter::{resolve, split_patterns, PathFilter, ResolveOptions, DEFAULT_EXCLUDES};
pub use manager::{join_all, JobResult, PublishHandle, PublishManager, StopHandle, TaskCommand};
pub use registry::HostRegistry;
pub use remote::{Connector, RemoteSession};
pub use remote_path::{build_remote_path, normalize_remote, render_date_format, RemotePathBuilder};
pub use utils::{as_posix_path, expand_vars, join_remote};
