use crate::error::ValidationError;
use crate::validate::check_transfer_set;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// One publish step: a file set plus an optional remote command.
///
/// The record accepts any combination of fields; the "source files or exec
/// command" rule is enforced by [`TransferSpec::validate`] and again when the
/// step executes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferSpec {
    #[serde(default)]
    pub source_files: String,
    #[serde(default)]
    pub excludes: String,
    #[serde(default)]
    pub remote_directory: String,
    /// Render `remote_directory` as a strftime format at run time.
    #[serde(default)]
    pub remote_directory_sdf: bool,
    #[serde(default)]
    pub remove_prefix: String,
    #[serde(default)]
    pub flatten: bool,
    #[serde(default)]
    pub exec_command: String,
    /// Milliseconds; 0 disables the timeout.
    #[serde(default = "TransferSpec::default_exec_timeout")]
    pub exec_timeout: u64,
    /// Regex splitting `source_files` and `excludes` into single patterns.
    #[serde(default = "TransferSpec::default_pattern_separator")]
    pub pattern_separator: String,
    #[serde(default)]
    pub no_default_excludes: bool,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub clean_remote: bool,
    #[serde(default)]
    pub use_pty: bool,
}

impl TransferSpec {
    pub const DEFAULT_EXEC_TIMEOUT: u64 = 120_000;
    pub const DEFAULT_PATTERN_SEPARATOR: &'static str = "[, ]+";

    fn default_exec_timeout() -> u64 {
        Self::DEFAULT_EXEC_TIMEOUT
    }
    fn default_pattern_separator() -> String {
        Self::DEFAULT_PATTERN_SEPARATOR.to_string()
    }

    /// Upload `source_files` into `remote_directory`, everything else defaulted.
    pub fn files(source_files: impl Into<String>, remote_directory: impl Into<String>) -> Self {
        Self {
            source_files: source_files.into(),
            remote_directory: remote_directory.into(),
            ..Self::default()
        }
    }

    /// Only run `command`, no files.
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            exec_command: command.into(),
            ..Self::default()
        }
    }

    pub fn has_source_files(&self) -> bool {
        !self.source_files.trim().is_empty()
    }

    pub fn has_exec_command(&self) -> bool {
        !self.exec_command.trim().is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_transfer_set(&self.source_files, &self.exec_command)
    }
}

impl Default for TransferSpec {
    fn default() -> Self {
        Self {
            source_files: String::new(),
            excludes: String::new(),
            remote_directory: String::new(),
            remote_directory_sdf: false,
            remove_prefix: String::new(),
            flatten: false,
            exec_command: String::new(),
            exec_timeout: Self::DEFAULT_EXEC_TIMEOUT,
            pattern_separator: Self::default_pattern_separator(),
            no_default_excludes: false,
            case_insensitive: false,
            clean_remote: false,
            use_pty: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    Password {
        password: String,
    },
    KeyFile {
        path: PathBuf,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

/// Connection parameters for one named SSH server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfiguration {
    pub name: String,
    pub hostname: String,
    #[serde(default = "HostConfiguration::default_port")]
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    /// Every remote path of a transfer is resolved below this directory.
    /// Empty means the login directory.
    #[serde(default)]
    pub remote_root_dir: String,
    #[serde(default)]
    pub disable_exec: bool,
    #[serde(default = "HostConfiguration::default_timeout_ms")]
    pub timeout_ms: u64,
    /// 0 disables keepalive messages.
    #[serde(default)]
    pub keepalive_ms: u64,
    /// Accepted server keys, as OpenSSH SHA256 fingerprints or base64 keys.
    /// `None` accepts any key.
    #[serde(default)]
    pub fingerprints: Option<Vec<String>>,
}

impl HostConfiguration {
    pub const DEFAULT_PORT: u16 = 22;
    pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

    fn default_port() -> u16 {
        Self::DEFAULT_PORT
    }
    fn default_timeout_ms() -> u64 {
        Self::DEFAULT_TIMEOUT_MS
    }

    pub fn is_effective_disable_exec(&self) -> bool {
        self.disable_exec
    }

    /// `host:port`, for log lines and error messages.
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// A sequence of transfer steps run against one host over one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishJob {
    pub host: String,
    #[serde(default)]
    pub transfers: Vec<TransferSpec>,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub hosts: Vec<HostConfiguration>,
    #[serde(default)]
    pub jobs: Vec<PublishJob>,
}

impl PublishConfig {
    /// Checks host names are unique, every job names a known host, and every
    /// transfer passes the source-or-exec rules for its host.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for host in &self.hosts {
            if !seen.insert(host.name.as_str()) {
                return Err(ValidationError::DuplicateHost(host.name.clone()));
            }
        }
        for job in &self.jobs {
            let host = self
                .hosts
                .iter()
                .find(|h| h.name == job.host)
                .ok_or_else(|| ValidationError::ConfigNotFound(job.host.clone()))?;
            for transfer in &job.transfers {
                if host.is_effective_disable_exec() && !transfer.has_source_files() {
                    return Err(ValidationError::SourceFilesRequired(host.name.clone()));
                }
                transfer.validate()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> HostConfiguration {
        HostConfiguration {
            name: name.into(),
            hostname: "example.org".into(),
            port: 22,
            username: "deploy".into(),
            credential: Credential::Password {
                password: "secret".into(),
            },
            remote_root_dir: String::new(),
            disable_exec: false,
            timeout_ms: HostConfiguration::DEFAULT_TIMEOUT_MS,
            keepalive_ms: 0,
            fingerprints: None,
        }
    }

    #[test]
    fn test_transfer_defaults_from_yaml() {
        let spec: TransferSpec = serde_yaml::from_str("source_files: build/*.jar\n").unwrap();
        assert_eq!(spec.exec_timeout, TransferSpec::DEFAULT_EXEC_TIMEOUT);
        assert_eq!(spec.pattern_separator, "[, ]+");
        assert!(!spec.flatten);
        assert!(spec.remote_directory.is_empty());
    }

    #[test]
    fn test_config_rejects_duplicate_hosts() {
        let cfg = PublishConfig {
            hosts: vec![host("a"), host("a")],
            jobs: vec![],
        };
        assert_eq!(cfg.validate(), Err(ValidationError::DuplicateHost("a".into())));
    }

    #[test]
    fn test_config_rejects_unknown_job_host() {
        let cfg = PublishConfig {
            hosts: vec![host("a")],
            jobs: vec![PublishJob {
                host: "b".into(),
                transfers: vec![TransferSpec::command("true")],
            }],
        };
        assert_eq!(cfg.validate(), Err(ValidationError::ConfigNotFound("b".into())));
    }

    #[test]
    fn test_config_exec_only_needs_exec_enabled() {
        let mut h = host("a");
        h.disable_exec = true;
        let mut cfg = PublishConfig {
            hosts: vec![h],
            jobs: vec![PublishJob {
                host: "a".into(),
                transfers: vec![TransferSpec::command("ls")],
            }],
        };
        assert_eq!(cfg.validate(), Err(ValidationError::SourceFilesRequired("a".into())));
        cfg.hosts[0].disable_exec = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_credential_tagged_yaml() {
        let yaml = "name: web\nhostname: web.local\nusername: ci\ncredential:\n  type: key_file\n  path: /home/ci/.ssh/id_ed25519\n";
        let h: HostConfiguration = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(h.port, 22);
        assert!(matches!(h.credential, Credential::KeyFile { passphrase: None, .. }));
    }
}
