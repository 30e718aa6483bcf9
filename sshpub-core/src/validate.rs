//! Stateless checks shared by configuration loading and step execution.

use crate::error::ValidationError;
use crate::registry::HostRegistry;

fn non_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// A transfer needs source files, an exec command, or both.
pub fn check_transfer_set(source_files: &str, exec_command: &str) -> Result<(), ValidationError> {
    if non_blank(source_files) || non_blank(exec_command) {
        Ok(())
    } else {
        Err(ValidationError::SourceOrExecRequired)
    }
}

/// Parses an exec timeout entered as text. Must be a non-negative integer
/// (milliseconds).
pub fn check_exec_timeout(value: &str) -> Result<u64, ValidationError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ValidationError::InvalidTimeout(value.to_string()))
}

/// Source-files check that also looks at the selected host: an unknown host
/// is an error, and a host with exec disabled requires source files.
pub fn check_source_files(
    registry: &HostRegistry,
    config_name: Option<&str>,
    source_files: &str,
    exec_command: &str,
) -> Result<(), ValidationError> {
    if let Some(name) = config_name.map(str::trim).filter(|n| !n.is_empty()) {
        let host = registry
            .get(name)
            .ok_or_else(|| ValidationError::ConfigNotFound(name.to_string()))?;
        if host.is_effective_disable_exec() {
            return if non_blank(source_files) {
                Ok(())
            } else {
                Err(ValidationError::SourceFilesRequired(name.to_string()))
            };
        }
    }
    check_transfer_set(source_files, exec_command)
}
