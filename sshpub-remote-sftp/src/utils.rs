use russh_sftp::client::error::Error;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{Status, StatusCode};
use sshpub_core::join_remote;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

fn failure(message: String) -> Error {
    Error::Status(Status {
        id: 0, // not tied to a request
        status_code: StatusCode::Failure,
        error_message: message,
        language_tag: "en-US".to_string(),
    })
}

fn is_status(e: &Error, code: StatusCode) -> bool {
    matches!(e, Error::Status(status) if status.status_code == code)
}

/// Where `remote` lives on the server, given the host's remote root. An
/// empty result means the login directory.
pub(crate) fn remote_target(root: &str, remote: &str) -> String {
    let full = join_remote(root.trim(), remote);
    if full.is_empty() {
        ".".to_string()
    } else {
        full
    }
}

/// Open/closed flag plus the token that aborts in-flight work.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Mark closed and cancel the token. Returns false if already closed.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        true
    }
}

/// Parent directory of a `/`-separated remote path, if it has one.
pub(crate) fn parent_of(path: &str) -> Option<&str> {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => None,
        Some((parent, _)) => Some(parent),
    }
}

/// Create `path` and every missing ancestor.
///
/// Fails if the path, or any component of it, exists as a file.
pub async fn create_dir_all(sftp: &SftpSession, path: &str) -> Result<(), Error> {
    if let Ok(attrs) = sftp.metadata(path).await {
        return if attrs.is_dir() {
            Ok(())
        } else {
            Err(failure(format!("a file with the same name already exists: {path}")))
        };
    }

    let absolute = path.starts_with('/');
    let mut current = String::new();
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(seg);

        match sftp.create_dir(current.as_str()).await {
            Ok(()) => {}
            // Failure usually means it already exists; stat to find out.
            Err(e) if is_status(&e, StatusCode::Failure) => match sftp.metadata(current.as_str()).await {
                Ok(attrs) if attrs.is_dir() => {}
                Ok(_) => {
                    return Err(failure(format!(
                        "path component is a file, not a directory: {current}"
                    )))
                }
                Err(_) => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Delete everything below `path`, keeping `path` itself. A missing
/// directory counts as already clean.
pub async fn remove_dir_contents(sftp: &SftpSession, path: &str) -> Result<(), Error> {
    match sftp.metadata(path).await {
        Ok(attrs) if attrs.is_dir() => {}
        Ok(_) => return Err(failure(format!("path is not a directory: {path}"))),
        Err(e) if is_status(&e, StatusCode::NoSuchFile) => return Ok(()),
        Err(e) => return Err(e),
    }

    // iterative DFS, directories removed post-order
    let mut stack: Vec<(String, bool)> = vec![(path.to_string(), false)];
    while let Some((dir, visited)) = stack.pop() {
        if visited {
            if dir != path {
                sftp.remove_dir(dir.as_str()).await?;
            }
            continue;
        }
        stack.push((dir.clone(), true));
        for entry in sftp.read_dir(dir.as_str()).await? {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let child = format!("{}/{}", dir.trim_end_matches('/'), name);
            if entry.metadata().is_dir() {
                stack.push((child, false));
            } else {
                sftp.remove_file(child).await?;
            }
        }
    }
    Ok(())
}
