use crate::error::PublishError;
use crate::utils::join_remote;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use std::fmt::{self, Write};
use tracing::warn;

/// Render a strftime pattern such as `releases/%Y-%m-%d` at `now`.
pub fn render_date_format<Tz>(format: &str, now: &DateTime<Tz>) -> Result<String, PublishError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return Err(PublishError::Config(format!("invalid date format `{format}`")));
    }
    let mut out = String::new();
    write!(out, "{}", now.format_with_items(items.iter()))
        .map_err(|_| PublishError::Config(format!("cannot render date format `{format}`")))?;
    Ok(out)
}

/// Drop empty and `.` segments and the leading `/`; any `..` is rejected so
/// the result stays below the remote root.
pub fn normalize_remote(path: &str) -> Result<String, PublishError> {
    let unified = path.replace('\\', "/");
    let mut parts = Vec::new();
    for seg in unified.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                return Err(PublishError::PathTraversal {
                    path: path.to_string(),
                })
            }
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

/// Maps relative local paths to remote paths for one transfer run. The
/// remote directory is rendered once so every file of the run lands in the
/// same dated directory.
#[derive(Debug, Clone)]
pub struct RemotePathBuilder {
    directory: String,
    remove_prefix: String,
    flatten: bool,
}

impl RemotePathBuilder {
    pub fn new<Tz>(
        remote_dir: &str,
        sdf: bool,
        remove_prefix: &str,
        flatten: bool,
        now: &DateTime<Tz>,
    ) -> Result<Self, PublishError>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let directory = if sdf {
            render_date_format(remote_dir, now)?
        } else {
            remote_dir.to_string()
        };
        Ok(Self {
            directory,
            remove_prefix: remove_prefix.trim().trim_matches('/').to_string(),
            flatten,
        })
    }

    /// The remote directory after date rendering, normalized.
    pub fn directory(&self) -> Result<String, PublishError> {
        normalize_remote(&self.directory)
    }

    pub fn build(&self, rel: &str) -> Result<String, PublishError> {
        let file_part = if self.flatten {
            rel.rsplit(['/', '\\']).next().unwrap_or(rel)
        } else if self.remove_prefix.is_empty() {
            rel
        } else {
            match rel
                .strip_prefix(self.remove_prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                Some(rest) => rest,
                None => {
                    warn!("prefix `{}` not found in `{rel}`, keeping full path", self.remove_prefix);
                    rel
                }
            }
        };
        normalize_remote(&join_remote(&self.directory, file_part))
    }
}

/// One-shot form of [`RemotePathBuilder`].
pub fn build_remote_path<Tz>(
    remote_dir: &str,
    sdf: bool,
    rel: &str,
    remove_prefix: &str,
    flatten: bool,
    now: &DateTime<Tz>,
) -> Result<String, PublishError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    RemotePathBuilder::new(remote_dir, sdf, remove_prefix, flatten, now)?.build(rel)
}
