use crate::error::PublishError;
use crate::utils::as_posix_path;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Version-control metadata and editor leftovers that are never published
/// unless a transfer opts out with `no_default_excludes`.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/*~",
    "**/#*#",
    "**/.#*",
    "**/%*%",
    "**/._*",
    "**/CVS/**",
    "**/.cvsignore",
    "**/SCCS/**",
    "**/vssver.scc",
    "**/.svn/**",
    "**/.DS_Store",
    "**/.git/**",
    "**/.gitattributes",
    "**/.gitignore",
    "**/.gitmodules",
    "**/.hg/**",
    "**/.hgignore",
    "**/.hgsub",
    "**/.hgsubstate",
    "**/.hgtags",
    "**/.bzr/**",
    "**/.bzrignore",
];

/// Knobs for [`resolve`]; mirrors the matching-related transfer fields.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub separator: String,
    pub case_insensitive: bool,
    pub default_excludes: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            separator: crate::TransferSpec::DEFAULT_PATTERN_SEPARATOR.to_string(),
            case_insensitive: false,
            default_excludes: true,
        }
    }
}

/// Runtime filter compiled from include / exclude pattern lists.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl PathFilter {
    /// Compile a filter. Unlike a sync filter, an empty include list matches
    /// nothing, and any pattern that fails to compile is an error.
    pub fn new(include: &[String], exclude: &[String], case_insensitive: bool) -> Result<Self, PublishError> {
        Ok(Self {
            include: build_set(include, case_insensitive)?,
            exclude: build_set(exclude, case_insensitive)?,
        })
    }

    /// Whether a path relative to the resolve root is selected.
    pub fn check<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        self.include.is_match(path) && !self.exclude.is_match(path)
    }
}

fn build_set(patterns: &[String], case_insensitive: bool) -> Result<GlobSet, PublishError> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| PublishError::Pattern {
                pattern: pat.clone(),
                reason: e.kind().to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| PublishError::Pattern {
        pattern: patterns.join(","),
        reason: e.to_string(),
    })
}

/// Split a pattern field on `separator`. A trailing `/` selects the whole
/// directory, like `dir/**`.
pub fn split_patterns(value: &str, separator: &str) -> Result<Vec<String>, PublishError> {
    let sep = Regex::new(separator).map_err(|e| PublishError::Pattern {
        pattern: separator.to_string(),
        reason: e.to_string(),
    })?;
    Ok(sep
        .split(value.trim())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let p = p.strip_prefix("./").unwrap_or(p);
            if p.ends_with('/') {
                format!("{p}**")
            } else {
                p.to_string()
            }
        })
        .collect())
}

/// Expand `include` minus `exclude` below `root` into relative,
/// `/`-separated file paths in lexicographic order.
pub fn resolve(root: &Path, include: &str, exclude: &str, opts: &ResolveOptions) -> Result<Vec<String>, PublishError> {
    let includes = split_patterns(include, &opts.separator)?;
    let mut excludes = split_patterns(exclude, &opts.separator)?;
    if includes.is_empty() {
        if !excludes.is_empty() {
            return Err(PublishError::Pattern {
                pattern: exclude.to_string(),
                reason: "excludes given without any source files".into(),
            });
        }
        return Ok(Vec::new());
    }
    if !root.is_dir() {
        return Err(PublishError::Config(format!(
            "source root {} is not a directory",
            root.display()
        )));
    }
    if opts.default_excludes {
        excludes.extend(DEFAULT_EXCLUDES.iter().map(|s| s.to_string()));
    }
    let filter = PathFilter::new(&includes, &excludes, opts.case_insensitive)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root);
            PublishError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = as_posix_path(rel);
        if filter.check(&rel) {
            files.push(rel);
        }
    }
    files.sort();
    debug!("resolved {} file(s) for `{include}` below {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree(paths: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for p in paths {
            let full = dir.path().join(p);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, p.as_bytes()).unwrap();
        }
        dir
    }

    #[test]
    fn test_filter_basic() {
        let include = vec!["**/*.rs".to_string()];
        let exclude = vec!["tests/**".to_string()];
        let filter = PathFilter::new(&include, &exclude, false).unwrap();
        assert!(filter.check("src/lib.rs"));
        assert!(!filter.check("tests/main.rs"));
        assert!(!filter.check("README.md"));
    }

    #[test]
    fn test_empty_include_matches_nothing() {
        let filter = PathFilter::new(&[], &[], false).unwrap();
        assert!(!filter.check("a.txt"));
    }

    #[test]
    fn test_split_patterns() {
        let pats = split_patterns(" a/*.jar, b/**  ./c.txt,target/", "[, ]+").unwrap();
        assert_eq!(pats, vec!["a/*.jar", "b/**", "c.txt", "target/**"]);
        let pats = split_patterns("a b;c", ";").unwrap();
        assert_eq!(pats, vec!["a b", "c"]);
        assert!(matches!(split_patterns("x", "("), Err(PublishError::Pattern { .. })));
    }

    #[test]
    fn test_resolve_sorted_and_idempotent() {
        let dir = tree(&["z.txt", "b/c.txt", "a.txt", "b/a.txt", "b/d.bin"]);
        let opts = ResolveOptions::default();
        let first = resolve(dir.path(), "**/*.txt", "", &opts).unwrap();
        assert_eq!(first, vec!["a.txt", "b/a.txt", "b/c.txt", "z.txt"]);
        let second = resolve(dir.path(), "**/*.txt", "", &opts).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_excludes_and_defaults() {
        let dir = tree(&["dist/app.js", "dist/app.js.map", "dist/.git/HEAD", "dist/notes~"]);
        let opts = ResolveOptions::default();
        let files = resolve(dir.path(), "dist/**", "**/*.map", &opts).unwrap();
        assert_eq!(files, vec!["dist/app.js"]);

        let opts = ResolveOptions {
            default_excludes: false,
            ..ResolveOptions::default()
        };
        let files = resolve(dir.path(), "dist/**", "**/*.map", &opts).unwrap();
        assert_eq!(files, vec!["dist/.git/HEAD", "dist/app.js", "dist/notes~"]);
    }

    #[test]
    fn test_resolve_case_sensitivity() {
        let dir = tree(&["README.MD", "docs/guide.md"]);
        let opts = ResolveOptions::default();
        assert_eq!(resolve(dir.path(), "**/*.md", "", &opts).unwrap(), vec!["docs/guide.md"]);
        let opts = ResolveOptions {
            case_insensitive: true,
            ..ResolveOptions::default()
        };
        assert_eq!(
            resolve(dir.path(), "**/*.md", "", &opts).unwrap(),
            vec!["README.MD", "docs/guide.md"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_follows_symlinks() {
        use std::os::unix::fs::symlink;
        let dir = tree(&["real.jar", "libs/dep.jar"]);
        fs::create_dir(dir.path().join("build")).unwrap();
        symlink("../real.jar", dir.path().join("build/app.jar")).unwrap();
        symlink("../libs", dir.path().join("build/lib")).unwrap();
        let opts = ResolveOptions::default();
        assert_eq!(
            resolve(dir.path(), "build/**", "", &opts).unwrap(),
            vec!["build/app.jar", "build/lib/dep.jar"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_fails_on_symlink_loop() {
        use std::os::unix::fs::symlink;
        let dir = tree(&["a/b/c.txt"]);
        symlink("..", dir.path().join("a/b/up")).unwrap();
        let opts = ResolveOptions::default();
        let err = resolve(dir.path(), "**/*.txt", "", &opts).unwrap_err();
        match err {
            PublishError::Config(msg) => assert!(msg.contains("up"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_edge_cases() {
        let dir = tree(&["a.txt"]);
        let opts = ResolveOptions::default();
        assert!(resolve(dir.path(), "*.jar", "", &opts).unwrap().is_empty());
        assert!(resolve(dir.path(), "", "", &opts).unwrap().is_empty());
        assert!(matches!(
            resolve(dir.path(), "", "*.txt", &opts),
            Err(PublishError::Pattern { .. })
        ));
        assert!(matches!(
            resolve(dir.path(), "a[", "", &opts),
            Err(PublishError::Pattern { .. })
        ));
        assert!(matches!(
            resolve(&dir.path().join("missing"), "*", "", &opts),
            Err(PublishError::Config(_))
        ));
    }
}
