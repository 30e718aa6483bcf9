use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

pub fn as_posix_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Join remote path segments with `/`, skipping empty ones. A base of `/`
/// stays the filesystem root.
pub fn join_remote(base: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches('/');
    if !base.is_empty() && base.trim_end_matches('/').is_empty() {
        return format!("/{rel}");
    }
    let base = base.trim_end_matches('/');
    match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{rel}"),
    }
}

/// Substitute `$NAME` and `${NAME}` from `vars`. Unknown names are left as
/// written.
pub fn expand_vars(input: &str, vars: &HashMap<String, String>) -> String {
    static VAR: OnceLock<Regex> = OnceLock::new();
    if vars.is_empty() || !input.contains('$') {
        return input.to_string();
    }
    let re = VAR.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("variable regex is valid")
    });
    re.replace_all(input, |caps: &Captures| {
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        match vars.get(name) {
            Some(v) => v.clone(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}
