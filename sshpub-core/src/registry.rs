use crate::config::{HostConfiguration, PublishConfig};
use crate::error::{PublishError, ValidationError};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Named host configurations. Lookups take a read lock and clone the entry,
/// so publish runs never hold the lock across network calls.
#[derive(Debug, Default)]
pub struct HostRegistry {
    hosts: RwLock<HashMap<String, HostConfiguration>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &PublishConfig) -> Result<Self, ValidationError> {
        let registry = Self::new();
        for host in &cfg.hosts {
            if registry.insert(host.clone()).is_some() {
                return Err(ValidationError::DuplicateHost(host.name.clone()));
            }
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<HostConfiguration> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Like [`get`](Self::get), but a missing name is a hard error.
    pub fn require(&self, name: &str) -> Result<HostConfiguration, PublishError> {
        self.get(name)
            .ok_or_else(|| PublishError::ConfigNotFound(name.to_string()))
    }

    /// Adds or replaces a host, returning the previous entry.
    pub fn insert(&self, host: HostConfiguration) -> Option<HostConfiguration> {
        self.hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.name.clone(), host)
    }

    pub fn remove(&self, name: &str) -> Option<HostConfiguration> {
        self.hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Sorted host names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;

    fn host(name: &str, hostname: &str) -> HostConfiguration {
        HostConfiguration {
            name: name.into(),
            hostname: hostname.into(),
            port: 2222,
            username: "ci".into(),
            credential: Credential::Password { password: String::new() },
            remote_root_dir: String::new(),
            disable_exec: false,
            timeout_ms: 1000,
            keepalive_ms: 0,
            fingerprints: None,
        }
    }

    #[test]
    fn test_lookup_and_replace() {
        let reg = HostRegistry::new();
        assert!(reg.insert(host("b", "one")).is_none());
        reg.insert(host("a", "two"));
        assert_eq!(reg.names(), vec!["a", "b"]);
        let old = reg.insert(host("b", "three")).unwrap();
        assert_eq!(old.hostname, "one");
        assert_eq!(reg.get("b").unwrap().address(), "three:2222");
        assert!(reg.remove("a").is_some());
        assert_eq!(reg.require("a"), Err(PublishError::ConfigNotFound("a".into())));
    }

    #[test]
    fn test_from_config_rejects_duplicates() {
        let cfg = PublishConfig {
            hosts: vec![host("a", "x"), host("a", "y")],
            jobs: vec![],
        };
        assert_eq!(
            HostRegistry::from_config(&cfg).unwrap_err(),
            ValidationError::DuplicateHost("a".into())
        );
    }
}
