//! Host-group store (C8): a small JSON document naming a reusable set of nodes,
//! persisted under `/var/lib/sos-collector/<name>` unless a literal path is given.
//!
//! Grounded in the original's `_load_group_config`/`write_host_group`: the group
//! directory is never created on the fly (spec §9 Open Question 1 — resolved as
//! "raise, not create"), `master`/`cluster_type` loaded from the group file only
//! override the CLI-provided value when non-empty, and `nodes` are appended to
//! whatever `--nodes` already specified rather than replacing them.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const GROUP_DIR: &str = "/var/lib/sos-collector";

#[derive(Debug, Error)]
pub enum Error {
    #[error("host group directory {0} does not exist; create it before saving a group")]
    DirectoryMissing(PathBuf),

    #[error("host group {0} not found")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed host group file: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostGroup {
    pub name: String,
    #[serde(default)]
    pub master: String,
    #[serde(default)]
    pub cluster_type: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Resolves the path a group name addresses: a literal path if `name` contains a
/// separator, otherwise `/var/lib/sos-collector/<name>`.
fn resolve_path(name: &str) -> PathBuf {
    if name.contains('/') {
        PathBuf::from(name)
    } else {
        Path::new(GROUP_DIR).join(name)
    }
}

pub fn load(name: &str) -> Result<HostGroup, Error> {
    let path = resolve_path(name);
    let contents = fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(name.to_string())
        } else {
            Error::Io(e)
        }
    })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Applies a loaded group onto the in-progress run configuration: `master` and
/// `cluster_type` are overridden only when the group supplies a non-empty value,
/// and `nodes` are appended, never replacing the caller's own `--nodes` list.
pub fn apply(group: &HostGroup, master: &mut Option<String>, cluster_type: &mut Option<String>, nodes: &mut Vec<String>) {
    if !group.master.is_empty() {
        *master = Some(group.master.clone());
    }
    if !group.cluster_type.is_empty() {
        *cluster_type = Some(group.cluster_type.clone());
    }
    nodes.extend(group.nodes.iter().cloned());
}

/// Writes `group` to `/var/lib/sos-collector/<name>` with mode 0644. Fails rather
/// than creating the parent directory (spec §9 Open Question 1): an operator who
/// hasn't provisioned the group store shouldn't have one silently created under
/// them on first `--save-group` use.
pub fn save(group: &HostGroup) -> Result<PathBuf, Error> {
    let dir = Path::new(GROUP_DIR);
    if !dir.is_dir() {
        return Err(Error::DirectoryMissing(dir.to_path_buf()));
    }

    let path = dir.join(&group.name);
    let contents = serde_json::to_string_pretty(group)?;
    fs::write(&path, contents)?;

    let mut perms = fs::metadata(&path)?.permissions();
    perms.set_mode(0o644);
    fs::set_permissions(&path, perms)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_overrides_master_and_cluster_type_only_when_non_empty() {
        let group = HostGroup {
            name: "prod".into(),
            master: String::new(),
            cluster_type: "ovirt".into(),
            nodes: vec!["a.example".into()],
        };
        let mut master = Some("preexisting.example".to_string());
        let mut cluster_type = None;
        let mut nodes = vec!["b.example".to_string()];

        apply(&group, &mut master, &mut cluster_type, &mut nodes);

        assert_eq!(master.as_deref(), Some("preexisting.example"));
        assert_eq!(cluster_type.as_deref(), Some("ovirt"));
        assert_eq!(nodes, vec!["b.example", "a.example"]);
    }

    #[test]
    fn resolve_path_treats_bare_names_as_group_store_entries() {
        assert_eq!(resolve_path("prod"), PathBuf::from("/var/lib/sos-collector/prod"));
        assert_eq!(resolve_path("/tmp/custom-group.json"), PathBuf::from("/tmp/custom-group.json"));
    }

    #[test]
    fn load_missing_group_is_not_found_not_io_error() {
        let err = load("definitely-not-a-real-group-xyz").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
