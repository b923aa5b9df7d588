//! The "commons bag" (Design Note §9): rather than passing a loosely-typed
//! dictionary to every component the way the original Python implementation does
//! (`self.commons`), every field is named and typed up front. Cluster profiles and
//! node sessions borrow from this instead of reaching into ambient global state.

use std::path::PathBuf;

use tempfile::TempDir;

use crate::credentials::Credentials;
use crate::prelude::*;

/// Values shared read-only across the run once the preamble (C9 §4.9) has finished:
/// the temp directory, resolved credentials, and the hostname column width the UI
/// layer uses when printing the node list.
pub struct Commons {
    pub tmp_dir: TempDir,
    pub credentials: Credentials,
    pub need_sudo: bool,
    pub become_root: bool,
    pub hostname_field_width: usize,
    pub timeout_secs: u64,
}

impl Commons {
    pub fn tmp_path(&self) -> PathBuf {
        self.tmp_dir.path().to_path_buf()
    }
}

/// Creates the driver's scratch directory. Grounded in the teacher's
/// `context::temp` module, which always goes through `tempfile` rather than
/// hand-rolling unique path generation.
pub fn create_tmp_dir() -> anyhow::Result<TempDir> {
    tempfile::Builder::new()
        .prefix("sos-collector-")
        .tempdir()
        .context("creating driver temp directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_dir_is_created_and_unique() {
        let a = create_tmp_dir().unwrap();
        let b = create_tmp_dir().unwrap();
        assert!(a.path().exists());
        assert_ne!(a.path(), b.path());
    }
}
